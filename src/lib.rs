//! Operator-overloading automatic differentiation with recorded tapes.
//!
//! Arithmetic on [`Tracked`] values is recorded on the [`Tape`] active on the
//! current thread. Closing the tape yields a [`RecordedFunction`] that can be
//! replayed at new arguments with forward Taylor sweeps of any order and
//! reverse adjoint sweeps, analysed for sparsity, and optimized.
//!
//! ```
//! use tapir::Tape;
//!
//! let mut tape = Tape::<f64>::new();
//! let x = tape.start(&[1.0, 2.0]).unwrap();
//! let y = x[0] * x[1].exp();
//! let mut f = tape.close(&[y]).unwrap();
//!
//! let y0 = f.forward(0, &[1.0, 2.0]).unwrap();
//! let g = f.reverse(1, &[1.0]).unwrap();
//! assert_eq!(y0[0], 2.0_f64.exp());
//! assert_eq!(g, vec![2.0_f64.exp(), 2.0_f64.exp()]);
//! ```
//!
//! Any type implementing [`Base`] can be recorded over, including
//! `Tracked<f64>` itself, which gives derivatives of derivatives.

pub mod api;
pub mod array;
pub mod atomic;
pub mod base;
pub mod error;
pub mod function;
pub mod opcode;
pub mod optimize;
pub mod sparse;
pub mod tape;
pub(crate) mod taylor_ops;
pub mod tracked;
mod traits;

pub use api::{begin_recording, finish_recording, grad, hessian, jacobian, record, record_with_dynamic};
pub use array::TrackedArray;
pub use atomic::{call_atomic, AtomicFunction, Checkpoint, Discrete};
pub use base::{Base, CompareOp};
pub use error::{AdError, ErrorKind, Result};
pub use function::{OpSequence, RecordedFunction, TaylorCache};
pub use opcode::{Arg, OpCode};
pub use optimize::OptimizeOptions;
pub use sparse::SparsityPattern;
pub use tape::{Operation, RecordOptions, Tape, TapeId, TapeState};
pub use tracked::{cond_exp, try_cond_exp, Binding, Tracked};

/// Tracked values over `f64`.
pub type Tracked64 = Tracked<f64>;
/// Tracked values over `f32`.
pub type Tracked32 = Tracked<f32>;

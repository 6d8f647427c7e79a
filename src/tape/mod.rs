//! Recording tapes.
//!
//! A [`Tape`] is an RAII handle around the recording state. While it is
//! recording, it is registered as this thread's active tape for its base
//! type, and arithmetic on [`Tracked`] values bound to it appends operations.
//! Closing the tape produces a [`RecordedFunction`]; aborting (or dropping) it
//! discards everything recorded.
//!
//! Tapes over different base types record independently, which is how a
//! `Tape<Tracked<f64>>` can record on top of a `Tape<f64>`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};

use crate::base::Base;
use crate::error::{AdError, Result};
use crate::function::RecordedFunction;
use crate::opcode::{Arg, OpCode};
use crate::tracked::{Binding, Operand, Tracked};

mod pool;
pub(crate) mod recorder;
pub(crate) mod thread_local;

pub use self::recorder::Operation;
pub(crate) use self::recorder::Recorder;
use self::thread_local::SharedRecorder;

/// Process-unique identity of one recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TapeId(pub(crate) u32);

impl fmt::Display for TapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Recording state of a [`Tape`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapeState {
    Empty,
    Recording,
}

/// Options fixed when recording starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordOptions {
    /// Record comparisons between bound values so replays can count how
    /// many comparisons change outcome.
    pub record_compare: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        RecordOptions {
            record_compare: true,
        }
    }
}

/// Handle to a recording context.
///
/// ```
/// use tapir::Tape;
///
/// let mut tape = Tape::<f64>::new();
/// let x = tape.start(&[2.0, 3.0]).unwrap();
/// let y = x[0] * x[1] + x[0].sin();
/// let mut f = tape.close(&[y]).unwrap();
///
/// let value = f.forward(0, &[2.0, 3.0]).unwrap();
/// assert_eq!(value[0], 6.0 + 2.0_f64.sin());
/// let grad = f.reverse(1, &[1.0]).unwrap();
/// assert_eq!(grad, vec![3.0 + 2.0_f64.cos(), 2.0]);
/// ```
pub struct Tape<B: Base> {
    options: RecordOptions,
    recorder: Option<SharedRecorder<B>>,
}

impl<B: Base> Default for Tape<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Base> Tape<B> {
    pub fn new() -> Self {
        Self::with_options(RecordOptions::default())
    }

    pub fn with_options(options: RecordOptions) -> Self {
        Tape {
            options,
            recorder: None,
        }
    }

    pub fn state(&self) -> TapeState {
        if self.recorder.is_some() {
            TapeState::Recording
        } else {
            TapeState::Empty
        }
    }

    /// Identity of the current recording.
    pub fn id(&self) -> Option<TapeId> {
        self.recorder.as_ref().map(|rec| rec.borrow().id)
    }

    /// Number of operations recorded so far, including the independent and
    /// dynamic-parameter leaves.
    pub fn operation_count(&self) -> usize {
        self.recorder
            .as_ref()
            .map_or(0, |rec| rec.borrow().operation_count())
    }

    /// Start recording with `x` as the independent variables.
    ///
    /// Fails with [`AdError::AlreadyRecording`] if this tape, or any other
    /// tape over `B` on this thread, is recording.
    pub fn start(&mut self, x: &[B]) -> Result<Vec<Tracked<B>>> {
        self.start_with_dynamic(x, &[]).map(|(x, _)| x)
    }

    /// Start recording with independent variables `x` and dynamic parameters
    /// `p`. Dynamic parameters are not differentiated but can be changed on the
    /// recorded function with
    /// [`new_dynamic`](RecordedFunction::new_dynamic).
    pub fn start_with_dynamic(
        &mut self,
        x: &[B],
        p: &[B],
    ) -> Result<(Vec<Tracked<B>>, Vec<Tracked<B>>)> {
        if let Some(rec) = &self.recorder {
            return Err(AdError::AlreadyRecording {
                active: rec.borrow().id,
            });
        }
        if let Some(active) = thread_local::active_id::<B>() {
            return Err(AdError::AlreadyRecording { active });
        }

        let tape = thread_local::allocate_id();
        let mut rec = Recorder::new(tape, self.options);
        let xs = x
            .iter()
            .map(|&value| Tracked::bound(value, Binding::Variable { tape, slot: rec.independent() }))
            .collect();
        let ps = p
            .iter()
            .map(|&value| Tracked::bound(value, Binding::Dynamic { tape, slot: rec.dynamic(value) }))
            .collect();

        let shared = Rc::new(RefCell::new(rec));
        thread_local::install(Rc::clone(&shared))?;
        self.recorder = Some(shared);
        debug!(
            "tape {tape}: recording {} independent(s), {} dynamic parameter(s)",
            x.len(),
            p.len()
        );
        Ok((xs, ps))
    }

    /// Record an elementary opcode (see [`OpCode::is_unary`] and
    /// [`OpCode::is_binary`]) applied to `operands`.
    pub fn record(&self, op: OpCode, operands: &[Tracked<B>]) -> Result<Tracked<B>> {
        if self.recorder.is_none() {
            return Err(AdError::NotRecording);
        }
        match operands {
            [x] if op.is_unary() => x.try_unary(op),
            [x, y] if op.is_binary() => x.try_binary(op, *y),
            _ => Err(AdError::InvalidOperation {
                op,
                operands: operands.len(),
            }),
        }
    }

    /// Stop recording with `y` as the dependent values.
    ///
    /// On error the tape keeps recording.
    pub fn close(&mut self, y: &[Tracked<B>]) -> Result<RecordedFunction<B>> {
        let shared = self.recorder.as_ref().ok_or(AdError::NotRecording)?;
        let id = shared.borrow().id;
        let resolved = y
            .iter()
            .map(|t| t.resolve(Some(id)))
            .collect::<Result<Vec<_>>>()?;

        let shared = self.recorder.take().ok_or(AdError::NotRecording)?;
        thread_local::uninstall::<B>(id);
        let rec = Rc::try_unwrap(shared)
            .map_err(|_| AdError::internal(0, "recorder still borrowed while closing"))?;
        let mut rec = rec.into_inner();
        let dependents: Vec<Arg> = resolved
            .into_iter()
            .map(|operand| match operand {
                Operand::Constant(v) => rec.constant(v),
                Operand::Slot { slot, .. } => Arg::Slot(slot),
            })
            .collect();
        debug!(
            "tape {id}: closed with {} operation(s), {} dependent(s)",
            rec.operation_count(),
            dependents.len()
        );
        Ok(RecordedFunction::new(rec.finish(dependents)))
    }

    /// Discard the recording and return to [`TapeState::Empty`].
    pub fn abort(&mut self) -> Result<()> {
        let shared = self.recorder.take().ok_or(AdError::NotRecording)?;
        let id = shared.borrow().id;
        thread_local::uninstall::<B>(id);
        debug!("tape {id}: aborted");
        Ok(())
    }
}

impl<B: Base> Drop for Tape<B> {
    fn drop(&mut self) {
        if let Some(shared) = self.recorder.take() {
            let id = shared.borrow().id;
            thread_local::uninstall::<B>(id);
            warn!("tape {id}: dropped while recording; recording discarded");
        }
    }
}

impl<B: Base> fmt::Debug for Tape<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tape")
            .field("state", &self.state())
            .field("id", &self.id())
            .field("operations", &self.operation_count())
            .finish()
    }
}

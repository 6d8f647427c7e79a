//! Error types for recording, sweeping and optimizing.

use thiserror::Error;

use crate::opcode::OpCode;
use crate::tape::TapeId;

/// Coarse classification of an [`AdError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Recording-state violations and mismatched sizes. Always surfaced.
    Usage,
    /// Values bound to two different live tapes were combined.
    CrossTape,
    /// Non-finite results reported by the opt-in NaN check.
    Numeric,
    /// A broken engine invariant. Indicates a bug in this crate.
    Internal,
}

/// Errors produced by tapes, recorded functions and the optimizer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdError {
    #[error("a tape for this base type is already recording on this thread (tape {active})")]
    AlreadyRecording { active: TapeId },

    #[error("tape is not recording")]
    NotRecording,

    #[error("value of a variable on tape {tape} read while the tape is still recording")]
    PrematureRead { tape: TapeId },

    #[error("value bound to tape {found} used while recording tape {active:?}")]
    CrossTape { active: Option<TapeId>, found: TapeId },

    #[error("domain size mismatch: expected {expected}, got {got}")]
    DomainMismatch { expected: usize, got: usize },

    #[error("range size mismatch: expected {expected}, got {got}")]
    RangeMismatch { expected: usize, got: usize },

    #[error("dynamic parameter count mismatch: expected {expected}, got {got}")]
    DynamicMismatch { expected: usize, got: usize },

    #[error("forward order {requested} requested but only orders 0..{available} are cached")]
    OrderOutOfSequence { requested: usize, available: usize },

    #[error("reverse over {requested} orders requires forward through order {needed}; {available} cached")]
    ReverseOrder {
        requested: usize,
        needed: usize,
        available: usize,
    },

    #[error("reverse weights have length {got}; expected {range} or {full}")]
    WeightMismatch {
        got: usize,
        range: usize,
        full: usize,
    },

    #[error("sweep cache holds {got_slots} slots and {got_ops} operations; the sequence has {slots} and {ops}")]
    CacheMismatch {
        slots: usize,
        ops: usize,
        got_slots: usize,
        got_ops: usize,
    },

    #[error("sparsity pattern is {rows}x{cols}; expected {expected_rows} rows")]
    PatternMismatch {
        rows: usize,
        cols: usize,
        expected_rows: usize,
    },

    #[error("sparsity pattern is {rows}x{cols}; expected {expected_rows}x{expected_cols}")]
    PatternShape {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("{op:?} cannot be recorded with {operands} operand(s) through this entry point")]
    InvalidOperation { op: OpCode, operands: usize },

    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("comparison {op:?} is not defined for unordered base values")]
    Unordered { op: crate::base::CompareOp },

    #[error("non-finite value in {sweep} result at position {index}")]
    NonFinite { sweep: &'static str, index: usize },

    #[error("atomic function {name}: {message}")]
    Atomic { name: String, message: String },

    #[error("internal invariant violated at operation {op_index}: {message}")]
    Internal { op_index: usize, message: String },
}

impl AdError {
    /// Classifies the error into one of the broad kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdError::CrossTape { .. } => ErrorKind::CrossTape,
            AdError::NonFinite { .. } => ErrorKind::Numeric,
            AdError::Internal { .. } => ErrorKind::Internal,
            _ => ErrorKind::Usage,
        }
    }

    pub(crate) fn internal(op_index: usize, message: impl Into<String>) -> Self {
        AdError::Internal {
            op_index,
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AdError>;

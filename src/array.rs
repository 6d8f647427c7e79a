//! Arrays indexed by tracked values.
//!
//! Reading `a[i]` where `i` depends on the independent variables cannot be
//! resolved at record time: a replay with different inputs may pick a
//! different element. [`TrackedArray`] records such accesses as load and
//! store operations on an arena whose initial contents are captured the first
//! time the array takes part in a recording.

use std::fmt;

use crate::base::Base;
use crate::error::{AdError, Result};
use crate::opcode::{Arg, OpCode};
use crate::tape::thread_local;
use crate::tape::{Recorder, TapeId};
use crate::tracked::{or_panic, Binding, Operand, Tracked};

/// A fixed-length array of tracked values that may be indexed by tracked
/// values.
///
/// ```
/// use tapir::{Tape, Tracked, TrackedArray};
///
/// let mut tape = Tape::<f64>::new();
/// let x = tape.start(&[1.0, 5.0]).unwrap();
/// let mut table = TrackedArray::from_values(&[10.0, 20.0, 30.0]);
/// let y = table.get(x[0]).unwrap() * x[1];
/// let mut f = tape.close(&[y]).unwrap();
///
/// assert_eq!(f.forward(0, &[2.0, 5.0]).unwrap(), vec![150.0]);
/// ```
#[derive(Clone)]
pub struct TrackedArray<B: Base> {
    elements: Vec<Tracked<B>>,
    /// Arena on the tape where this array was last registered.
    arena: Option<(TapeId, u32)>,
    /// A store through a non-constant index was recorded, so the elements
    /// no longer tell which slot each position holds.
    dirty: bool,
}

impl<B: Base> TrackedArray<B> {
    /// `len` zeros.
    pub fn new(len: usize) -> Self {
        Self::from_tracked(vec![Tracked::constant(B::zero()); len])
    }

    pub fn from_values(values: &[B]) -> Self {
        Self::from_tracked(values.iter().map(|&v| Tracked::constant(v)).collect())
    }

    pub fn from_tracked(elements: Vec<Tracked<B>>) -> Self {
        TrackedArray {
            elements,
            arena: None,
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Read the element at `index`.
    ///
    /// A constant index reads the element directly. Otherwise a load is
    /// recorded and the result is re-selected on every replay.
    pub fn get(&mut self, index: Tracked<B>) -> Result<Tracked<B>> {
        let active = thread_local::active_id::<B>();
        let idx = index.resolve(active)?;
        let i = self.position(index.value)?;
        let on_tape = self.registered_on(active);
        if matches!(idx, Operand::Constant(_)) && !(on_tape && self.dirty) {
            return Ok(self.elements[i]);
        }

        let shared = thread_local::active::<B>()
            .ok_or_else(|| AdError::internal(0, "array access outside a recording"))?;
        let mut rec = shared.borrow_mut();
        let arena = self.register(&mut rec)?;
        let idx = operand_arg(&mut rec, idx);
        let slot = rec.push(OpCode::Load, &[Arg::Imm(arena), idx], 1, true);
        Ok(Tracked::bound(
            self.elements[i].value,
            Binding::Variable { tape: rec.id, slot },
        ))
    }

    /// Write `value` at `index`.
    ///
    /// Once the array is part of the active recording, every write is
    /// recorded so later loads see it.
    pub fn set(&mut self, index: Tracked<B>, value: Tracked<B>) -> Result<()> {
        let active = thread_local::active_id::<B>();
        let idx = index.resolve(active)?;
        let val = value.resolve(active)?;
        let i = self.position(index.value)?;
        let indirect = matches!(idx, Operand::Slot { .. });
        if !indirect && !self.registered_on(active) {
            self.elements[i] = value;
            return Ok(());
        }

        let shared = thread_local::active::<B>()
            .ok_or_else(|| AdError::internal(0, "array access outside a recording"))?;
        let mut rec = shared.borrow_mut();
        let arena = self.register(&mut rec)?;
        let idx = operand_arg(&mut rec, idx);
        let val = operand_arg(&mut rec, val);
        rec.push(OpCode::Store, &[Arg::Imm(arena), idx, val], 0, true);
        self.dirty |= indirect;
        self.elements[i] = value;
        Ok(())
    }

    /// Panicking form of [`get`](Self::get).
    pub fn at(&mut self, index: Tracked<B>) -> Tracked<B> {
        or_panic(self.get(index))
    }

    /// Panicking form of [`set`](Self::set).
    pub fn put(&mut self, index: Tracked<B>, value: Tracked<B>) {
        or_panic(self.set(index, value))
    }

    fn position(&self, index: B) -> Result<usize> {
        match index.to_index() {
            Some(i) if i < self.elements.len() => Ok(i),
            other => Err(AdError::IndexOutOfRange {
                index: other.unwrap_or(usize::MAX),
                len: self.elements.len(),
            }),
        }
    }

    fn registered_on(&self, active: Option<TapeId>) -> bool {
        matches!((self.arena, active), (Some((tape, _)), Some(id)) if tape == id)
    }

    /// Arena of this array on `rec`, registering the current elements as
    /// its initial contents if needed.
    fn register(&mut self, rec: &mut Recorder<B>) -> Result<u32> {
        if let Some((tape, arena)) = self.arena {
            if tape == rec.id {
                return Ok(arena);
            }
        }
        let elements = self
            .elements
            .iter()
            .map(|t| t.resolve(Some(rec.id)).map(|op| operand_arg(rec, op)))
            .collect::<Result<Vec<_>>>()?;
        let arena = rec.new_arena(elements);
        self.arena = Some((rec.id, arena));
        self.dirty = false;
        Ok(arena)
    }
}

fn operand_arg<B: Base>(rec: &mut Recorder<B>, operand: Operand<B>) -> Arg {
    match operand {
        Operand::Constant(v) => rec.constant(v),
        Operand::Slot { slot, .. } => Arg::Slot(slot),
    }
}

impl<B: Base> fmt::Debug for TrackedArray<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedArray")
            .field("len", &self.elements.len())
            .field("arena", &self.arena)
            .field("dirty", &self.dirty)
            .finish()
    }
}

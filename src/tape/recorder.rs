use std::sync::Arc;

use crate::atomic::{AtomicFunction, Discrete};
use crate::base::Base;
use crate::function::{Arena, OpSequence};
use crate::opcode::{Arg, OpCode, NO_RESULT};

use super::pool::ConstantPool;
use super::{RecordOptions, TapeId};

/// One entry of an operation sequence.
///
/// The arguments are a run of the sequence's flat argument array; results
/// occupy `result_count` consecutive slots starting at `result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operation {
    pub op: OpCode,
    pub(crate) arg_start: u32,
    pub(crate) arg_count: u32,
    /// First result slot, [`NO_RESULT`] if the operation has none.
    pub result: u32,
    pub result_count: u32,
    /// True if any result depends on an independent variable.
    pub variable: bool,
}

impl Operation {
    #[inline]
    pub(crate) fn arg_range(&self) -> std::ops::Range<usize> {
        let start = self.arg_start as usize;
        start..start + self.arg_count as usize
    }

    #[inline]
    pub(crate) fn result_range(&self) -> std::ops::Range<usize> {
        if self.result == NO_RESULT {
            0..0
        } else {
            let start = self.result as usize;
            start..start + self.result_count as usize
        }
    }
}

/// Mutable state of a recording tape.
///
/// Besides backing [`Tape`](super::Tape), the optimizer drives a recorder
/// directly to re-record a rewritten operation sequence.
pub(crate) struct Recorder<B: Base> {
    pub(crate) id: TapeId,
    pub(crate) options: RecordOptions,
    pub(crate) ops: Vec<Operation>,
    pub(crate) args: Vec<Arg>,
    pub(crate) pool: ConstantPool<B>,
    pub(crate) slot_variable: Vec<bool>,
    pub(crate) independents: Vec<u32>,
    pub(crate) dynamics: Vec<u32>,
    pub(crate) dynamic_values: Vec<B>,
    pub(crate) arenas: Vec<Arena>,
    pub(crate) discrete: Vec<Discrete<B>>,
    pub(crate) atomics: Vec<Arc<dyn AtomicFunction<B>>>,
}

impl<B: Base> Recorder<B> {
    pub(crate) fn new(id: TapeId, options: RecordOptions) -> Self {
        Recorder {
            id,
            options,
            ops: Vec::new(),
            args: Vec::new(),
            pool: ConstantPool::new(),
            slot_variable: Vec::new(),
            independents: Vec::new(),
            dynamics: Vec::new(),
            dynamic_values: Vec::new(),
            arenas: Vec::new(),
            discrete: Vec::new(),
            atomics: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn num_slots(&self) -> u32 {
        self.slot_variable.len() as u32
    }

    /// Append an operation and return its first result slot.
    pub(crate) fn push(&mut self, op: OpCode, args: &[Arg], result_count: u32, variable: bool) -> u32 {
        let result = if result_count == 0 {
            NO_RESULT
        } else {
            self.num_slots()
        };
        self.ops.push(Operation {
            op,
            arg_start: self.args.len() as u32,
            arg_count: args.len() as u32,
            result,
            result_count,
            variable,
        });
        self.args.extend_from_slice(args);
        self.slot_variable
            .extend(std::iter::repeat(variable).take(result_count as usize));
        result
    }

    #[inline]
    pub(crate) fn constant(&mut self, value: B) -> Arg {
        Arg::Const(self.pool.intern(value))
    }

    pub(crate) fn independent(&mut self) -> u32 {
        let j = self.independents.len() as u32;
        let slot = self.push(OpCode::Independent, &[Arg::Imm(j)], 1, true);
        self.independents.push(slot);
        slot
    }

    pub(crate) fn dynamic(&mut self, value: B) -> u32 {
        let j = self.dynamics.len() as u32;
        let slot = self.push(OpCode::Dynamic, &[Arg::Imm(j)], 1, false);
        self.dynamics.push(slot);
        self.dynamic_values.push(value);
        slot
    }

    /// Register an indexed array whose initial contents are `elements`.
    pub(crate) fn new_arena(&mut self, elements: Vec<Arg>) -> u32 {
        let id = self.arenas.len() as u32;
        self.arenas.push(Arena {
            elements,
            position: self.ops.len() as u32,
        });
        id
    }

    pub(crate) fn discrete_index(&mut self, function: &Discrete<B>) -> u32 {
        match self.discrete.iter().position(|d| d.same_as(function)) {
            Some(i) => i as u32,
            None => {
                self.discrete.push(function.clone());
                (self.discrete.len() - 1) as u32
            }
        }
    }

    pub(crate) fn atomic_index(&mut self, function: &Arc<dyn AtomicFunction<B>>) -> u32 {
        match self.atomics.iter().position(|a| Arc::ptr_eq(a, function)) {
            Some(i) => i as u32,
            None => {
                self.atomics.push(Arc::clone(function));
                (self.atomics.len() - 1) as u32
            }
        }
    }

    pub(crate) fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Freeze the recording into an operation sequence.
    pub(crate) fn finish(self, dependents: Vec<Arg>) -> OpSequence<B> {
        OpSequence {
            ops: self.ops,
            args: self.args,
            constants: self.pool.into_values(),
            slot_variable: self.slot_variable,
            independents: self.independents,
            dynamics: self.dynamics,
            dynamic_values: self.dynamic_values,
            dependents,
            arenas: self.arenas,
            discrete: self.discrete,
            atomics: self.atomics,
            skip: Vec::new(),
        }
    }
}

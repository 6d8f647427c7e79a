//! Structural optimization of recorded functions.
//!
//! Every stage reads one [`OpSequence`] and re-records a new one through a
//! [`Rewriter`], so slots are renumbered and constants re-pooled as a side
//! effect. The stages are:
//!
//! 1. dead-code elimination ([`dce`]),
//! 2. cumulative-sum folding ([`csum`]),
//! 3. common-subexpression merging followed by another elimination
//!    ([`cse`]),
//!
//! repeated until the operation count stops shrinking, and finally
//! 4. conditional-skip analysis ([`cskip`]), which attaches skip rules
//!    instead of removing anything.

use log::debug;

use crate::base::Base;
use crate::function::OpSequence;
use crate::opcode::{Arg, OpCode};
use crate::tape::{RecordOptions, Recorder, TapeId};

mod cse;
mod cskip;
mod csum;
mod dce;

/// Which optimizer stages run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizeOptions {
    /// Fold chains of additions and subtractions into one cumulative sum.
    pub cumulative_sum: bool,
    /// Merge operations with identical opcode and arguments.
    pub common_subexpression: bool,
    /// Skip operations that only feed the untaken branch of a conditional
    /// whose comparison depends on parameters alone.
    pub conditional_skip: bool,
    /// Keep recorded comparisons so
    /// [`compare_change_count`](crate::RecordedFunction::compare_change_count)
    /// still works on the optimized function.
    pub keep_compare: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        OptimizeOptions {
            cumulative_sum: true,
            common_subexpression: true,
            conditional_skip: true,
            keep_compare: true,
        }
    }
}

/// Upper bound on rewrite rounds; each round that continues must shrink the
/// sequence, so this is only reached on very deep chains.
const MAX_ROUNDS: usize = 16;

impl<B: Base> OpSequence<B> {
    /// An equivalent sequence with fewer operations.
    pub fn optimize(&self, options: &OptimizeOptions) -> OpSequence<B> {
        let before = self.ops.len();
        let mut seq = dce::eliminate(self, options.keep_compare);
        debug!("optimize: dead code {before} -> {}", seq.ops.len());

        for _ in 0..MAX_ROUNDS {
            let count = seq.ops.len();
            if options.cumulative_sum {
                seq = csum::fold(&seq);
                debug!("optimize: cumulative sums -> {}", seq.ops.len());
            }
            if options.common_subexpression {
                seq = dce::eliminate(&cse::merge(&seq), options.keep_compare);
                debug!("optimize: common subexpressions -> {}", seq.ops.len());
            }
            if seq.ops.len() == count {
                break;
            }
        }

        seq.skip = if options.conditional_skip {
            cskip::analyze(&seq)
        } else {
            Vec::new()
        };
        debug_assert!(
            seq.validate().is_ok(),
            "optimizer produced an invalid sequence: {:?}",
            seq.validate()
        );
        debug!(
            "optimize: {before} -> {} operation(s), {} skip rule(s)",
            seq.ops.len(),
            seq.skip.len()
        );
        seq
    }
}

/// Re-records selected operations of a source sequence onto a fresh
/// recorder, remapping slots, constants, arenas and function tables.
pub(crate) struct Rewriter<'a, B: Base> {
    src: &'a OpSequence<B>,
    rec: Recorder<B>,
    slots: Vec<Option<u32>>,
    arenas: Vec<Option<u32>>,
    keep_arena: Vec<bool>,
    next_arena: usize,
    arena_order: Vec<usize>,
}

impl<'a, B: Base> Rewriter<'a, B> {
    /// `keep_arena[a]` says whether arena `a` survives.
    pub(crate) fn new(src: &'a OpSequence<B>, keep_arena: Vec<bool>) -> Self {
        let mut arena_order: Vec<usize> = (0..src.arenas.len()).collect();
        arena_order.sort_by_key(|&a| src.arenas[a].position);
        let mut rec = Recorder::new(TapeId(0), RecordOptions::default());
        rec.dynamic_values.reserve(src.dynamic_values.len());
        Rewriter {
            src,
            rec,
            slots: vec![None; src.slot_count()],
            arenas: vec![None; src.arenas.len()],
            keep_arena,
            next_arena: 0,
            arena_order,
        }
    }

    /// Keep every arena.
    pub(crate) fn keep_all(src: &'a OpSequence<B>) -> Self {
        Self::new(src, vec![true; src.arenas.len()])
    }

    /// Register kept arenas positioned at or before source operation `i`.
    pub(crate) fn advance(&mut self, i: usize) {
        let src = self.src;
        while let Some(&a) = self.arena_order.get(self.next_arena) {
            if src.arenas[a].position as usize > i {
                break;
            }
            self.next_arena += 1;
            if self.keep_arena[a] {
                let elements = src.arenas[a]
                    .elements
                    .iter()
                    .map(|&e| self.arg(e))
                    .collect();
                self.arenas[a] = Some(self.rec.new_arena(elements));
            }
        }
    }

    /// Source argument in the new sequence.
    pub(crate) fn arg(&mut self, arg: Arg) -> Arg {
        match arg {
            Arg::Slot(s) => match self.slots[s as usize] {
                Some(n) => Arg::Slot(n),
                None => unreachable!("slot v{s} used before it was rewritten"),
            },
            Arg::Const(c) => self.rec.constant(self.src.constants[c as usize]),
            Arg::Imm(v) => Arg::Imm(v),
        }
    }

    /// Arguments of source operation `i`, with slots, constants and table
    /// indices translated.
    pub(crate) fn args(&mut self, i: usize) -> Vec<Arg> {
        let src = self.src;
        let op = src.ops[i];
        let src_args = &src.args[op.arg_range()];
        let mut out = Vec::with_capacity(src_args.len());
        for (k, &arg) in src_args.iter().enumerate() {
            let mapped = match (op.op, k) {
                (OpCode::Load | OpCode::Store, 0) => match self.arenas[arg.imm() as usize] {
                    Some(a) => Arg::Imm(a),
                    None => unreachable!("arena {} dropped while still in use", arg.imm()),
                },
                (OpCode::Discrete, 0) => {
                    Arg::Imm(self.rec.discrete_index(&src.discrete[arg.imm() as usize]))
                }
                (OpCode::Call, 0) => {
                    Arg::Imm(self.rec.atomic_index(&src.atomics[arg.imm() as usize]))
                }
                _ => self.arg(arg),
            };
            out.push(mapped);
        }
        out
    }

    /// Copy source operation `i` unchanged.
    pub(crate) fn copy(&mut self, i: usize) -> u32 {
        let args = self.args(i);
        self.emit(i, self.src.ops[i].op, &args)
    }

    /// Emit an operation standing in for source operation `i`, whose results
    /// map onto the new results.
    pub(crate) fn emit(&mut self, i: usize, op: OpCode, args: &[Arg]) -> u32 {
        let src_op = self.src.ops[i];
        let first = match op {
            OpCode::Independent => self.rec.independent(),
            OpCode::Dynamic => {
                let j = args[0].imm() as usize;
                self.rec.dynamic(self.src.dynamic_values[j])
            }
            _ => self
                .rec
                .push(op, args, src_op.result_count, src_op.variable),
        };
        for k in 0..src_op.result_range().len() {
            self.slots[src_op.result as usize + k] = Some(first + k as u32);
        }
        first
    }

    /// Results of source operation `i` are those of already-emitted `first`.
    pub(crate) fn alias(&mut self, i: usize, first: u32) {
        let src_op = self.src.ops[i];
        for k in 0..src_op.result_range().len() {
            self.slots[src_op.result as usize + k] = Some(first + k as u32);
        }
    }

    pub(crate) fn finish(mut self) -> OpSequence<B> {
        self.advance(usize::MAX);
        let src = self.src;
        let dependents = src
            .dependents
            .iter()
            .map(|&d| self.arg(d))
            .collect();
        let mut seq = self.rec.finish(dependents);
        seq.skip = Vec::new();
        seq
    }
}

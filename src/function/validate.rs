use crate::base::{Base, CompareOp};
use crate::error::{AdError, Result};
use crate::opcode::{Arg, OpCode, NO_RESULT};

use super::OpSequence;

/// Whether argument `k` of `op` is an immediate rather than an operand.
fn is_immediate(op: OpCode, k: usize) -> bool {
    match op {
        OpCode::Independent
        | OpCode::Dynamic
        | OpCode::CondExp
        | OpCode::Load
        | OpCode::Store
        | OpCode::Discrete
        | OpCode::Call => k == 0,
        OpCode::Compare => k < 2,
        OpCode::CumSum => k % 2 == 0,
        _ => false,
    }
}

impl<B: Base> OpSequence<B> {
    /// Check the structural invariants of the sequence: results are
    /// numbered densely in order, every operand is defined before use, and
    /// every table index is in range.
    pub fn validate(&self) -> Result<()> {
        let mut next_slot = 0u32;
        let mut independents = Vec::new();
        let mut dynamics = Vec::new();

        for (i, op) in self.ops.iter().enumerate() {
            let fail = |msg: String| Err(AdError::internal(i, msg));
            let range = op.arg_range();
            if range.end > self.args.len() {
                return fail(format!("arguments {range:?} past the end"));
            }
            let args = &self.args[range];
            if let Some(n) = op.op.arity() {
                if args.len() != n {
                    return fail(format!("{:?} with {} arguments", op.op, args.len()));
                }
            }
            if let Some(r) = op.op.result_count() {
                if r != op.result_count {
                    return fail(format!("{:?} with {} results", op.op, op.result_count));
                }
            }

            let defined = next_slot;
            if op.result_count == 0 {
                if op.result != NO_RESULT {
                    return fail("result slot on an operation without results".into());
                }
            } else {
                if op.result != next_slot {
                    return fail(format!("first result v{} but expected v{next_slot}", op.result));
                }
                let end = next_slot as usize + op.result_count as usize;
                if end > self.slot_count() {
                    return fail("results past the slot table".into());
                }
                if self.slot_variable[next_slot as usize..end]
                    .iter()
                    .any(|&v| v != op.variable)
                {
                    return fail("result variability differs from the operation".into());
                }
            }

            for (k, &arg) in args.iter().enumerate() {
                match (arg, is_immediate(op.op, k)) {
                    (Arg::Imm(_), true) => {}
                    (Arg::Slot(s), false) => {
                        if s >= defined {
                            return fail(format!("operand v{s} used before it is defined"));
                        }
                        if self.slot_variable[s as usize] && !op.variable {
                            return fail(format!("variable operand v{s} of a parameter operation"));
                        }
                    }
                    (Arg::Const(c), false) => {
                        if c as usize >= self.constants.len() {
                            return fail(format!("constant {c} out of range"));
                        }
                    }
                    (other, _) => return fail(format!("unexpected argument {other:?} at {k}")),
                }
            }

            let head = match args.first() {
                Some(&Arg::Imm(v)) => v as usize,
                _ => 0,
            };
            let bad_table = match op.op {
                OpCode::CondExp | OpCode::Compare => CompareOp::from_code(head as u32).is_none(),
                OpCode::Load | OpCode::Store => head >= self.arenas.len(),
                OpCode::Discrete => head >= self.discrete.len(),
                OpCode::Call => match self.atomics.get(head) {
                    Some(a) => {
                        a.domain_size() + 1 != args.len() || a.range_size() != op.result_count as usize
                    }
                    None => true,
                },
                OpCode::CumSum => args.len() % 2 != 0,
                OpCode::Independent => {
                    independents.push(op.result);
                    head + 1 != independents.len()
                }
                OpCode::Dynamic => {
                    dynamics.push(op.result);
                    head + 1 != dynamics.len()
                }
                _ => false,
            };
            if bad_table {
                return fail(format!("{:?} with inconsistent immediate {head}", op.op));
            }
            next_slot += op.result_range().len() as u32;
        }

        let end = self.ops.len();
        if next_slot as usize != self.slot_count() {
            return Err(AdError::internal(end, "slot table longer than the results"));
        }
        if independents != self.independents || dynamics != self.dynamics {
            return Err(AdError::internal(end, "leaf lists disagree with the operations"));
        }
        if self.dynamic_values.len() != self.dynamics.len() {
            return Err(AdError::internal(end, "dynamic parameter values missing"));
        }
        let in_range = |arg: &Arg| match *arg {
            Arg::Slot(s) => (s as usize) < self.slot_count(),
            Arg::Const(c) => (c as usize) < self.constants.len(),
            Arg::Imm(_) => false,
        };
        if !self.dependents.iter().all(in_range) {
            return Err(AdError::internal(end, "dependent out of range"));
        }
        for arena in &self.arenas {
            if arena.position as usize > end || !arena.elements.iter().all(in_range) {
                return Err(AdError::internal(end, "arena contents out of range"));
            }
        }
        for rule in &self.skip {
            if rule.if_true.iter().chain(&rule.if_false).any(|&i| i as usize >= end) {
                return Err(AdError::internal(end, "skip rule names a missing operation"));
            }
        }
        Ok(())
    }
}

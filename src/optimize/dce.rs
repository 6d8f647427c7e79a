use crate::base::Base;
use crate::function::OpSequence;
use crate::opcode::{Arg, OpCode};

use super::Rewriter;

/// Drop every operation the dependents do not need.
///
/// Leaves (independents and dynamic parameters) always survive so the
/// domain and parameter vectors keep their layout. Stores survive only when a
/// later surviving load reads the same arena, and comparisons only when
/// `keep_compare` is set.
pub(crate) fn eliminate<B: Base>(seq: &OpSequence<B>, keep_compare: bool) -> OpSequence<B> {
    let mut live_slot = vec![false; seq.slot_count()];
    let mut live_op = vec![false; seq.ops.len()];
    let mut live_arena = vec![false; seq.arenas.len()];
    for &dep in &seq.dependents {
        if let Arg::Slot(s) = dep {
            live_slot[s as usize] = true;
        }
    }

    for i in (0..seq.ops.len()).rev() {
        let op = &seq.ops[i];
        let args = &seq.args[op.arg_range()];
        let live = match op.op {
            OpCode::Independent | OpCode::Dynamic => true,
            OpCode::Compare => keep_compare,
            OpCode::Store => live_arena[args[0].imm() as usize],
            _ => op.result_range().any(|s| live_slot[s]),
        };
        if !live {
            continue;
        }
        live_op[i] = true;
        if op.op == OpCode::Load {
            let a = args[0].imm() as usize;
            if !live_arena[a] {
                live_arena[a] = true;
                for &e in &seq.arenas[a].elements {
                    if let Arg::Slot(s) = e {
                        live_slot[s as usize] = true;
                    }
                }
            }
        }
        for &arg in args {
            if let Arg::Slot(s) = arg {
                live_slot[s as usize] = true;
            }
        }
    }

    let mut rw = Rewriter::new(seq, live_arena);
    for (i, &live) in live_op.iter().enumerate() {
        rw.advance(i);
        if live {
            rw.copy(i);
        }
    }
    rw.finish()
}

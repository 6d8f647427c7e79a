use crate::base::{Base, CompareOp};
use crate::function::{OpSequence, SkipRule};
use crate::opcode::{Arg, OpCode};

/// Skip rules for every conditional expression whose comparison operands are
/// parameters.
///
/// For each such conditional, an operation can be skipped when the
/// comparison goes one way if it is only reachable from the outputs through
/// the other branch.
pub(crate) fn analyze<B: Base>(seq: &OpSequence<B>) -> Vec<SkipRule> {
    let full = reachable(seq, None);
    let mut rules = Vec::new();
    for (c, op) in seq.ops.iter().enumerate() {
        if op.op != OpCode::CondExp || !op.variable {
            continue;
        }
        let args = seq.args(op);
        if seq.is_variable(args[1]) || seq.is_variable(args[2]) {
            continue;
        }
        let Some(cmp) = CompareOp::from_code(args[0].imm()) else {
            continue;
        };
        // comparison holds: the false branch (argument 4) is not needed
        let if_true = skippable(seq, &full, &reachable(seq, Some((c, 4))));
        let if_false = skippable(seq, &full, &reachable(seq, Some((c, 3))));
        if if_true.is_empty() && if_false.is_empty() {
            continue;
        }
        rules.push(SkipRule {
            cmp,
            left: args[1],
            right: args[2],
            if_true,
            if_false,
        });
    }
    rules
}

fn skippable<B: Base>(seq: &OpSequence<B>, full: &[bool], cut: &[bool]) -> Vec<u32> {
    seq.ops
        .iter()
        .enumerate()
        .filter(|&(i, op)| {
            op.variable
                && full[i]
                && !cut[i]
                && !matches!(op.op, OpCode::Independent | OpCode::Store | OpCode::Compare)
        })
        .map(|(i, _)| i as u32)
        .collect()
}

/// Operations needed by the outputs, stores, comparisons and arena
/// contents, ignoring argument `cut.1` of operation `cut.0`.
fn reachable<B: Base>(seq: &OpSequence<B>, cut: Option<(usize, usize)>) -> Vec<bool> {
    let mut live_slot = vec![false; seq.slot_count()];
    let mut live_op = vec![false; seq.ops.len()];
    let mark = |arg: Arg, live_slot: &mut Vec<bool>| {
        if let Arg::Slot(s) = arg {
            live_slot[s as usize] = true;
        }
    };
    for &dep in &seq.dependents {
        mark(dep, &mut live_slot);
    }
    for arena in &seq.arenas {
        for &e in &arena.elements {
            mark(e, &mut live_slot);
        }
    }
    for i in (0..seq.ops.len()).rev() {
        let op = &seq.ops[i];
        let live = match op.op {
            OpCode::Independent | OpCode::Dynamic | OpCode::Store | OpCode::Compare => true,
            _ => op.result_range().any(|s| live_slot[s]),
        };
        if !live {
            continue;
        }
        live_op[i] = true;
        for (k, &arg) in seq.args(op).iter().enumerate() {
            if cut != Some((i, k)) {
                mark(arg, &mut live_slot);
            }
        }
    }
    live_op
}

#[cfg(test)]
mod tests {
    use crate::{cond_exp, CompareOp, Tape};

    #[test]
    fn branches_behind_a_parameter_comparison_get_rules() {
        let mut tape = Tape::<f64>::new();
        let (x, p) = tape.start_with_dynamic(&[0.7], &[1.0, 2.0]).unwrap();
        let a = x[0].sin();
        let b = x[0].exp();
        let y = cond_exp(CompareOp::Lt, p[0], p[1], a, b);
        let f = tape.close(&[y]).unwrap();

        let rules = super::analyze(f.sequence());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].if_true.len(), 1);
        assert_eq!(rules[0].if_false.len(), 1);
    }
}

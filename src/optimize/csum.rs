use crate::base::Base;
use crate::function::OpSequence;
use crate::opcode::{Arg, OpCode};

use super::Rewriter;

/// A signed term of a sum: `(negated, operand)`.
type Term = (bool, Arg);

/// Collapse chains of additions and subtractions into cumulative sums.
///
/// An addition, subtraction or cumulative sum is absorbed into its consumer
/// when it is a variable operation used exactly once and it sits where the
/// consumer accumulates: either operand of an addition, the left operand of
/// a subtraction, or the leading positive term of a cumulative sum. The
/// folded sum keeps the original left-to-right evaluation order, so results
/// are bit-identical.
pub(crate) fn fold<B: Base>(seq: &OpSequence<B>) -> OpSequence<B> {
    let mut uses = vec![0u32; seq.slot_count()];
    let mut producer = vec![usize::MAX; seq.slot_count()];
    for (i, op) in seq.ops.iter().enumerate() {
        for &arg in &seq.args[op.arg_range()] {
            if let Arg::Slot(s) = arg {
                uses[s as usize] += 1;
            }
        }
        for s in op.result_range() {
            producer[s] = i;
        }
    }
    for arena in &seq.arenas {
        for &e in &arena.elements {
            if let Arg::Slot(s) = e {
                uses[s as usize] += 1;
            }
        }
    }
    for &dep in &seq.dependents {
        if let Arg::Slot(s) = dep {
            uses[s as usize] += 1;
        }
    }

    let absorbable = |arg: Arg| -> Option<usize> {
        let Arg::Slot(s) = arg else { return None };
        let p = producer[s as usize];
        let op = &seq.ops[p];
        let summing = matches!(op.op, OpCode::Add | OpCode::Sub | OpCode::CumSum);
        (summing && op.variable && uses[s as usize] == 1).then_some(p)
    };

    let mut terms: Vec<Option<Vec<Term>>> = vec![None; seq.ops.len()];
    let mut absorbed = vec![false; seq.ops.len()];
    let mut folds = vec![false; seq.ops.len()];
    for (i, op) in seq.ops.iter().enumerate() {
        if !op.variable {
            continue;
        }
        let args = &seq.args[op.arg_range()];
        let (head, mut rest): (Option<usize>, Vec<Term>) = match op.op {
            OpCode::Add => match (absorbable(args[0]), absorbable(args[1])) {
                (Some(p), _) => (Some(p), vec![(false, args[1])]),
                (None, Some(p)) => (Some(p), vec![(false, args[0])]),
                (None, None) => (None, vec![(false, args[0]), (false, args[1])]),
            },
            OpCode::Sub => match absorbable(args[0]) {
                Some(p) => (Some(p), vec![(true, args[1])]),
                None => (None, vec![(false, args[0]), (true, args[1])]),
            },
            OpCode::CumSum => {
                let own: Vec<Term> = args
                    .chunks_exact(2)
                    .map(|pair| (pair[0].imm() != 0, pair[1]))
                    .collect();
                match own.first() {
                    Some(&(false, first)) => match absorbable(first) {
                        Some(p) => (Some(p), own[1..].to_vec()),
                        None => (None, own),
                    },
                    _ => (None, own),
                }
            }
            _ => continue,
        };
        let list = match head {
            Some(p) => {
                absorbed[p] = true;
                folds[i] = true;
                let mut list = terms[p].take().unwrap_or_default();
                list.append(&mut rest);
                list
            }
            None => rest,
        };
        terms[i] = Some(list);
    }

    let mut rw = Rewriter::keep_all(seq);
    for i in 0..seq.ops.len() {
        rw.advance(i);
        if absorbed[i] {
            continue;
        }
        match terms[i].as_ref() {
            Some(list) if folds[i] => {
                let mut args = Vec::with_capacity(2 * list.len());
                for &(negated, arg) in list {
                    args.push(Arg::Imm(u32::from(negated)));
                    args.push(rw.arg(arg));
                }
                rw.emit(i, OpCode::CumSum, &args);
            }
            _ => {
                rw.copy(i);
            }
        }
    }
    rw.finish()
}

#[cfg(test)]
mod tests {
    use crate::{OpCode, Tape};

    #[test]
    fn chain_of_sums_becomes_one_operation() {
        let mut tape = Tape::<f64>::new();
        let x = tape.start(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = x[0] + x[1] - x[2] + x[3];
        let mut f = tape.close(&[y]).unwrap();
        let folded = super::fold(f.sequence());

        let sums: Vec<_> = folded
            .operations()
            .iter()
            .filter(|op| op.op != OpCode::Independent)
            .collect();
        assert_eq!(sums.len(), 1);
        assert_eq!(sums[0].op, OpCode::CumSum);

        let mut g = crate::RecordedFunction::new(folded);
        let x = [0.5, -1.25, 3.0, 7.5];
        assert_eq!(g.forward(0, &x).unwrap(), f.forward(0, &x).unwrap());
    }

    #[test]
    fn shared_partial_sum_is_not_absorbed() {
        let mut tape = Tape::<f64>::new();
        let x = tape.start(&[1.0, 2.0, 3.0]).unwrap();
        let s = x[0] + x[1];
        let y0 = s + x[2];
        let y1 = s * x[2];
        let f = tape.close(&[y0, y1]).unwrap();
        let folded = super::fold(f.sequence());
        assert_eq!(folded.operation_count(), f.operation_count());
    }
}

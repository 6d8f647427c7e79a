use std::collections::HashMap;

use crate::base::Base;
use crate::function::OpSequence;
use crate::opcode::{Arg, OpCode};

use super::Rewriter;

/// Merge operations with the same opcode and the same (rewritten)
/// arguments into their first occurrence. Arguments of commutative opcodes
/// are compared as a set.
///
/// The duplicates' own operands may become dead; callers follow up with
/// dead-code elimination.
pub(crate) fn merge<B: Base>(seq: &OpSequence<B>) -> OpSequence<B> {
    let mut rw = Rewriter::keep_all(seq);
    let mut seen: HashMap<(OpCode, Vec<Arg>), u32> = HashMap::new();
    for (i, op) in seq.ops.iter().enumerate() {
        rw.advance(i);
        if !op.op.is_pure() || op.result_range().is_empty() {
            rw.copy(i);
            continue;
        }
        let args = rw.args(i);
        let mut key = args.clone();
        if op.op.is_commutative() {
            key.sort_unstable();
        }
        match seen.get(&(op.op, key.clone())) {
            Some(&first) => rw.alias(i, first),
            None => {
                let first = rw.emit(i, op.op, &args);
                seen.insert((op.op, key), first);
            }
        }
    }
    rw.finish()
}

#[cfg(test)]
mod tests {
    use crate::Tape;

    #[test]
    fn repeated_sine_is_computed_once() {
        let mut tape = Tape::<f64>::new();
        let x = tape.start(&[0.5]).unwrap();
        let a = x[0].sin();
        let b = x[0].sin();
        let y = a * b;
        let f = tape.close(&[y]).unwrap();
        let merged = super::super::dce::eliminate(&super::merge(f.sequence()), true);
        assert_eq!(f.operation_count(), 4);
        assert_eq!(merged.operation_count(), 3);
    }

    #[test]
    fn commutative_operands_are_matched_in_either_order() {
        let mut tape = Tape::<f64>::new();
        let x = tape.start(&[0.5, 1.5]).unwrap();
        let y = (x[0] * x[1]) - (x[1] * x[0]);
        let f = tape.close(&[y]).unwrap();
        let merged = super::super::dce::eliminate(&super::merge(f.sequence()), true);
        assert_eq!(merged.operation_count(), f.operation_count() - 1);
    }
}

//! Tape lifecycle: starting, closing, aborting and the usage errors around
//! them.

use tapir::{AdError, Binding, ErrorKind, OpCode, RecordOptions, Tape, TapeState, Tracked};

#[test]
fn start_then_close() {
    let mut tape = Tape::<f64>::new();
    assert_eq!(tape.state(), TapeState::Empty);
    assert!(tape.id().is_none());

    let x = tape.start(&[1.0, 2.0]).unwrap();
    assert_eq!(tape.state(), TapeState::Recording);
    assert!(x[0].is_variable());
    assert_eq!(tape.operation_count(), 2);

    let y = x[0] + x[1];
    let f = tape.close(&[y]).unwrap();
    assert_eq!(tape.state(), TapeState::Empty);
    assert_eq!(f.domain_size(), 2);
    assert_eq!(f.range_size(), 1);
    assert_eq!(f.operation_count(), 3);
}

#[test]
fn start_twice_fails() {
    let mut tape = Tape::<f64>::new();
    let _x = tape.start(&[1.0]).unwrap();
    let err = tape.start(&[1.0]).unwrap_err();
    assert!(matches!(err, AdError::AlreadyRecording { .. }));
    assert_eq!(err.kind(), ErrorKind::Usage);
    tape.abort().unwrap();
}

#[test]
fn second_tape_same_base_fails() {
    let mut a = Tape::<f64>::new();
    let _x = a.start(&[1.0]).unwrap();
    let mut b = Tape::<f64>::new();
    let err = b.start(&[2.0]).unwrap_err();
    assert_eq!(err, AdError::AlreadyRecording { active: a.id().unwrap() });
    assert_eq!(b.state(), TapeState::Empty);
    a.abort().unwrap();

    // The slot is free again.
    let _y = b.start(&[2.0]).unwrap();
    b.abort().unwrap();
}

#[test]
fn tapes_over_different_bases_coexist() {
    let mut a = Tape::<f64>::new();
    let mut b = Tape::<f32>::new();
    let x = a.start(&[1.0]).unwrap();
    let u = b.start(&[1.0]).unwrap();
    let mut f = a.close(&[x[0] * 2.0]).unwrap();
    let mut g = b.close(&[u[0] * 3.0]).unwrap();
    assert_eq!(f.forward(0, &[4.0]).unwrap(), vec![8.0]);
    assert_eq!(g.forward(0, &[4.0]).unwrap(), vec![12.0f32]);
}

#[test]
fn close_and_abort_without_start() {
    let mut tape = Tape::<f64>::new();
    assert_eq!(tape.close(&[]).unwrap_err(), AdError::NotRecording);
    assert_eq!(tape.abort().unwrap_err(), AdError::NotRecording);
}

#[test]
fn record_requires_recording_tape() {
    let tape = Tape::<f64>::new();
    let err = tape.record(OpCode::Sin, &[Tracked::constant(1.0)]).unwrap_err();
    assert_eq!(err, AdError::NotRecording);
}

#[test]
fn record_by_opcode() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[0.5, 2.0]).unwrap();
    let s = tape.record(OpCode::Sin, &[x[0]]).unwrap();
    let p = tape.record(OpCode::Mul, &[s, x[1]]).unwrap();

    let err = tape.record(OpCode::Add, &[x[0]]).unwrap_err();
    assert!(matches!(
        err,
        AdError::InvalidOperation {
            op: OpCode::Add,
            operands: 1
        }
    ));
    let err = tape.record(OpCode::CondExp, &[x[0], x[1]]).unwrap_err();
    assert!(matches!(err, AdError::InvalidOperation { .. }));

    let mut f = tape.close(&[p]).unwrap();
    let y = f.forward(0, &[1.0, 3.0]).unwrap();
    assert_eq!(y[0], 1.0f64.sin() * 3.0);
}

#[test]
fn premature_read() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[3.0]).unwrap();
    let y = x[0] * x[0];
    assert!(matches!(y.value(), Err(AdError::PrematureRead { .. })));
    assert!(Tracked::constant(1.0).value().is_ok());

    let _f = tape.close(&[y]).unwrap();
    assert_eq!(y.value().unwrap(), 9.0);
    assert_eq!(y.binding(), Binding::Unbound);
}

#[test]
fn values_freeze_after_abort() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[2.0]).unwrap();
    let y = x[0] * 5.0;
    tape.abort().unwrap();
    assert_eq!(tape.state(), TapeState::Empty);
    assert!(y.is_constant());
    assert_eq!(y.value().unwrap(), 10.0);

    // A frozen value enters a new recording as a constant.
    let z = tape.start(&[1.0]).unwrap();
    let w = z[0] + y;
    let mut f = tape.close(&[w]).unwrap();
    assert_eq!(f.forward(0, &[4.0]).unwrap(), vec![14.0]);
    assert_eq!(f.reverse(1, &[1.0]).unwrap(), vec![1.0]);
}

#[test]
fn drop_while_recording_discards() {
    {
        let mut tape = Tape::<f64>::new();
        let _x = tape.start(&[1.0]).unwrap();
    }
    let mut tape = Tape::<f64>::new();
    assert!(tape.start(&[1.0]).is_ok());
    tape.abort().unwrap();
}

#[test]
fn dependent_from_aborted_tape_is_constant() {
    let mut outer = Tape::<f64>::new();
    let x = outer.start(&[1.0]).unwrap();
    let y = x[0] * 2.0;
    outer.abort().unwrap();

    let mut tape = Tape::<f64>::new();
    let z = tape.start(&[1.0]).unwrap();
    // `y` belongs to a tape that no longer records, so it freezes.
    let mut f = tape.close(&[z[0], y]).unwrap();
    assert_eq!(f.forward(0, &[7.0]).unwrap(), vec![7.0, 2.0]);
}

#[test]
fn unbound_arithmetic_records_nothing() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[1.0]).unwrap();
    let a = Tracked::<f64>::constant(2.0);
    let b = a * a + 1.0;
    assert!(b.is_constant());
    assert_eq!(tape.operation_count(), 1);
    let y = x[0] * b;
    assert_eq!(tape.operation_count(), 2);
    let mut f = tape.close(&[y]).unwrap();
    assert_eq!(f.forward(0, &[3.0]).unwrap(), vec![15.0]);
}

#[test]
fn identity_shortcuts() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[3.0]).unwrap();
    let y = (x[0] + 0.0) * 1.0 / 1.0 - 0.0;
    assert_eq!(tape.operation_count(), 1);
    let mut f = tape.close(&[y]).unwrap();
    assert_eq!(f.forward(0, &[5.0]).unwrap(), vec![5.0]);
}

#[test]
fn constants_are_pooled() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[1.0]).unwrap();
    let y = x[0] * 2.5 + x[0].sin() * 2.5 + 2.5;
    let f = tape.close(&[y]).unwrap();
    assert_eq!(f.sequence().constants(), &[2.5]);
}

#[test]
fn constant_and_independent_dependents() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[1.0, 2.0]).unwrap();
    let mut f = tape.close(&[Tracked::constant(4.0), x[1]]).unwrap();
    assert_eq!(f.forward(0, &[5.0, 6.0]).unwrap(), vec![4.0, 6.0]);
    assert_eq!(f.reverse(1, &[1.0, 1.0]).unwrap(), vec![0.0, 1.0]);
}

#[test]
fn dynamic_parameters_are_not_variables() {
    let mut tape = Tape::<f64>::new();
    let (x, p) = tape.start_with_dynamic(&[1.0], &[3.0]).unwrap();
    assert!(p[0].is_dynamic());
    let q = p[0] * p[0];
    assert!(q.is_dynamic());
    let y = x[0] * q;
    assert!(y.is_variable());
    let f = tape.close(&[y]).unwrap();
    assert_eq!(f.dynamic_size(), 1);
    assert_eq!(f.sequence().recorded_dynamic(), &[3.0]);
}

#[test]
fn comparisons_are_recorded_only_when_asked() {
    let mut tape = Tape::<f64>::with_options(RecordOptions {
        record_compare: false,
    });
    let x = tape.start(&[1.0, 2.0]).unwrap();
    let y = if x[0] < x[1] { x[0] } else { x[1] };
    assert_eq!(tape.operation_count(), 2);
    let mut f = tape.close(&[y]).unwrap();
    f.forward(0, &[5.0, 2.0]).unwrap();
    assert_eq!(f.compare_change_count(), 0);
}

#[test]
fn display_lists_operations() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[1.0, 2.0]).unwrap();
    let y = x[0] * x[1];
    let f = tape.close(&[y]).unwrap();
    let listing = f.sequence().to_string();
    assert!(listing.contains("Mul"), "{listing}");
    assert!(listing.contains("out"), "{listing}");
}

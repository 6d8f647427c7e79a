//! Arrays indexed by tracked values.

use approx::assert_relative_eq;
use tapir::{AdError, Tape, Tracked64, TrackedArray};

#[test]
fn constant_index_records_nothing() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[2.0]).unwrap();
    let mut a = TrackedArray::from_values(&[1.0, 2.0, 3.0]);
    let before = tape.operation_count();
    let y = a.at(Tracked64::constant(1.0)) * x[0];
    assert_eq!(tape.operation_count(), before + 1);
    let mut f = tape.close(&[y]).unwrap();
    assert_eq!(f.forward(0, &[5.0]).unwrap(), vec![10.0]);
}

#[test]
fn variable_index_is_resolved_on_replay() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[0.0, 1.0]).unwrap();
    let mut a = TrackedArray::from_tracked(vec![x[1], x[1] * x[1], x[1].exp()]);
    let y = a.at(x[0]);
    let mut f = tape.close(&[y]).unwrap();

    let v = 1.5f64;
    assert_eq!(f.forward(0, &[0.0, v]).unwrap(), vec![v]);
    assert_eq!(f.reverse(1, &[1.0]).unwrap(), vec![0.0, 1.0]);
    assert_eq!(f.forward(0, &[1.0, v]).unwrap(), vec![v * v]);
    assert_eq!(f.reverse(1, &[1.0]).unwrap(), vec![0.0, 2.0 * v]);
    assert_relative_eq!(f.forward(0, &[2.7, v]).unwrap()[0], v.exp());
    assert_relative_eq!(f.reverse(1, &[1.0]).unwrap()[1], v.exp());
}

#[test]
fn index_out_of_range_on_replay() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[0.0]).unwrap();
    let mut a = TrackedArray::from_values(&[1.0, 2.0]);
    let y = a.at(x[0]) * 2.0;
    let mut f = tape.close(&[y]).unwrap();
    assert_eq!(f.forward(0, &[1.0]).unwrap(), vec![4.0]);
    assert!(matches!(
        f.forward(0, &[2.0]),
        Err(AdError::IndexOutOfRange { index: 2, len: 2 })
    ));
    assert!(matches!(f.forward(0, &[-1.0]), Err(AdError::IndexOutOfRange { .. })));
}

#[test]
fn index_out_of_range_while_recording() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[5.0]).unwrap();
    let mut a = TrackedArray::<f64>::new(3);
    assert!(matches!(a.get(x[0]), Err(AdError::IndexOutOfRange { index: 5, len: 3 })));
    assert!(matches!(
        a.set(Tracked64::constant(3.0), x[0]),
        Err(AdError::IndexOutOfRange { .. })
    ));
    tape.abort().unwrap();
}

#[test]
fn store_through_variable_index() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[1.0, 4.0]).unwrap();
    let mut a = TrackedArray::from_values(&[10.0, 20.0, 30.0]);
    a.put(x[0], x[1] * 3.0);
    // Constant-index reads after an indexed store must go through the tape.
    let y0 = a.at(Tracked64::constant(0.0));
    let y1 = a.at(Tracked64::constant(1.0));
    let mut f = tape.close(&[y0, y1]).unwrap();

    assert_eq!(f.forward(0, &[1.0, 4.0]).unwrap(), vec![10.0, 12.0]);
    assert_eq!(f.reverse(1, &[0.0, 1.0]).unwrap(), vec![0.0, 3.0]);
    assert_eq!(f.forward(0, &[0.0, 4.0]).unwrap(), vec![12.0, 20.0]);
    assert_eq!(f.reverse(1, &[1.0, 0.0]).unwrap(), vec![0.0, 3.0]);
    assert_eq!(f.reverse(1, &[0.0, 1.0]).unwrap(), vec![0.0, 0.0]);
}

#[test]
fn later_store_overwrites_earlier_load_source() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[0.0, 2.0, 3.0]).unwrap();
    let mut a = TrackedArray::<f64>::new(2);
    a.put(x[0], x[1]);
    let first = a.at(x[0]);
    a.put(x[0], x[2]);
    let second = a.at(x[0]);
    let mut f = tape.close(&[first * second]).unwrap();

    assert_eq!(f.forward(0, &[1.0, 2.0, 3.0]).unwrap(), vec![6.0]);
    assert_eq!(f.reverse(1, &[1.0]).unwrap(), vec![0.0, 3.0, 2.0]);
}

#[test]
fn array_reused_across_recordings() {
    let mut a = TrackedArray::from_values(&[1.0, 2.0]);
    for scale in [2.0, 3.0] {
        let mut tape = Tape::<f64>::new();
        let x = tape.start(&[0.0]).unwrap();
        let y = a.at(x[0]) * scale;
        let mut f = tape.close(&[y]).unwrap();
        assert_eq!(f.forward(0, &[1.0]).unwrap(), vec![2.0 * scale]);
    }
    assert_eq!(a.len(), 2);
    assert!(!a.is_empty());
}

#[test]
fn higher_order_through_loads() {
    let mut tape = Tape::<f64>::new();
    let x = tape.start(&[1.0, 0.5]).unwrap();
    let mut a = TrackedArray::from_tracked(vec![x[1].sin(), x[1] * x[1]]);
    let y = a.at(x[0]);
    let mut f = tape.close(&[y]).unwrap();
    f.forward(0, &[1.0, 0.5]).unwrap();
    f.forward(1, &[0.0, 1.0]).unwrap();
    assert_eq!(f.forward(2, &[0.0, 0.0]).unwrap(), vec![1.0]);
}

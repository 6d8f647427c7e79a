//! One tape per thread, and concurrent sweeps of a shared sequence.

use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use tapir::{record, AdError, ErrorKind, Tape, Tracked64};

fn model(x: &[Tracked64]) -> Vec<Tracked64> {
    vec![x[0] * x[1].sin() + x[1] * x[1], (x[0] / x[1]).exp()]
}

fn model_f64(x: &[f64]) -> [f64; 2] {
    [x[0] * x[1].sin() + x[1] * x[1], (x[0] / x[1]).exp()]
}

#[test]
fn each_thread_records_its_own_tape() {
    let handles: Vec<_> = (0..4)
        .map(|t| {
            thread::spawn(move || {
                let scale = f64::from(t) + 1.0;
                let mut tape = Tape::<f64>::new();
                let x = tape.start(&[scale]).unwrap();
                let y = x[0] * x[0] * scale;
                let mut f = tape.close(&[y]).unwrap();
                f.forward(0, &[2.0]).unwrap();
                f.reverse(1, &[1.0]).unwrap()[0]
            })
        })
        .collect();
    for (t, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap(), 4.0 * (t as f64 + 1.0));
    }
}

#[test]
fn variables_of_a_tape_live_on_another_thread_are_rejected() {
    let mut tape_a = Tape::<f64>::new();
    let a = tape_a.start(&[1.0]).unwrap();
    let a_id = tape_a.id().unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            // No tape recording here.
            let err = a[0].try_add(Tracked64::constant(1.0)).unwrap_err();
            assert!(matches!(err, AdError::CrossTape { active: None, found } if found == a_id));

            let mut tape_b = Tape::<f64>::new();
            let b = tape_b.start(&[2.0]).unwrap();
            let b_id = tape_b.id().unwrap();
            let err = a[0].try_mul(b[0]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CrossTape);
            assert!(matches!(
                err,
                AdError::CrossTape { active: Some(active), found } if active == b_id && found == a_id
            ));
            let mut g = tape_b.close(&[b[0] * 3.0]).unwrap();
            assert_eq!(g.forward(0, &[1.0]).unwrap(), vec![3.0]);
        });
    });

    let mut f = tape_a.close(&[a[0] + 1.0]).unwrap();
    assert_eq!(f.forward(0, &[4.0]).unwrap(), vec![5.0]);
}

#[test]
fn closed_tape_values_are_constants_elsewhere() {
    let (x, y) = {
        let mut tape = Tape::<f64>::new();
        let x = tape.start(&[3.0]).unwrap();
        let y = x[0] * 2.0;
        tape.close(&[y]).unwrap();
        (x[0], y)
    };
    thread::scope(|s| {
        s.spawn(|| {
            let mut tape = Tape::<f64>::new();
            let z = tape.start(&[1.0]).unwrap();
            let w = z[0] * y + x;
            let mut f = tape.close(&[w]).unwrap();
            assert_eq!(f.forward(0, &[2.0]).unwrap(), vec![15.0]);
            assert_eq!(f.reverse(1, &[1.0]).unwrap(), vec![6.0]);
        });
    });
}

#[test]
fn shared_sequence_swept_with_private_caches() {
    let f = record(model, &[0.5, 1.5]).unwrap();
    let seq = Arc::clone(f.sequence());
    let points: Vec<[f64; 2]> = (0..8).map(|i| [0.1 * i as f64 - 0.3, 0.7 + 0.05 * i as f64]).collect();

    thread::scope(|s| {
        for chunk in points.chunks(2) {
            let seq = Arc::clone(&seq);
            s.spawn(move || {
                let mut cache = seq.new_cache();
                for x in chunk {
                    let y = seq.forward_with(&mut cache, 0, x).unwrap();
                    let expected = model_f64(x);
                    assert_relative_eq!(y[0], expected[0], max_relative = 1e-14);
                    assert_relative_eq!(y[1], expected[1], max_relative = 1e-14);

                    let g = seq.reverse_with(&mut cache, 1, &[1.0, 0.0]).unwrap();
                    assert_relative_eq!(g[0], x[1].sin(), max_relative = 1e-14);
                    assert_relative_eq!(g[1], x[0] * x[1].cos() + 2.0 * x[1], max_relative = 1e-14);
                }
            });
        }
    });
}

#[test]
fn cache_of_another_sequence_is_rejected() {
    let f = record(model, &[0.5, 1.5]).unwrap();
    let g = record(|x| vec![x[0] * 2.0], &[1.0, 2.0]).unwrap();
    let mut cache = g.sequence().new_cache();
    let err = f.sequence().forward_with(&mut cache, 0, &[1.0, 1.0]).unwrap_err();
    assert!(matches!(err, AdError::CacheMismatch { got_slots: 3, .. }));
    assert_eq!(err.kind(), ErrorKind::Usage);

    g.sequence().forward_with(&mut cache, 0, &[1.0, 1.0]).unwrap();
    assert!(matches!(
        f.sequence().reverse_with(&mut cache, 1, &[1.0, 0.0]),
        Err(AdError::CacheMismatch { .. })
    ));
}

#[test]
fn cloned_functions_move_between_threads() {
    let f = record(model, &[0.5, 1.5]).unwrap();
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let mut g = f.clone();
            thread::spawn(move || {
                let x = [f64::from(i), 1.0];
                g.forward(0, &x).unwrap();
                g.reverse(1, &[0.0, 1.0]).unwrap()
            })
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        let x0 = i as f64;
        let dw = h.join().unwrap();
        assert_relative_eq!(dw[0], x0.exp(), max_relative = 1e-14);
        assert_relative_eq!(dw[1], -x0 * x0.exp(), max_relative = 1e-14, epsilon = 1e-15);
    }
}

#[cfg(feature = "parallel")]
mod parallel {
    use super::*;

    #[test]
    fn batch_sweeps_match_sequential() {
        let mut f = record(model, &[0.5, 1.5]).unwrap();
        let points: Vec<Vec<f64>> = (0..32)
            .map(|i| vec![0.05 * i as f64 - 0.5, 0.6 + 0.02 * i as f64])
            .collect();

        let values = f.forward_batch(&points).unwrap();
        let grads = f.gradient_batch(&points, &[1.0, 1.0]).unwrap();
        for ((x, y), g) in points.iter().zip(&values).zip(&grads) {
            assert_eq!(y, &f.forward(0, x).unwrap());
            assert_eq!(g, &f.reverse(1, &[1.0, 1.0]).unwrap());
        }
    }

    #[test]
    fn parallel_jacobian_rows() {
        let f = record(model, &[0.5, 1.5]).unwrap();
        let x = [0.8, 1.2];
        let jac = f.jacobian_par(&x).unwrap();
        let (_, expected) = tapir::jacobian(model, &x).unwrap();
        assert_eq!(jac, expected);
    }

    #[test]
    fn batch_errors_propagate() {
        let f = record(model, &[0.5, 1.5]).unwrap();
        let points = vec![vec![1.0, 1.0], vec![1.0]];
        assert!(matches!(
            f.forward_batch(&points),
            Err(AdError::DomainMismatch { expected: 2, got: 1 })
        ));
    }
}

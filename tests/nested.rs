//! Tapes over non-float bases: derivatives of derivatives through
//! `Tracked<f64>`, and complex arithmetic.

use std::thread;

use approx::assert_relative_eq;
use num_complex::Complex;
use tapir::{cond_exp, grad, record, try_cond_exp, AdError, Base, CompareOp, Tape, Tracked, Tracked64};

/// f = x0^2 x1 + x0 sin(x1), generic over the recording base.
fn model<B: Base>(x: &[Tracked<B>]) -> Tracked<B> {
    x[0] * x[0] * x[1] + x[0] * x[1].sin()
}

fn gradient(x: &[f64]) -> [f64; 2] {
    [2.0 * x[0] * x[1] + x[1].sin(), x[0] * x[0] + x[0] * x[1].cos()]
}

fn hessian(x: &[f64]) -> [[f64; 2]; 2] {
    let off = 2.0 * x[0] + x[1].cos();
    [[2.0 * x[1], off], [off, -x[0] * x[1].sin()]]
}

// ── AD of AD ──

#[test]
fn gradient_recorded_on_an_inner_tape() {
    let x0 = [0.7, -0.4];
    let mut inner = Tape::<f64>::new();
    let x = inner.start(&x0).unwrap();

    let mut outer = Tape::<Tracked64>::new();
    let u = outer.start(&x).unwrap();
    let y = model(&u);
    let mut g = outer.close(&[y]).unwrap();

    // Sweeps of `g` run in Tracked64 arithmetic and land on `inner`.
    g.forward(0, &x).unwrap();
    let dg = g.reverse(1, &[Tracked64::constant(1.0)]).unwrap();
    assert!(dg.iter().all(|d| d.is_variable()));
    let mut h = inner.close(&dg).unwrap();

    for point in [x0, [1.3, 0.9]] {
        let value = h.forward(0, &point).unwrap();
        let expected = gradient(&point);
        assert_relative_eq!(value[0], expected[0], max_relative = 1e-14);
        assert_relative_eq!(value[1], expected[1], max_relative = 1e-14);

        let hess = hessian(&point);
        for i in 0..2 {
            let mut w = [0.0; 2];
            w[i] = 1.0;
            let row = h.reverse(1, &w).unwrap();
            assert_relative_eq!(row[0], hess[i][0], max_relative = 1e-13);
            assert_relative_eq!(row[1], hess[i][1], max_relative = 1e-13);
        }
    }
}

#[test]
fn gradient_helper_nests() {
    let x0 = [0.2, 1.1];
    let mut h = record(|x| grad(model, x).unwrap().1, &x0).unwrap();
    let point = [-0.5, 0.8];
    let value = h.forward(0, &point).unwrap();
    let expected = gradient(&point);
    assert_relative_eq!(value[0], expected[0], max_relative = 1e-14);
    assert_relative_eq!(value[1], expected[1], max_relative = 1e-14);

    // Second-order coefficients of the gradient along e0 carry third
    // derivatives of f: (f_000 / 2, f_001 / 2) = (0, 1).
    h.forward(1, &[1.0, 0.0]).unwrap();
    let c2 = h.forward(2, &[0.0, 0.0]).unwrap();
    assert_relative_eq!(c2[0], 0.0, epsilon = 1e-14);
    assert_relative_eq!(c2[1], 1.0, max_relative = 1e-14);
}

#[test]
fn inner_values_are_unreadable_while_recording() {
    let mut inner = Tape::<f64>::new();
    let x = inner.start(&[1.0]).unwrap();
    let mut outer = Tape::<Tracked64>::new();
    let u = outer.start(&x).unwrap();
    let y = u[0] * u[0];
    let mut g = outer.close(&[y]).unwrap();
    let out = g.forward(0, &x).unwrap();
    assert!(matches!(out[0].value(), Err(AdError::PrematureRead { .. })));
    inner.abort().unwrap();
    assert_eq!(out[0].value().unwrap(), 1.0);
}

#[test]
fn nested_comparison_reports_cross_tape_operands() {
    let mut outer = Tape::<Tracked64>::new();
    let u = outer.start(&[Tracked64::constant(1.0), Tracked64::constant(2.0)]).unwrap();
    let y = cond_exp(CompareOp::Lt, u[0], u[1], u[0], u[1]);
    let mut g = outer.close(&[y]).unwrap();

    let mut inner = Tape::<f64>::new();
    let x = inner.start(&[1.0, 2.0]).unwrap();
    let inner_id = inner.id().unwrap();
    thread::scope(|s| {
        s.spawn(|| {
            let err = g.forward(0, &x).unwrap_err();
            assert!(matches!(err, AdError::CrossTape { active: None, found } if found == inner_id));
        });
    });
    inner.abort().unwrap();
}

// ── Complex base ──

type C64 = Complex<f64>;

#[test]
fn complex_derivative_is_holomorphic() {
    let z0 = C64::new(0.5, 0.3);
    let mut f = record(|z| vec![z[0] * z[0] + z[0].exp()], &[z0]).unwrap();
    let z = C64::new(-0.2, 1.1);
    let y = f.forward(0, &[z]).unwrap();
    let expected = z * z + z.exp();
    assert_relative_eq!(y[0].re, expected.re, max_relative = 1e-14);
    assert_relative_eq!(y[0].im, expected.im, max_relative = 1e-14);

    let d = C64::new(2.0, 0.0) * z + z.exp();
    let dw = f.reverse(1, &[C64::new(1.0, 0.0)]).unwrap();
    assert_relative_eq!(dw[0].re, d.re, max_relative = 1e-14);
    assert_relative_eq!(dw[0].im, d.im, max_relative = 1e-14);

    let dy = f.forward(1, &[C64::new(1.0, 0.0)]).unwrap();
    assert_relative_eq!(dy[0].re, d.re, max_relative = 1e-14);
    assert_relative_eq!(dy[0].im, d.im, max_relative = 1e-14);
}

#[test]
fn complex_trig_series() {
    let z0 = C64::new(0.4, -0.7);
    let mut f = record(|z| vec![z[0].sin() * z[0].cos()], &[z0]).unwrap();
    f.forward(0, &[z0]).unwrap();
    // sin z cos z = sin(2z) / 2, derivative cos(2z)
    let d = f.forward(1, &[C64::new(1.0, 0.0)]).unwrap()[0];
    let expected = (z0 * 2.0).cos();
    assert_relative_eq!(d.re, expected.re, max_relative = 1e-13);
    assert_relative_eq!(d.im, expected.im, max_relative = 1e-13);
}

#[test]
fn complex_ordering_is_unordered() {
    let mut tape = Tape::<C64>::new();
    let z = tape.start(&[C64::new(1.0, 1.0), C64::new(2.0, 0.0)]).unwrap();
    assert!(matches!(
        z[0].try_compare(CompareOp::Lt, z[1]),
        Err(AdError::Unordered { op: CompareOp::Lt })
    ));
    assert!(matches!(
        try_cond_exp(CompareOp::Ge, z[0], z[1], z[0], z[1]),
        Err(AdError::Unordered { op: CompareOp::Ge })
    ));
    assert!(!z[0].try_compare(CompareOp::Eq, z[1]).unwrap());
    assert!(z[0].try_compare(CompareOp::Ne, z[1]).unwrap());
    tape.abort().unwrap();
}

//! The optimizer must never change what a recorded function computes.

use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tapir::{
    cond_exp, record, record_with_dynamic, CompareOp, OpCode, OptimizeOptions, RecordedFunction,
    Tape, Tracked64, TrackedArray,
};

/// A model with every kind of redundancy the optimizer looks for: repeated
/// subexpressions, addition chains, unused results and a conditional.
fn model(x: &[Tracked64]) -> Vec<Tracked64> {
    let a = x[0] * x[1];
    let b = x[0] * x[1];
    let _unused = x[2].exp() * a;
    let s = a + x[2] - b.sin() + x[0] - 1.5 + x[1];
    let c = cond_exp(CompareOp::Gt, x[0], x[2], s * s, a.cos());
    let t = b.sin() * x[2] - 2.0 * x[1];
    vec![c + b, s.tanh() * x[2] + t]
}

fn model_f64(x: &[f64]) -> Vec<f64> {
    let a = x[0] * x[1];
    let s = a + x[2] - a.sin() + x[0] - 1.5 + x[1];
    let c = if x[0] > x[2] { s * s } else { a.cos() };
    let t = a.sin() * x[2] - 2.0 * x[1];
    vec![c + a, s.tanh() * x[2] + t]
}

fn sample(rng: &mut ChaCha8Rng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.random_range(-2.0..2.0)).collect()
}

/// Values, gradients of both outputs and a Hessian-vector product of `f`
/// and `g` agree at `x`.
fn assert_equivalent(f: &mut RecordedFunction<f64>, g: &mut RecordedFunction<f64>, x: &[f64], dir: &[f64]) {
    let fy = f.forward(0, x).unwrap();
    let gy = g.forward(0, x).unwrap();
    for (a, b) in fy.iter().zip(&gy) {
        assert_relative_eq!(a, b, max_relative = 1e-12, epsilon = 1e-14);
    }
    let m = f.range_size();
    for i in 0..m {
        let mut w = vec![0.0; m];
        w[i] = 1.0;
        let fg = f.reverse(1, &w).unwrap();
        let gg = g.reverse(1, &w).unwrap();
        for (a, b) in fg.iter().zip(&gg) {
            assert_relative_eq!(a, b, max_relative = 1e-12, epsilon = 1e-14);
        }
    }
    let fd = f.forward(1, dir).unwrap();
    let gd = g.forward(1, dir).unwrap();
    for (a, b) in fd.iter().zip(&gd) {
        assert_relative_eq!(a, b, max_relative = 1e-12, epsilon = 1e-14);
    }
    let w = vec![1.0; m];
    let fh = f.reverse(2, &w).unwrap();
    let gh = g.reverse(2, &w).unwrap();
    for (a, b) in fh.iter().zip(&gh) {
        assert_relative_eq!(a, b, max_relative = 1e-11, epsilon = 1e-13);
    }
}

#[test]
fn conditional_survives_optimization() {
    let f = record(
        |x| vec![cond_exp(CompareOp::Lt, x[0], x[1], x[0] + x[1], x[0] - x[1])],
        &[1.0, 2.0],
    )
    .unwrap();
    let mut g = f.optimize(&OptimizeOptions::default());
    assert_eq!(g.forward(0, &[1.0, 2.0]).unwrap(), vec![3.0]);
    assert_eq!(g.forward(0, &[5.0, 2.0]).unwrap(), vec![3.0]);
}

#[test]
fn conditional_branches_with_distinct_operands() {
    let f = record(
        |x| vec![cond_exp(CompareOp::Lt, x[0], x[1], x[0] * x[2], x[1] - x[2])],
        &[1.0, 2.0, 4.0],
    )
    .unwrap();
    let mut g = f.optimize(&OptimizeOptions::default());
    assert_eq!(g.forward(0, &[1.0, 2.0, 4.0]).unwrap(), vec![4.0]);
    assert_eq!(g.reverse(1, &[1.0]).unwrap(), vec![4.0, 0.0, 1.0]);
    assert_eq!(g.forward(0, &[5.0, 2.0, 4.0]).unwrap(), vec![-2.0]);
    assert_eq!(g.reverse(1, &[1.0]).unwrap(), vec![0.0, 1.0, -1.0]);
}

#[test]
fn random_samples_agree() {
    let x0 = [0.5, -0.3, 0.1];
    let mut f = record(model, &x0).unwrap();
    let mut g = f.optimize(&OptimizeOptions::default());
    assert!(
        g.operation_count() < f.operation_count(),
        "{} -> {}",
        f.operation_count(),
        g.operation_count()
    );
    g.sequence().validate().unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut took = [false; 2];
    for _ in 0..200 {
        let x = sample(&mut rng, 3);
        let dir = sample(&mut rng, 3);
        took[usize::from(x[0] > x[2])] = true;
        assert_equivalent(&mut f, &mut g, &x, &dir);

        let direct = model_f64(&x);
        let y = g.forward(0, &x).unwrap();
        assert_relative_eq!(y[0], direct[0], max_relative = 1e-12, epsilon = 1e-14);
        assert_relative_eq!(y[1], direct[1], max_relative = 1e-12, epsilon = 1e-14);
    }
    assert_eq!(took, [true, true], "both branches sampled");
}

#[test]
fn each_stage_alone_preserves_results() {
    let x0 = [0.5, -0.3, 0.1];
    let mut f = record(model, &x0).unwrap();
    let none = OptimizeOptions {
        cumulative_sum: false,
        common_subexpression: false,
        conditional_skip: false,
        keep_compare: true,
    };
    let variants = [
        none,
        OptimizeOptions {
            cumulative_sum: true,
            ..none
        },
        OptimizeOptions {
            common_subexpression: true,
            ..none
        },
        OptimizeOptions {
            conditional_skip: true,
            ..none
        },
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for options in &variants {
        let mut g = f.optimize(options);
        g.sequence().validate().unwrap();
        for _ in 0..20 {
            let x = sample(&mut rng, 3);
            let dir = sample(&mut rng, 3);
            assert_equivalent(&mut f, &mut g, &x, &dir);
        }
    }
}

#[test]
fn optimizing_twice_changes_nothing() {
    let x0 = [0.5, -0.3, 0.1];
    let f = record(model, &x0).unwrap();
    let mut once = f.optimize(&OptimizeOptions::default());
    let mut twice = once.optimize(&OptimizeOptions::default());
    assert_eq!(twice.operation_count(), once.operation_count());

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for _ in 0..20 {
        let x = sample(&mut rng, 3);
        let dir = sample(&mut rng, 3);
        assert_equivalent(&mut once, &mut twice, &x, &dir);
    }
}

#[test]
fn dead_code_is_removed() {
    let f = record(
        |x| {
            let _dead = x[0].exp() * x[1].sin();
            vec![x[0] + x[1]]
        },
        &[1.0, 2.0],
    )
    .unwrap();
    assert_eq!(f.operation_count(), 6);
    let g = f.optimize(&OptimizeOptions::default());
    assert_eq!(g.operation_count(), 3);
    assert_eq!(g.slot_count(), 3);
}

#[test]
fn addition_chain_becomes_one_cumulative_sum() {
    let mut f = record(|x| vec![x[0] + x[1] - x[2] + x[3] + 4.0], &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let mut g = f.optimize(&OptimizeOptions::default());
    let sums: Vec<_> = g
        .sequence()
        .operations()
        .iter()
        .filter(|op| op.op == OpCode::CumSum)
        .collect();
    assert_eq!(sums.len(), 1);
    assert_eq!(g.operation_count(), 5);

    let x = [0.5, 1.5, -2.0, 3.0];
    assert_eq!(g.forward(0, &x).unwrap(), f.forward(0, &x).unwrap());
    assert_eq!(g.reverse(1, &[1.0]).unwrap(), vec![1.0, 1.0, -1.0, 1.0]);
}

#[test]
fn repeated_subexpressions_merge() {
    let f = record(
        |x| {
            let a = (x[0] * x[1]).exp();
            let b = (x[1] * x[0]).exp();
            vec![a + b]
        },
        &[0.1, 0.2],
    )
    .unwrap();
    let options = OptimizeOptions {
        cumulative_sum: false,
        ..OptimizeOptions::default()
    };
    let mut g = f.optimize(&options);
    // x0, x1, x0*x1, exp, add
    assert_eq!(g.operation_count(), 5);
    let y = g.forward(0, &[0.3, 0.4]).unwrap();
    assert_relative_eq!(y[0], 2.0 * 0.12f64.exp(), max_relative = 1e-15);
}

#[test]
fn conditional_skip_follows_dynamic_parameters() {
    let f = record_with_dynamic(
        |x, p| vec![cond_exp(CompareOp::Lt, p[0], p[1], x[0].sin(), x[0].exp())],
        &[0.5],
        &[0.0, 1.0],
    )
    .unwrap();
    let mut g = f.optimize(&OptimizeOptions::default());
    assert_eq!(g.sequence().skip_rule_count(), 1);

    let y = g.forward(0, &[0.5]).unwrap();
    assert_relative_eq!(y[0], 0.5f64.sin());
    assert_eq!(g.skipped_operation_count(), 1);
    assert_relative_eq!(g.reverse(1, &[1.0]).unwrap()[0], 0.5f64.cos());

    g.new_dynamic(&[2.0, 1.0]).unwrap();
    let y = g.forward(0, &[0.5]).unwrap();
    assert_relative_eq!(y[0], 0.5f64.exp());
    assert_eq!(g.skipped_operation_count(), 1);
    assert_relative_eq!(g.reverse(1, &[1.0]).unwrap()[0], 0.5f64.exp());
    let dy = g.forward(1, &[1.0]).unwrap();
    assert_relative_eq!(dy[0], 0.5f64.exp());

    let mut unskipped = f.optimize(&OptimizeOptions {
        conditional_skip: false,
        ..OptimizeOptions::default()
    });
    assert_eq!(unskipped.sequence().skip_rule_count(), 0);
    unskipped.forward(0, &[0.5]).unwrap();
    assert_eq!(unskipped.skipped_operation_count(), 0);
}

#[test]
fn optimized_function_keeps_dynamic_parameters() {
    let mut f = record_with_dynamic(|x, p| vec![x[0] * p[0]], &[1.0], &[2.0]).unwrap();
    f.new_dynamic(&[5.0]).unwrap();
    let mut g = f.optimize(&OptimizeOptions::default());
    assert_eq!(g.forward(0, &[3.0]).unwrap(), vec![15.0]);
}

#[test]
fn compare_operations_are_kept_on_request() {
    let f = {
        let mut tape = Tape::<f64>::new();
        let x = tape.start(&[1.0, 2.0]).unwrap();
        let y = if x[0] < x[1] { x[0] } else { x[1] };
        tape.close(&[y]).unwrap()
    };

    let mut kept = f.optimize(&OptimizeOptions::default());
    kept.forward(0, &[3.0, 2.0]).unwrap();
    assert_eq!(kept.compare_change_count(), 1);

    let mut dropped = f.optimize(&OptimizeOptions {
        keep_compare: false,
        ..OptimizeOptions::default()
    });
    assert!(dropped.operation_count() < kept.operation_count());
    dropped.forward(0, &[3.0, 2.0]).unwrap();
    assert_eq!(dropped.compare_change_count(), 0);
}

#[test]
fn arrays_survive_optimization() {
    let mut f = {
        let mut tape = Tape::<f64>::new();
        let x = tape.start(&[1.0, 0.5]).unwrap();
        let mut table = TrackedArray::from_values(&[1.0, 2.0, 3.0]);
        table.put(Tracked64::constant(2.0), x[1] * x[1]);
        let _dead = table.at(x[0]) * 7.0;
        let y = table.at(x[0]) + table.at(x[0]);
        tape.close(&[y * x[1]]).unwrap()
    };
    let mut g = f.optimize(&OptimizeOptions::default());
    g.sequence().validate().unwrap();
    for &(i, v) in &[(0.0, 0.5), (1.0, 2.0), (2.0, 3.0), (2.5, -1.0)] {
        let x = [i, v];
        assert_eq!(g.forward(0, &x).unwrap(), f.forward(0, &x).unwrap());
        assert_eq!(g.reverse(1, &[1.0]).unwrap(), f.reverse(1, &[1.0]).unwrap());
    }
}

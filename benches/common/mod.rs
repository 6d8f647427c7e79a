#![allow(dead_code)]

use tapir::{cond_exp, CompareOp, Tracked64};

// ─── Rosenbrock ────────────────────────────────────────────────────────────

pub fn rosenbrock(x: &[Tracked64]) -> Tracked64 {
    let mut sum = Tracked64::constant(0.0);
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum = sum + t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}

pub fn rosenbrock_f64(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum += t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}

// ─── Rastrigin ─────────────────────────────────────────────────────────────
// f(x) = 10n + Σ[x_i² - 10·cos(2π·x_i)]
// Long addition chain, exercises cos.

pub fn rastrigin(x: &[Tracked64]) -> Tracked64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let mut sum = Tracked64::constant(10.0 * x.len() as f64);
    for &xi in x {
        sum = sum + xi * xi - 10.0 * (two_pi * xi).cos();
    }
    sum
}

// ─── Neural Network Layer ──────────────────────────────────────────────────
// f(x) = Σ_j sigmoid(Σ_i w_ji·x_i + b_j), 4 hidden units
// Deterministic weights: w_ji = sin(j*N+i+1) / (N+1), b_j = 0.1*(j+1)

pub fn nn_layer(x: &[Tracked64]) -> Tracked64 {
    let n = x.len();
    let scale = 1.0 / (n as f64 + 1.0);
    let mut total = Tracked64::constant(0.0);
    for j in 0..4_usize {
        let mut z = Tracked64::constant(0.1 * (j as f64 + 1.0));
        for (i, &xi) in x.iter().enumerate() {
            let w = ((j * n + i + 1) as f64).sin() * scale;
            z = z + w * xi;
        }
        total = total + 1.0 / (1.0 + (-z).exp());
    }
    total
}

// ─── Redundant model ───────────────────────────────────────────────────────
// Repeated products, dead branches and a conditional on every term, so the
// optimizer has something to remove.

pub fn redundant(x: &[Tracked64]) -> Tracked64 {
    let mut sum = Tracked64::constant(0.0);
    for i in 0..x.len() - 1 {
        let a = x[i] * x[i + 1];
        let b = x[i] * x[i + 1];
        let _dead = a.exp() * b.sin();
        let c = cond_exp(CompareOp::Gt, x[i], x[i + 1], a.sin(), b.cos());
        sum = sum + a - b + c + x[i];
    }
    sum
}

// ─── Inputs ────────────────────────────────────────────────────────────────

pub fn make_input(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.01 * i as f64).collect()
}

pub fn finite_diff_gradient(f: fn(&[f64]) -> f64, x: &[f64], h: f64) -> Vec<f64> {
    let mut g = vec![0.0; x.len()];
    let mut xp = x.to_vec();
    for i in 0..x.len() {
        let orig = xp[i];
        xp[i] = orig + h;
        let fp = f(&xp);
        xp[i] = orig - h;
        let fm = f(&xp);
        xp[i] = orig;
        g[i] = (fp - fm) / (2.0 * h);
    }
    g
}

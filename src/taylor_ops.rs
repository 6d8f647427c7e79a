//! Taylor coefficient and adjoint rules for each opcode.
//!
//! Convention: `x(t) = Σ x[k] tᵏ`, so `x[k] = x⁽ᵏ⁾(0) / k!`.
//!
//! Forward rules fill coefficient `k` of every result of one operation from
//! coefficients `0..=k` of its operands and `0..k` of its results. Reverse
//! rules take the adjoints `p[0..=d]` of an operation's results and add the
//! increments of its operands' adjoints into `px`/`py`. Reverse rules may
//! overwrite the result adjoints they are given.

use crate::base::{real, Base};

/// Taylor coefficients of one operand.
///
/// Parameters (constants and dynamic parameters) are stored as their value;
/// all their higher-order coefficients are zero.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Series<'a, B> {
    Var(&'a [B]),
    Par(B),
}

impl<B: Base> Series<'_, B> {
    #[inline]
    pub(crate) fn at(&self, k: usize) -> B {
        match self {
            Series::Var(c) => c[k],
            Series::Par(v) => {
                if k == 0 {
                    *v
                } else {
                    B::zero()
                }
            }
        }
    }

    #[inline]
    pub(crate) fn is_par(&self) -> bool {
        matches!(self, Series::Par(_))
    }
}

#[inline]
fn inc<B: Base>(target: &mut B, delta: B) {
    *target = *target + delta;
}

#[inline]
fn dec<B: Base>(target: &mut B, delta: B) {
    *target = *target - delta;
}

// ══════════════════════════════════════════════
//  Forward rules
// ══════════════════════════════════════════════

#[inline]
pub(crate) fn add<B: Base>(k: usize, x: Series<B>, y: Series<B>, z: &mut [B]) {
    z[k] = x.at(k) + y.at(k);
}

#[inline]
pub(crate) fn sub<B: Base>(k: usize, x: Series<B>, y: Series<B>, z: &mut [B]) {
    z[k] = x.at(k) - y.at(k);
}

#[inline]
pub(crate) fn neg<B: Base>(k: usize, x: Series<B>, z: &mut [B]) {
    z[k] = -x.at(k);
}

/// Cauchy product `z[k] = Σ x[j] y[k-j]`.
pub(crate) fn mul<B: Base>(k: usize, x: Series<B>, y: Series<B>, z: &mut [B]) {
    if y.is_par() {
        z[k] = x.at(k) * y.at(0);
        return;
    }
    if x.is_par() {
        z[k] = x.at(0) * y.at(k);
        return;
    }
    let mut sum = x.at(0) * y.at(k);
    for j in 1..=k {
        sum = sum + x.at(j) * y.at(k - j);
    }
    z[k] = sum;
}

pub(crate) fn azmul<B: Base>(k: usize, x: Series<B>, y: Series<B>, z: &mut [B]) {
    let mut sum = x.at(0).azmul(y.at(k));
    for j in 1..=k {
        sum = sum + x.at(j).azmul(y.at(k - j));
    }
    z[k] = sum;
}

/// `z[k] = (x[k] - Σ_{j=1}^{k} z[k-j] y[j]) / y[0]`
pub(crate) fn div<B: Base>(k: usize, x: Series<B>, y: Series<B>, z: &mut [B]) {
    if k == 0 {
        z[0] = x.at(0) / y.at(0);
        return;
    }
    let mut num = x.at(k);
    if !y.is_par() {
        for j in 1..=k {
            num = num - z[k - j] * y.at(j);
        }
    }
    z[k] = num / y.at(0);
}

pub(crate) fn abs<B: Base>(k: usize, x: Series<B>, z: &mut [B]) {
    z[k] = if k == 0 {
        x.at(0).abs()
    } else {
        x.at(0).signum() * x.at(k)
    };
}

pub(crate) fn sign<B: Base>(k: usize, x: Series<B>, z: &mut [B]) {
    z[k] = if k == 0 { x.at(0).signum() } else { B::zero() };
}

/// `z[k] = (x[k] - Σ_{j=1}^{k-1} z[j] z[k-j]) / (2 z[0])`
pub(crate) fn sqrt<B: Base>(k: usize, x: Series<B>, z: &mut [B]) {
    if k == 0 {
        z[0] = x.at(0).sqrt();
        return;
    }
    let mut num = x.at(k);
    for j in 1..k {
        num = num - z[j] * z[k - j];
    }
    z[k] = num / (real::<B>(2) * z[0]);
}

/// `exp` (or `exp_m1` when `minus_one`): `z[k] = (1/k) Σ_{m=1}^{k} m x[m] y[k-m]`
/// with `y = exp(x)`.
pub(crate) fn exp<B: Base>(k: usize, x: Series<B>, z: &mut [B], minus_one: bool) {
    if k == 0 {
        z[0] = if minus_one { x.at(0).exp_m1() } else { x.at(0).exp() };
        return;
    }
    let y0 = if minus_one { z[0] + B::one() } else { z[0] };
    let mut sum = B::zero();
    for m in 1..=k {
        let y = if m == k { y0 } else { z[k - m] };
        sum = sum + real::<B>(m) * x.at(m) * y;
    }
    z[k] = sum / real(k);
}

/// Logarithm of `b` where `b[0] = b0` and `b[k] = x[k]` for `k >= 1`; covers
/// both `ln x` and `ln(1 + x)`. Order zero is filled by the caller.
pub(crate) fn log_step<B: Base>(k: usize, x: Series<B>, b0: B, z: &mut [B]) {
    let mut sum = B::zero();
    for m in 1..k {
        sum = sum + real::<B>(m) * z[m] * x.at(k - m);
    }
    z[k] = (x.at(k) - sum / real(k)) / b0;
}

pub(crate) fn ln<B: Base>(k: usize, x: Series<B>, z: &mut [B], one_plus: bool) {
    if k == 0 {
        z[0] = if one_plus { x.at(0).ln_1p() } else { x.at(0).ln() };
        return;
    }
    let b0 = if one_plus { B::one() + x.at(0) } else { x.at(0) };
    log_step(k, x, b0, z);
}

/// Sine and cosine (or hyperbolic sine and cosine) computed together.
pub(crate) fn sin_cos<B: Base>(k: usize, x: Series<B>, s: &mut [B], c: &mut [B], hyperbolic: bool) {
    let x0 = x.at(0);
    if k == 0 {
        if hyperbolic {
            s[0] = x0.sinh();
            c[0] = x0.cosh();
        } else {
            s[0] = x0.sin();
            c[0] = x0.cos();
        }
        return;
    }
    let mut ss = B::zero();
    let mut cc = B::zero();
    for m in 1..=k {
        let mx = real::<B>(m) * x.at(m);
        ss = ss + mx * c[k - m];
        cc = cc + mx * s[k - m];
    }
    let kk = real::<B>(k);
    s[k] = ss / kk;
    c[k] = if hyperbolic { cc / kk } else { -(cc / kk) };
}

/// `tan` (or `tanh`) with auxiliary `y = z * z`.
pub(crate) fn tan<B: Base>(k: usize, x: Series<B>, z: &mut [B], y: &mut [B], hyperbolic: bool) {
    if k == 0 {
        z[0] = if hyperbolic { x.at(0).tanh() } else { x.at(0).tan() };
        y[0] = z[0] * z[0];
        return;
    }
    let mut sum = B::zero();
    for m in 1..=k {
        sum = sum + real::<B>(m) * x.at(m) * y[k - m];
    }
    let scaled = sum / real(k);
    z[k] = if hyperbolic { x.at(k) - scaled } else { x.at(k) + scaled };
    let mut sq = z[0] * z[k];
    for m in 1..=k {
        sq = sq + z[m] * z[k - m];
    }
    y[k] = sq;
}

/// `asin` (or `acos`) with auxiliary `b = sqrt(1 - x * x)`.
pub(crate) fn asin<B: Base>(k: usize, x: Series<B>, z: &mut [B], b: &mut [B], acos: bool) {
    if k == 0 {
        let x0 = x.at(0);
        z[0] = if acos { x0.acos() } else { x0.asin() };
        b[0] = (B::one() - x0 * x0).sqrt();
        return;
    }
    let mut q = B::zero();
    for m in 0..=k {
        q = q + x.at(m) * x.at(k - m);
    }
    let mut bb = B::zero();
    for m in 1..k {
        bb = bb + b[m] * b[k - m];
    }
    b[k] = (-q - bb) / (real::<B>(2) * b[0]);

    let mut sum = B::zero();
    for m in 1..k {
        sum = sum + real::<B>(m) * z[m] * b[k - m];
    }
    let lead = if acos { -x.at(k) } else { x.at(k) };
    z[k] = (lead - sum / real(k)) / b[0];
}

/// `atan` with auxiliary `b = 1 + x * x`.
pub(crate) fn atan<B: Base>(k: usize, x: Series<B>, z: &mut [B], b: &mut [B]) {
    if k == 0 {
        let x0 = x.at(0);
        z[0] = x0.atan();
        b[0] = B::one() + x0 * x0;
        return;
    }
    let mut q = B::zero();
    for m in 0..=k {
        q = q + x.at(m) * x.at(k - m);
    }
    b[k] = q;
    let mut sum = B::zero();
    for m in 1..k {
        sum = sum + real::<B>(m) * z[m] * b[k - m];
    }
    z[k] = (x.at(k) - sum / real(k)) / b[0];
}

/// `z = x^y` through `l = ln x`, `w = y * l`, `z = exp(w)`.
pub(crate) fn pow<B: Base>(
    k: usize,
    x: Series<B>,
    y: Series<B>,
    z: &mut [B],
    l: &mut [B],
    w: &mut [B],
) {
    if k == 0 {
        let (x0, y0) = (x.at(0), y.at(0));
        l[0] = x0.ln();
        w[0] = y0 * l[0];
        z[0] = x0.powf(y0);
        return;
    }
    log_step(k, x, x.at(0), l);
    mul(k, y, Series::Var(l), w);
    let mut sum = B::zero();
    for m in 1..=k {
        sum = sum + real::<B>(m) * w[m] * z[k - m];
    }
    z[k] = sum / real(k);
}

/// Left fold of signed terms, in recorded order.
pub(crate) fn cumsum<'a, B: Base + 'a>(
    k: usize,
    terms: impl IntoIterator<Item = (bool, Series<'a, B>)>,
    z: &mut [B],
) {
    let mut acc: Option<B> = None;
    for (negate, t) in terms {
        let v = t.at(k);
        acc = Some(match (acc, negate) {
            (None, false) => v,
            (None, true) => -v,
            (Some(a), false) => a + v,
            (Some(a), true) => a - v,
        });
    }
    z[k] = acc.unwrap_or_else(B::zero);
}

// ══════════════════════════════════════════════
//  Reverse rules
// ══════════════════════════════════════════════

pub(crate) fn reverse_add<B: Base>(d: usize, pz: &[B], px: &mut [B], py: &mut [B]) {
    for k in 0..=d {
        inc(&mut px[k], pz[k]);
        inc(&mut py[k], pz[k]);
    }
}

pub(crate) fn reverse_sub<B: Base>(d: usize, pz: &[B], px: &mut [B], py: &mut [B]) {
    for k in 0..=d {
        inc(&mut px[k], pz[k]);
        dec(&mut py[k], pz[k]);
    }
}

pub(crate) fn reverse_neg<B: Base>(d: usize, pz: &[B], px: &mut [B]) {
    for k in 0..=d {
        dec(&mut px[k], pz[k]);
    }
}

pub(crate) fn reverse_mul<B: Base>(
    d: usize,
    x: Series<B>,
    y: Series<B>,
    pz: &[B],
    px: &mut [B],
    py: &mut [B],
) {
    for k in (0..=d).rev() {
        for j in 0..=k {
            inc(&mut px[j], pz[k] * y.at(k - j));
            inc(&mut py[k - j], pz[k] * x.at(j));
        }
    }
}

pub(crate) fn reverse_azmul<B: Base>(
    d: usize,
    x: Series<B>,
    y: Series<B>,
    pz: &[B],
    px: &mut [B],
    py: &mut [B],
) {
    for k in (0..=d).rev() {
        for j in 0..=k {
            inc(&mut px[j], pz[k].azmul(y.at(k - j)));
            inc(&mut py[k - j], x.at(j).azmul(pz[k]));
        }
    }
}

pub(crate) fn reverse_div<B: Base>(
    d: usize,
    y: Series<B>,
    z: &[B],
    pz: &mut [B],
    px: &mut [B],
    py: &mut [B],
) {
    let y0 = y.at(0);
    for j in (0..=d).rev() {
        let t = pz[j] / y0;
        pz[j] = t;
        inc(&mut px[j], t);
        for m in 1..=j {
            dec(&mut pz[j - m], t * y.at(m));
            dec(&mut py[m], t * z[j - m]);
        }
        dec(&mut py[0], t * z[j]);
    }
}

pub(crate) fn reverse_abs<B: Base>(d: usize, x: Series<B>, pz: &[B], px: &mut [B]) {
    let s = x.at(0).signum();
    for k in 0..=d {
        inc(&mut px[k], s * pz[k]);
    }
}

pub(crate) fn reverse_sqrt<B: Base>(d: usize, z: &[B], pz: &mut [B], px: &mut [B]) {
    let z0 = z[0];
    let two = real::<B>(2);
    for j in (1..=d).rev() {
        let t = pz[j] / z0;
        dec(&mut pz[0], t * z[j]);
        inc(&mut px[j], t / two);
        for m in 1..j {
            dec(&mut pz[m], t * z[j - m]);
        }
    }
    inc(&mut px[0], pz[0] / (two * z0));
}

pub(crate) fn reverse_exp<B: Base>(
    d: usize,
    x: Series<B>,
    z: &[B],
    pz: &mut [B],
    px: &mut [B],
    minus_one: bool,
) {
    let y0 = if minus_one { z[0] + B::one() } else { z[0] };
    for j in (1..=d).rev() {
        let jj = real::<B>(j);
        for m in 1..=j {
            let c = pz[j] * real::<B>(m) / jj;
            let y = if m == j { y0 } else { z[j - m] };
            inc(&mut px[m], c * y);
            inc(&mut pz[j - m], c * x.at(m));
        }
    }
    inc(&mut px[0], pz[0] * y0);
}

/// Adjoint of [`log_step`] for orders `1..=d` plus order zero `z[0] = ln b0`.
pub(crate) fn reverse_log<B: Base>(
    d: usize,
    x: Series<B>,
    b0: B,
    z: &[B],
    pz: &mut [B],
    px: &mut [B],
) {
    for j in (1..=d).rev() {
        let t = pz[j] / b0;
        inc(&mut px[j], t);
        dec(&mut px[0], t * z[j]);
        let jj = real::<B>(j);
        for m in 1..j {
            let c = t * real::<B>(m) / jj;
            dec(&mut pz[m], c * x.at(j - m));
            dec(&mut px[j - m], c * z[m]);
        }
    }
    inc(&mut px[0], pz[0] / b0);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn reverse_sin_cos<B: Base>(
    d: usize,
    x: Series<B>,
    s: &[B],
    c: &[B],
    ps: &mut [B],
    pc: &mut [B],
    px: &mut [B],
    hyperbolic: bool,
) {
    for j in (1..=d).rev() {
        let jj = real::<B>(j);
        for m in 1..=j {
            let f = real::<B>(m) / jj;
            let xm = x.at(m);
            let cross = if hyperbolic {
                ps[j] * c[j - m] + pc[j] * s[j - m]
            } else {
                ps[j] * c[j - m] - pc[j] * s[j - m]
            };
            inc(&mut px[m], f * cross);
            inc(&mut pc[j - m], ps[j] * f * xm);
            if hyperbolic {
                inc(&mut ps[j - m], pc[j] * f * xm);
            } else {
                dec(&mut ps[j - m], pc[j] * f * xm);
            }
        }
    }
    let zero_order = if hyperbolic {
        ps[0] * c[0] + pc[0] * s[0]
    } else {
        ps[0] * c[0] - pc[0] * s[0]
    };
    inc(&mut px[0], zero_order);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn reverse_tan<B: Base>(
    d: usize,
    x: Series<B>,
    z: &[B],
    y: &[B],
    pz: &mut [B],
    py: &mut [B],
    px: &mut [B],
    hyperbolic: bool,
) {
    let two = real::<B>(2);
    for j in (1..=d).rev() {
        // y[j] = Σ z[m] z[j-m]
        let t = two * py[j];
        for m in 0..=j {
            inc(&mut pz[m], t * z[j - m]);
        }
        // z[j] = x[j] ± (1/j) Σ m x[m] y[j-m]
        inc(&mut px[j], pz[j]);
        let jj = real::<B>(j);
        for m in 1..=j {
            let f = pz[j] * real::<B>(m) / jj;
            if hyperbolic {
                dec(&mut px[m], f * y[j - m]);
                dec(&mut py[j - m], f * x.at(m));
            } else {
                inc(&mut px[m], f * y[j - m]);
                inc(&mut py[j - m], f * x.at(m));
            }
        }
    }
    inc(&mut pz[0], two * py[0] * z[0]);
    let slope = if hyperbolic { B::one() - y[0] } else { B::one() + y[0] };
    inc(&mut px[0], pz[0] * slope);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn reverse_asin<B: Base>(
    d: usize,
    x: Series<B>,
    z: &[B],
    b: &[B],
    pz: &mut [B],
    pb: &mut [B],
    px: &mut [B],
    acos: bool,
) {
    let b0 = b[0];
    for j in (1..=d).rev() {
        let jj = real::<B>(j);
        let t = pz[j] / b0;
        if acos {
            dec(&mut px[j], t);
        } else {
            inc(&mut px[j], t);
        }
        dec(&mut pb[0], t * z[j]);
        for m in 1..j {
            let f = t * real::<B>(m) / jj;
            dec(&mut pz[m], f * b[j - m]);
            dec(&mut pb[j - m], f * z[m]);
        }

        let u = pb[j] / b0;
        dec(&mut pb[0], u * b[j]);
        for m in 1..j {
            dec(&mut pb[m], u * b[j - m]);
        }
        for m in 0..=j {
            dec(&mut px[m], u * x.at(j - m));
        }
    }
    let x0 = x.at(0);
    if acos {
        dec(&mut px[0], pz[0] / b0);
    } else {
        inc(&mut px[0], pz[0] / b0);
    }
    dec(&mut px[0], pb[0] * x0 / b0);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn reverse_atan<B: Base>(
    d: usize,
    x: Series<B>,
    z: &[B],
    b: &[B],
    pz: &mut [B],
    pb: &mut [B],
    px: &mut [B],
) {
    let b0 = b[0];
    let two = real::<B>(2);
    for j in (1..=d).rev() {
        let jj = real::<B>(j);
        let t = pz[j] / b0;
        inc(&mut px[j], t);
        dec(&mut pb[0], t * z[j]);
        for m in 1..j {
            let f = t * real::<B>(m) / jj;
            dec(&mut pz[m], f * b[j - m]);
            dec(&mut pb[j - m], f * z[m]);
        }
        let u = two * pb[j];
        for m in 0..=j {
            inc(&mut px[m], u * x.at(j - m));
        }
    }
    inc(&mut px[0], pz[0] / b0 + two * x.at(0) * pb[0]);
}

/// Adjoint of [`pow`]: the exponential, product and logarithm stages are
/// reversed one after the other.
#[allow(clippy::too_many_arguments)]
pub(crate) fn reverse_pow<B: Base>(
    d: usize,
    x: Series<B>,
    y: Series<B>,
    z: &[B],
    l: &[B],
    w: &[B],
    pz: &mut [B],
    pl: &mut [B],
    pw: &mut [B],
    px: &mut [B],
    py: &mut [B],
) {
    reverse_exp(d, Series::Var(w), z, pz, pw, false);
    reverse_mul(d, y, Series::Var(l), pw, py, pl);
    reverse_log(d, x, x.at(0), l, pl, px);
}

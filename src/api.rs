//! Function-style entry points.
//!
//! [`begin_recording`] and [`finish_recording`] mirror [`Tape::start`] and
//! [`Tape::close`]. [`record`] wraps both around a closure; [`grad`],
//! [`jacobian`] and [`hessian`] record once and sweep the result.

use crate::base::Base;
use crate::error::Result;
use crate::function::RecordedFunction;
use crate::tape::Tape;
use crate::tracked::Tracked;

/// Start a new tape recording with `x` as independent variables.
pub fn begin_recording<B: Base>(x: &[B]) -> Result<(Tape<B>, Vec<Tracked<B>>)> {
    let mut tape = Tape::new();
    let vars = tape.start(x)?;
    Ok((tape, vars))
}

/// Close `tape` with `y` as dependents.
pub fn finish_recording<B: Base>(mut tape: Tape<B>, y: &[Tracked<B>]) -> Result<RecordedFunction<B>> {
    tape.close(y)
}

/// Record `f` at `x`.
///
/// The recording follows the branches `f` takes at `x`; use
/// [`cond_exp`](crate::cond_exp) for branches that must be re-decided on
/// replay.
///
/// ```
/// let mut f = tapir::record(|x| vec![x[0] * x[0] + x[1] * x[1]], &[3.0, 4.0]).unwrap();
/// assert_eq!(f.forward(0, &[1.0, 2.0]).unwrap(), vec![5.0]);
/// assert_eq!(f.reverse(1, &[1.0]).unwrap(), vec![2.0, 4.0]);
/// ```
pub fn record<B: Base>(
    f: impl FnOnce(&[Tracked<B>]) -> Vec<Tracked<B>>,
    x: &[B],
) -> Result<RecordedFunction<B>> {
    let mut tape = Tape::new();
    let vars = tape.start(x)?;
    let y = f(&vars);
    tape.close(&y)
}

/// Record `f` at `x` with dynamic parameters `p`.
pub fn record_with_dynamic<B: Base>(
    f: impl FnOnce(&[Tracked<B>], &[Tracked<B>]) -> Vec<Tracked<B>>,
    x: &[B],
    p: &[B],
) -> Result<RecordedFunction<B>> {
    let mut tape = Tape::new();
    let (vars, params) = tape.start_with_dynamic(x, p)?;
    let y = f(&vars, &params);
    tape.close(&y)
}

/// Value and gradient of a scalar function.
pub fn grad<B: Base>(f: impl FnOnce(&[Tracked<B>]) -> Tracked<B>, x: &[B]) -> Result<(B, Vec<B>)> {
    let mut rf = record(|v| vec![f(v)], x)?;
    let y = rf.forward(0, x)?;
    let g = rf.reverse(1, &[B::one()])?;
    Ok((y[0], g))
}

/// Values and Jacobian `J[i][j] = ∂f_i/∂x_j`, one reverse sweep per output.
pub fn jacobian<B: Base>(
    f: impl FnOnce(&[Tracked<B>]) -> Vec<Tracked<B>>,
    x: &[B],
) -> Result<(Vec<B>, Vec<Vec<B>>)> {
    let mut rf = record(f, x)?;
    let y = rf.forward(0, x)?;
    let mut w = vec![B::zero(); y.len()];
    let mut jac = Vec::with_capacity(y.len());
    for i in 0..y.len() {
        w[i] = B::one();
        jac.push(rf.reverse(1, &w)?);
        w[i] = B::zero();
    }
    Ok((y, jac))
}

/// Value, gradient and Hessian of a scalar function.
///
/// Column `j` of the Hessian comes from a first-order forward sweep in
/// direction `e_j` followed by a two-order reverse sweep.
pub fn hessian<B: Base>(
    f: impl FnOnce(&[Tracked<B>]) -> Tracked<B>,
    x: &[B],
) -> Result<(B, Vec<B>, Vec<Vec<B>>)> {
    let n = x.len();
    let mut rf = record(|v| vec![f(v)], x)?;
    let value = rf.forward(0, x)?[0];
    let mut gradient = vec![B::zero(); n];
    let mut hess = vec![vec![B::zero(); n]; n];
    let mut dir = vec![B::zero(); n];
    for j in 0..n {
        dir[j] = B::one();
        rf.forward(1, &dir)?;
        dir[j] = B::zero();
        let dw = rf.reverse(2, &[B::zero(), B::one()])?;
        for i in 0..n {
            gradient[i] = dw[i * 2 + 1];
            hess[i][j] = dw[i * 2];
        }
    }
    Ok((value, gradient, hess))
}

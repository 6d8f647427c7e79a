//! User-supplied functions recorded as a single operation.
//!
//! - [`Discrete`]: a piecewise-constant scalar function. Its value is
//!   recomputed on every zero-order sweep; all its derivatives are zero.
//! - [`AtomicFunction`]: a vector function with user-provided Taylor and
//!   adjoint rules, recorded as one [`OpCode::Call`].
//! - [`Checkpoint`]: an [`AtomicFunction`] backed by another recorded
//!   function, so a sub-computation is stored once and replayed on demand.

use std::fmt;
use std::sync::Arc;

use crate::base::Base;
use crate::error::{AdError, Result};
use crate::function::{OpSequence, RecordedFunction, TaylorCache};
use crate::opcode::{Arg, OpCode};
use crate::sparse::SparsityPattern;
use crate::tracked::{emit, or_panic, Tracked};

// ══════════════════════════════════════════════
//  Discrete functions
// ══════════════════════════════════════════════

/// A named piecewise-constant function, e.g. rounding or a table lookup.
///
/// Functions are identified on a tape by name.
#[derive(Clone, Copy)]
pub struct Discrete<B> {
    name: &'static str,
    function: fn(B) -> B,
}

impl<B: Base> Discrete<B> {
    pub const fn new(name: &'static str, function: fn(B) -> B) -> Self {
        Discrete { name, function }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Same name and same function pointer.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        self.name == other.name && self.function as usize == other.function as usize
    }

    #[inline]
    pub fn eval(&self, x: B) -> B {
        (self.function)(x)
    }

    /// Apply to a tracked value, recording the call when `x` is bound.
    pub fn try_call(&self, x: Tracked<B>) -> Result<Tracked<B>> {
        let value = self.eval(x.value);
        let emitted = emit(OpCode::Discrete, &[x], 1, |rec| {
            Some(vec![Arg::Imm(rec.discrete_index(self))])
        })?;
        Ok(match emitted {
            Some(e) => Tracked::bound(value, e.binding(0)),
            None => Tracked::constant(value),
        })
    }

    pub fn call(&self, x: Tracked<B>) -> Tracked<B> {
        or_panic(self.try_call(x))
    }
}

impl<B> fmt::Debug for Discrete<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Discrete").field(&self.name).finish()
    }
}

// ══════════════════════════════════════════════
//  Atomic functions
// ══════════════════════════════════════════════

/// A vector function `y = g(x)` with its own derivative rules.
///
/// Taylor coefficients are passed in flat arrays with `order + 1`
/// coefficients per component: `tx[j * (order + 1) + k]` is coefficient `k`
/// of input `j`, and likewise for `ty`.
pub trait AtomicFunction<B: Base>: Send + Sync {
    fn name(&self) -> &str;

    fn domain_size(&self) -> usize;

    fn range_size(&self) -> usize;

    /// Fill coefficient `order` of every output. Coefficients `0..order` of
    /// `ty` hold the values from earlier calls.
    fn forward(&self, order: usize, tx: &[B], ty: &mut [B]) -> Result<()>;

    /// Given adjoints `py` of the output coefficients `0..=order`, add the
    /// adjoints of the input coefficients to `px`, which arrives zeroed.
    fn reverse(&self, order: usize, tx: &[B], ty: &[B], py: &[B], px: &mut [B]) -> Result<()>;

    /// `(output, input)` pairs along which the Jacobian may be nonzero.
    /// Defaults to every pair.
    fn dependency(&self) -> Vec<(usize, usize)> {
        let n = self.domain_size();
        (0..self.range_size())
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .collect()
    }
}

/// Evaluate `function` at `x`, recording one call operation when any input
/// is bound to the active tape.
pub fn call_atomic<B: Base>(
    function: &Arc<dyn AtomicFunction<B>>,
    x: &[Tracked<B>],
) -> Result<Vec<Tracked<B>>> {
    if x.len() != function.domain_size() {
        return Err(AdError::DomainMismatch {
            expected: function.domain_size(),
            got: x.len(),
        });
    }
    let m = function.range_size();
    let tx: Vec<B> = x.iter().map(|t| t.value).collect();
    let mut ty = vec![B::zero(); m];
    function
        .forward(0, &tx, &mut ty)
        .map_err(|e| tag_error(function.name(), e))?;

    let emitted = emit(OpCode::Call, x, m as u32, |rec| {
        Some(vec![Arg::Imm(rec.atomic_index(function))])
    })?;
    Ok(ty
        .into_iter()
        .enumerate()
        .map(|(i, v)| match &emitted {
            Some(e) => Tracked::bound(v, e.binding(i as u32)),
            None => Tracked::constant(v),
        })
        .collect())
}

/// Attach the function name to an error raised inside an atomic function.
pub(crate) fn tag_error(name: &str, err: AdError) -> AdError {
    match err {
        AdError::Atomic { .. } => err,
        other => AdError::Atomic {
            name: name.to_string(),
            message: other.to_string(),
        },
    }
}

// ══════════════════════════════════════════════
//  Checkpoints
// ══════════════════════════════════════════════

/// A recorded function used as an atomic function.
///
/// Every call replays the stored sequence in a private cache, so one
/// checkpoint may be called from several recordings and threads.
pub struct Checkpoint<B: Base> {
    name: String,
    body: Arc<OpSequence<B>>,
    dependency: Vec<(usize, usize)>,
}

impl<B: Base> Checkpoint<B> {
    pub fn new(name: impl Into<String>, function: &RecordedFunction<B>) -> Result<Self> {
        let body = Arc::clone(function.sequence());
        let jac = body.forward_sparsity(&SparsityPattern::identity(body.domain_size()))?;
        Ok(Checkpoint {
            name: name.into(),
            body,
            dependency: jac.entries(),
        })
    }

    /// Wrap for use with [`call_atomic`].
    pub fn into_atomic(self) -> Arc<dyn AtomicFunction<B>> {
        Arc::new(self)
    }

    /// Run orders `0..=order` of the stored sequence.
    fn replay(&self, order: usize, tx: &[B]) -> Result<(TaylorCache<B>, Vec<Vec<B>>)> {
        let (n, q) = (self.body.domain_size(), order + 1);
        let mut cache = self.body.new_cache();
        let mut ys = Vec::with_capacity(q);
        for k in 0..q {
            let xk: Vec<B> = (0..n).map(|j| tx[j * q + k]).collect();
            ys.push(self.body.forward_with(&mut cache, k, &xk)?);
        }
        Ok((cache, ys))
    }
}

impl<B: Base> AtomicFunction<B> for Checkpoint<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain_size(&self) -> usize {
        self.body.domain_size()
    }

    fn range_size(&self) -> usize {
        self.body.range_size()
    }

    fn forward(&self, order: usize, tx: &[B], ty: &mut [B]) -> Result<()> {
        let q = order + 1;
        let (_, ys) = self.replay(order, tx)?;
        for (i, &y) in ys[order].iter().enumerate() {
            ty[i * q + order] = y;
        }
        Ok(())
    }

    fn reverse(&self, order: usize, tx: &[B], _ty: &[B], py: &[B], px: &mut [B]) -> Result<()> {
        let q = order + 1;
        let (mut cache, _) = self.replay(order, tx)?;
        let dw = self.body.reverse_with(&mut cache, q, py)?;
        for (p, d) in px.iter_mut().zip(dw) {
            *p = *p + d;
        }
        Ok(())
    }

    fn dependency(&self) -> Vec<(usize, usize)> {
        self.dependency.clone()
    }
}

impl<B: Base> fmt::Debug for Checkpoint<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("name", &self.name)
            .field("body", &self.body)
            .finish()
    }
}

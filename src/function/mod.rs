//! Recorded functions.
//!
//! Closing a [`Tape`](crate::Tape) yields an immutable [`OpSequence`]: the
//! operations, the constant pool, and the independent and dependent slot
//! lists. A [`RecordedFunction`] pairs a shared sequence with a private
//! [`TaylorCache`], so clones of a recorded function can be swept on
//! different threads.

use std::fmt;
use std::sync::Arc;

use crate::atomic::{AtomicFunction, Discrete};
use crate::base::{Base, CompareOp};
use crate::error::{AdError, Result};
use crate::opcode::{Arg, NO_RESULT};
use crate::sparse::SparsityPattern;
use crate::tape::Operation;
use crate::taylor_ops::Series;

mod forward;
#[cfg(feature = "parallel")]
mod parallel;
mod reverse;
mod sparse_derivative;
mod sparsity;
mod validate;

/// Initial contents of an indexed array, captured when the array first
/// took part in a recording.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Arena {
    pub(crate) elements: Vec<Arg>,
    /// Number of operations recorded before the array was registered.
    pub(crate) position: u32,
}

/// Operations that only feed one branch of a conditional expression whose
/// comparison depends on parameters alone.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SkipRule {
    pub(crate) cmp: CompareOp,
    pub(crate) left: Arg,
    pub(crate) right: Arg,
    /// Operation indices to skip when the comparison holds.
    pub(crate) if_true: Vec<u32>,
    /// Operation indices to skip when it does not.
    pub(crate) if_false: Vec<u32>,
}

/// The immutable operation sequence of a recorded function.
#[derive(Clone)]
pub struct OpSequence<B: Base> {
    pub(crate) ops: Vec<Operation>,
    pub(crate) args: Vec<Arg>,
    pub(crate) constants: Vec<B>,
    pub(crate) slot_variable: Vec<bool>,
    pub(crate) independents: Vec<u32>,
    pub(crate) dynamics: Vec<u32>,
    pub(crate) dynamic_values: Vec<B>,
    pub(crate) dependents: Vec<Arg>,
    pub(crate) arenas: Vec<Arena>,
    pub(crate) discrete: Vec<Discrete<B>>,
    pub(crate) atomics: Vec<Arc<dyn AtomicFunction<B>>>,
    pub(crate) skip: Vec<SkipRule>,
}

impl<B: Base> OpSequence<B> {
    pub fn domain_size(&self) -> usize {
        self.independents.len()
    }

    pub fn range_size(&self) -> usize {
        self.dependents.len()
    }

    pub fn dynamic_size(&self) -> usize {
        self.dynamics.len()
    }

    /// Number of operations, including independent and dynamic leaves.
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slot_variable.len()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Arguments of `op`, which must belong to this sequence.
    pub fn args(&self, op: &Operation) -> &[Arg] {
        &self.args[op.arg_range()]
    }

    pub fn constants(&self) -> &[B] {
        &self.constants
    }

    pub fn independent_slots(&self) -> &[u32] {
        &self.independents
    }

    /// Dependent values: slots, or pooled constants for outputs that did not
    /// depend on anything recorded.
    pub fn dependents(&self) -> &[Arg] {
        &self.dependents
    }

    /// Dynamic parameter values seen while recording.
    pub fn recorded_dynamic(&self) -> &[B] {
        &self.dynamic_values
    }

    /// Number of conditional-skip rules attached by the optimizer.
    pub fn skip_rule_count(&self) -> usize {
        self.skip.len()
    }

    #[inline]
    pub(crate) fn is_variable(&self, arg: Arg) -> bool {
        match arg {
            Arg::Slot(s) => self.slot_variable[s as usize],
            _ => false,
        }
    }

    /// Coefficients of `arg` in a Taylor buffer with `cap` orders per slot.
    #[inline]
    pub(crate) fn series<'a>(&self, taylor: &'a [B], cap: usize, arg: Arg) -> Series<'a, B> {
        match arg {
            Arg::Const(c) => Series::Par(self.constants[c as usize]),
            Arg::Slot(s) => {
                let s = s as usize;
                if self.slot_variable[s] {
                    Series::Var(&taylor[s * cap..(s + 1) * cap])
                } else {
                    Series::Par(taylor[s * cap])
                }
            }
            Arg::Imm(v) => unreachable!("immediate {v} used as an operand"),
        }
    }

    /// A fresh sweep buffer for this sequence.
    pub fn new_cache(&self) -> TaylorCache<B> {
        TaylorCache::new(self)
    }

    /// Fails unless `cache` was sized for this sequence.
    pub(crate) fn check_cache(&self, cache: &TaylorCache<B>) -> Result<()> {
        if cache.slots != self.slot_count()
            || cache.skipped.len() != self.ops.len()
            || cache.dynamic.len() != self.dynamic_size()
        {
            return Err(AdError::CacheMismatch {
                slots: self.slot_count(),
                ops: self.ops.len(),
                got_slots: cache.slots,
                got_ops: cache.skipped.len(),
            });
        }
        Ok(())
    }
}

/// Per-evaluation sweep state: Taylor coefficients of every slot, adjoint
/// workspace, the current dynamic parameters, and what the last zero-order
/// sweep decided (indexed loads, conditional branches, skipped operations).
#[derive(Clone, Debug)]
pub struct TaylorCache<B> {
    pub(crate) slots: usize,
    pub(crate) cap: usize,
    pub(crate) orders: usize,
    pub(crate) taylor: Vec<B>,
    pub(crate) partial: Vec<B>,
    pub(crate) scratch: Vec<B>,
    pub(crate) dynamic: Vec<B>,
    pub(crate) arena_state: Vec<Vec<Arg>>,
    pub(crate) load_source: Vec<Arg>,
    pub(crate) branch: Vec<bool>,
    pub(crate) skipped: Vec<bool>,
    pub(crate) compare_changes: usize,
    pub(crate) first_compare_change: Option<usize>,
}

impl<B: Base> TaylorCache<B> {
    pub fn new(seq: &OpSequence<B>) -> Self {
        TaylorCache {
            slots: seq.slot_count(),
            cap: 0,
            orders: 0,
            taylor: Vec::new(),
            partial: Vec::new(),
            scratch: Vec::new(),
            dynamic: seq.dynamic_values.clone(),
            arena_state: Vec::new(),
            load_source: vec![Arg::Imm(0); seq.ops.len()],
            branch: vec![false; seq.ops.len()],
            skipped: vec![false; seq.ops.len()],
            compare_changes: 0,
            first_compare_change: None,
        }
    }

    /// Number of Taylor orders currently valid.
    pub fn orders(&self) -> usize {
        self.orders
    }

    /// Orders that fit without reallocating.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Make room for `orders` coefficients per slot, keeping what is cached.
    pub(crate) fn reserve(&mut self, slots: usize, orders: usize) {
        if self.cap >= orders && self.taylor.len() == slots * self.cap {
            return;
        }
        self.resize(slots, orders.max(self.cap));
    }

    pub(crate) fn resize(&mut self, slots: usize, cap: usize) {
        let keep = self.orders.min(cap).min(self.cap);
        let mut taylor = vec![B::zero(); slots * cap];
        if self.taylor.len() == slots * self.cap {
            for s in 0..slots {
                taylor[s * cap..s * cap + keep]
                    .copy_from_slice(&self.taylor[s * self.cap..s * self.cap + keep]);
            }
        }
        self.taylor = taylor;
        self.cap = cap;
        self.orders = keep;
    }
}

/// A recorded function together with its sweep state.
pub struct RecordedFunction<B: Base> {
    body: Arc<OpSequence<B>>,
    cache: TaylorCache<B>,
    check_for_nan: bool,
}

impl<B: Base> Clone for RecordedFunction<B> {
    /// Shares the operation sequence; the clone starts with an empty cache
    /// holding the same dynamic parameters.
    fn clone(&self) -> Self {
        RecordedFunction {
            body: Arc::clone(&self.body),
            cache: self.blank_cache(),
            check_for_nan: self.check_for_nan,
        }
    }
}

impl<B: Base> RecordedFunction<B> {
    pub(crate) fn new(seq: OpSequence<B>) -> Self {
        Self::from_sequence(Arc::new(seq))
    }

    /// Wrap a shared sequence with a fresh cache.
    pub fn from_sequence(body: Arc<OpSequence<B>>) -> Self {
        let cache = TaylorCache::new(&body);
        RecordedFunction {
            body,
            cache,
            check_for_nan: cfg!(debug_assertions),
        }
    }

    pub fn sequence(&self) -> &Arc<OpSequence<B>> {
        &self.body
    }

    pub fn domain_size(&self) -> usize {
        self.body.domain_size()
    }

    pub fn range_size(&self) -> usize {
        self.body.range_size()
    }

    pub fn dynamic_size(&self) -> usize {
        self.body.dynamic_size()
    }

    pub fn operation_count(&self) -> usize {
        self.body.operation_count()
    }

    pub fn slot_count(&self) -> usize {
        self.body.slot_count()
    }

    /// An empty cache carrying the current dynamic parameters.
    pub(crate) fn blank_cache(&self) -> TaylorCache<B> {
        let mut cache = TaylorCache::new(&self.body);
        cache.dynamic.clone_from(&self.cache.dynamic);
        cache
    }

    /// See [`OpSequence::forward_sparsity`].
    pub fn forward_sparsity(&self, r: &SparsityPattern) -> Result<SparsityPattern> {
        self.body.forward_sparsity(r)
    }

    /// See [`OpSequence::reverse_sparsity`].
    pub fn reverse_sparsity(&self, s: &SparsityPattern) -> Result<SparsityPattern> {
        self.body.reverse_sparsity(s)
    }

    /// See [`OpSequence::hessian_sparsity`].
    pub fn hessian_sparsity(&self, select: &[bool]) -> Result<SparsityPattern> {
        self.body.hessian_sparsity(select)
    }

    /// Number of Taylor orders currently cached.
    pub fn orders_computed(&self) -> usize {
        self.cache.orders
    }

    /// Set the per-slot Taylor capacity to `orders`, dropping cached orders
    /// beyond it. `0` releases the buffer.
    pub fn capacity_order(&mut self, orders: usize) {
        if orders == 0 {
            self.cache.taylor = Vec::new();
            self.cache.partial = Vec::new();
            self.cache.cap = 0;
            self.cache.orders = 0;
        } else {
            self.cache.resize(self.body.slot_count(), orders);
        }
    }

    /// Turn the non-finite check on or off. On by default in debug builds.
    ///
    /// When on, `forward(0, ..)` fails if a dependent value is NaN or
    /// infinite, and `reverse` fails if a returned adjoint is.
    pub fn check_for_nan(&mut self, enabled: bool) {
        self.check_for_nan = enabled;
    }

    pub fn checks_for_nan(&self) -> bool {
        self.check_for_nan
    }

    /// Replace the dynamic parameters. Cached Taylor orders are discarded.
    pub fn new_dynamic(&mut self, p: &[B]) -> Result<()> {
        if p.len() != self.body.dynamic_size() {
            return Err(AdError::DynamicMismatch {
                expected: self.body.dynamic_size(),
                got: p.len(),
            });
        }
        self.cache.dynamic.clear();
        self.cache.dynamic.extend_from_slice(p);
        self.cache.orders = 0;
        Ok(())
    }

    /// Order-`order` Taylor coefficients of the dependents given those of
    /// the independents.
    ///
    /// Orders must be computed in sequence: `order` may be at most the number
    /// of orders already cached. Recomputing a lower order discards the
    /// orders above it.
    pub fn forward(&mut self, order: usize, xk: &[B]) -> Result<Vec<B>> {
        let y = self.body.forward_with(&mut self.cache, order, xk)?;
        if order == 0 && self.check_for_nan {
            if let Some(index) = y.iter().position(|v| !v.is_finite()) {
                return Err(AdError::NonFinite {
                    sweep: "forward",
                    index,
                });
            }
        }
        Ok(y)
    }

    /// Adjoints of a weighted sum of dependent Taylor coefficients.
    ///
    /// `q` orders (`0..q`) are differentiated; forward must have been run
    /// through order `q - 1`. `w` holds either one weight per dependent (for
    /// order `q - 1`) or `range_size * q` weights laid out as `w[i * q + k]`.
    /// The result has `domain_size * q` entries; entry `j * q + k` is the
    /// partial with respect to order `k` of independent `j`.
    ///
    /// `reverse(1, w)` after `forward(0, x)` is the gradient of `w · f(x)`.
    pub fn reverse(&mut self, q: usize, w: &[B]) -> Result<Vec<B>> {
        let dw = self.body.reverse_with(&mut self.cache, q, w)?;
        if self.check_for_nan {
            if let Some(index) = dw.iter().position(|v| !v.is_finite()) {
                return Err(AdError::NonFinite {
                    sweep: "reverse",
                    index,
                });
            }
        }
        Ok(dw)
    }

    /// Number of recorded comparisons whose outcome differed in the last
    /// zero-order forward sweep.
    pub fn compare_change_count(&self) -> usize {
        self.cache.compare_changes
    }

    /// Operation index of the first comparison that changed outcome.
    pub fn compare_change_op_index(&self) -> Option<usize> {
        self.cache.first_compare_change
    }

    /// Number of operations skipped by conditional-skip rules in the last
    /// zero-order forward sweep.
    pub fn skipped_operation_count(&self) -> usize {
        self.cache.skipped.iter().filter(|&&s| s).count()
    }

    /// A new recorded function computing the same values with fewer
    /// operations. See [`OptimizeOptions`](crate::OptimizeOptions).
    pub fn optimize(&self, options: &crate::optimize::OptimizeOptions) -> RecordedFunction<B> {
        let mut optimized = RecordedFunction::new(self.body.optimize(options));
        optimized.check_for_nan = self.check_for_nan;
        optimized.cache.dynamic = self.cache.dynamic.clone();
        optimized
    }
}

impl<B: Base> fmt::Debug for OpSequence<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpSequence")
            .field("domain", &self.domain_size())
            .field("range", &self.range_size())
            .field("dynamic", &self.dynamic_size())
            .field("operations", &self.ops.len())
            .field("slots", &self.slot_count())
            .field("constants", &self.constants.len())
            .field("skip_rules", &self.skip.len())
            .finish()
    }
}

impl<B: Base> fmt::Debug for RecordedFunction<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordedFunction")
            .field("body", &self.body)
            .field("orders", &self.cache.orders)
            .field("check_for_nan", &self.check_for_nan)
            .finish()
    }
}

/// One line per operation: `index: results = opcode(args)`.
impl<B: Base> fmt::Display for OpSequence<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            write!(f, "{i:>5}: ")?;
            if op.result != NO_RESULT {
                if op.result_count == 1 {
                    write!(f, "v{} = ", op.result)?;
                } else {
                    write!(f, "v{}..v{} = ", op.result, op.result + op.result_count - 1)?;
                }
            }
            write!(f, "{:?}(", op.op)?;
            for (k, arg) in self.args(op).iter().enumerate() {
                if k > 0 {
                    write!(f, ", ")?;
                }
                match *arg {
                    Arg::Slot(s) => write!(f, "v{s}")?,
                    Arg::Const(c) => write!(f, "{:?}", self.constants[c as usize])?,
                    Arg::Imm(v) => write!(f, "#{v}")?,
                }
            }
            writeln!(f, ")")?;
        }
        write!(f, "  out: ")?;
        for (k, dep) in self.dependents.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            match *dep {
                Arg::Slot(s) => write!(f, "v{s}")?,
                Arg::Const(c) => write!(f, "{:?}", self.constants[c as usize])?,
                Arg::Imm(v) => write!(f, "#{v}")?,
            }
        }
        writeln!(f)
    }
}

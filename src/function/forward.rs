use log::trace;

use crate::atomic::tag_error;
use crate::base::{Base, CompareOp};
use crate::error::{AdError, Result};
use crate::opcode::{Arg, OpCode, NO_RESULT};
use crate::taylor_ops as rules;

use super::{OpSequence, TaylorCache};

impl<B: Base> OpSequence<B> {
    /// Forward sweep of order `order` into an external cache.
    ///
    /// Same contract as [`RecordedFunction::forward`](super::RecordedFunction::forward)
    /// without the non-finite check. A cache may be reused across calls but
    /// must have been created for this sequence; a cache sized for another
    /// one is rejected with [`AdError::CacheMismatch`].
    pub fn forward_with(&self, cache: &mut TaylorCache<B>, order: usize, xk: &[B]) -> Result<Vec<B>> {
        self.check_cache(cache)?;
        if xk.len() != self.domain_size() {
            return Err(AdError::DomainMismatch {
                expected: self.domain_size(),
                got: xk.len(),
            });
        }
        if order > cache.orders {
            return Err(AdError::OrderOutOfSequence {
                requested: order,
                available: cache.orders,
            });
        }
        cache.reserve(self.slot_count(), order + 1);
        if order == 0 {
            self.forward_zero(cache, xk)?;
        } else {
            for i in 0..self.ops.len() {
                if self.ops[i].variable && !cache.skipped[i] {
                    self.forward_op(cache, i, order, xk)?;
                }
            }
        }
        cache.orders = order + 1;
        trace!(
            "forward order {order}: {} operation(s), {} skipped",
            self.ops.len(),
            cache.skipped.iter().filter(|&&s| s).count()
        );
        Ok(self.dependent_coefficients(cache, order))
    }

    /// Parameters first, then the skip decisions they imply, then every
    /// operation that depends on an independent variable.
    fn forward_zero(&self, cache: &mut TaylorCache<B>, xk: &[B]) -> Result<()> {
        cache.compare_changes = 0;
        cache.first_compare_change = None;
        cache.arena_state.clear();
        cache
            .arena_state
            .extend(self.arenas.iter().map(|a| a.elements.clone()));

        for i in 0..self.ops.len() {
            if !self.ops[i].variable {
                self.forward_op(cache, i, 0, xk)?;
            }
        }

        cache.skipped.iter_mut().for_each(|s| *s = false);
        for rule in &self.skip {
            let left = self.series(&cache.taylor, cache.cap, rule.left).at(0);
            let right = self.series(&cache.taylor, cache.cap, rule.right).at(0);
            let skip = match B::compare(rule.cmp, left, right) {
                Ok(true) => &rule.if_true,
                Ok(false) => &rule.if_false,
                Err(AdError::Unordered { .. }) => continue,
                Err(e) => return Err(e),
            };
            for &i in skip {
                cache.skipped[i as usize] = true;
            }
        }

        for i in 0..self.ops.len() {
            if self.ops[i].variable && !cache.skipped[i] {
                self.forward_op(cache, i, 0, xk)?;
            }
        }
        Ok(())
    }

    fn dependent_coefficients(&self, cache: &TaylorCache<B>, k: usize) -> Vec<B> {
        self.dependents
            .iter()
            .map(|&dep| self.series(&cache.taylor, cache.cap, dep).at(k))
            .collect()
    }

    /// Coefficient `k` of every result of operation `i`.
    fn forward_op(&self, cache: &mut TaylorCache<B>, i: usize, k: usize, xk: &[B]) -> Result<()> {
        let op = &self.ops[i];
        let args = &self.args[op.arg_range()];
        let cap = cache.cap;
        let TaylorCache {
            taylor,
            dynamic,
            arena_state,
            load_source,
            branch,
            compare_changes,
            first_compare_change,
            ..
        } = cache;

        let split = if op.result == NO_RESULT {
            taylor.len()
        } else {
            op.result as usize * cap
        };
        let (below, above) = taylor.split_at_mut(split);
        let below: &[B] = below;
        let x = |a: usize| self.series(below, cap, args[a]);

        match op.op {
            OpCode::Independent => above[k] = xk[args[0].imm() as usize],
            OpCode::Dynamic => {
                if k == 0 {
                    above[0] = dynamic[args[0].imm() as usize];
                }
            }

            OpCode::Add => rules::add(k, x(0), x(1), &mut above[..cap]),
            OpCode::Sub => rules::sub(k, x(0), x(1), &mut above[..cap]),
            OpCode::Mul => rules::mul(k, x(0), x(1), &mut above[..cap]),
            OpCode::Div => rules::div(k, x(0), x(1), &mut above[..cap]),
            OpCode::Azmul => rules::azmul(k, x(0), x(1), &mut above[..cap]),
            OpCode::Pow => {
                let (z, rest) = above.split_at_mut(cap);
                let (l, rest) = rest.split_at_mut(cap);
                rules::pow(k, x(0), x(1), z, l, &mut rest[..cap]);
            }

            OpCode::Neg => rules::neg(k, x(0), &mut above[..cap]),
            OpCode::Abs => rules::abs(k, x(0), &mut above[..cap]),
            OpCode::Sign => rules::sign(k, x(0), &mut above[..cap]),
            OpCode::Sqrt => rules::sqrt(k, x(0), &mut above[..cap]),
            OpCode::Exp => rules::exp(k, x(0), &mut above[..cap], false),
            OpCode::ExpM1 => rules::exp(k, x(0), &mut above[..cap], true),
            OpCode::Ln => rules::ln(k, x(0), &mut above[..cap], false),
            OpCode::Ln1p => rules::ln(k, x(0), &mut above[..cap], true),

            OpCode::Sin | OpCode::Cos | OpCode::Sinh | OpCode::Cosh => {
                let (z, rest) = above.split_at_mut(cap);
                let aux = &mut rest[..cap];
                let hyperbolic = matches!(op.op, OpCode::Sinh | OpCode::Cosh);
                if matches!(op.op, OpCode::Sin | OpCode::Sinh) {
                    rules::sin_cos(k, x(0), z, aux, hyperbolic);
                } else {
                    rules::sin_cos(k, x(0), aux, z, hyperbolic);
                }
            }
            OpCode::Tan | OpCode::Tanh => {
                let (z, rest) = above.split_at_mut(cap);
                rules::tan(k, x(0), z, &mut rest[..cap], op.op == OpCode::Tanh);
            }
            OpCode::Asin | OpCode::Acos => {
                let (z, rest) = above.split_at_mut(cap);
                rules::asin(k, x(0), z, &mut rest[..cap], op.op == OpCode::Acos);
            }
            OpCode::Atan => {
                let (z, rest) = above.split_at_mut(cap);
                rules::atan(k, x(0), z, &mut rest[..cap]);
            }

            OpCode::CondExp => {
                let cmp = compare_op(i, args[0])?;
                if k == 0 {
                    let (l, r) = (x(1).at(0), x(2).at(0));
                    let holds = B::compare(cmp, l, r)?;
                    branch[i] = holds;
                    above[0] = B::cond_exp(cmp, l, r, x(3).at(0), x(4).at(0))?;
                } else {
                    above[k] = if branch[i] { x(3).at(k) } else { x(4).at(k) };
                }
            }
            OpCode::Compare => {
                if k == 0 {
                    let cmp = compare_op(i, args[0])?;
                    let recorded = args[1].imm() != 0;
                    let now = B::compare(cmp, x(2).at(0), x(3).at(0))?;
                    if now != recorded {
                        *compare_changes += 1;
                        first_compare_change.get_or_insert(i);
                    }
                }
            }
            OpCode::CumSum => {
                let terms = args
                    .chunks_exact(2)
                    .map(|pair| (pair[0].imm() != 0, self.series(below, cap, pair[1])));
                rules::cumsum(k, terms, &mut above[..cap]);
            }

            OpCode::Load => {
                if k == 0 {
                    let state = &arena_state[args[0].imm() as usize];
                    let index = x(1).at(0).to_index();
                    let source = index
                        .and_then(|j| state.get(j).copied())
                        .ok_or(AdError::IndexOutOfRange {
                            index: index.unwrap_or(usize::MAX),
                            len: state.len(),
                        })?;
                    load_source[i] = source;
                }
                above[k] = self.series(below, cap, load_source[i]).at(k);
            }
            OpCode::Store => {
                if k == 0 {
                    let state = &mut arena_state[args[0].imm() as usize];
                    let len = state.len();
                    let index = x(1).at(0).to_index();
                    let slot = index
                        .and_then(|j| state.get_mut(j))
                        .ok_or(AdError::IndexOutOfRange {
                            index: index.unwrap_or(usize::MAX),
                            len,
                        })?;
                    *slot = args[2];
                }
            }

            OpCode::Discrete => {
                above[k] = if k == 0 {
                    self.discrete[args[0].imm() as usize].eval(x(1).at(0))
                } else {
                    B::zero()
                };
            }
            OpCode::Call => {
                let atomic = &self.atomics[args[0].imm() as usize];
                let inputs = &args[1..];
                let m = op.result_count as usize;
                let q = k + 1;
                let mut tx = vec![B::zero(); inputs.len() * q];
                for (j, &arg) in inputs.iter().enumerate() {
                    let s = self.series(below, cap, arg);
                    for order in 0..q {
                        tx[j * q + order] = s.at(order);
                    }
                }
                let mut ty = vec![B::zero(); m * q];
                for r in 0..m {
                    ty[r * q..r * q + k].copy_from_slice(&above[r * cap..r * cap + k]);
                }
                atomic
                    .forward(k, &tx, &mut ty)
                    .map_err(|e| tag_error(atomic.name(), e))?;
                for r in 0..m {
                    above[r * cap + k] = ty[r * q + k];
                }
            }
        }
        Ok(())
    }
}

pub(super) fn compare_op(op_index: usize, code: Arg) -> Result<CompareOp> {
    CompareOp::from_code(code.imm())
        .ok_or_else(|| AdError::internal(op_index, format!("bad comparison code {code:?}")))
}

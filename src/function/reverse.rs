use log::trace;

use crate::atomic::tag_error;
use crate::base::Base;
use crate::error::{AdError, Result};
use crate::opcode::{Arg, OpCode, NO_RESULT};
use crate::taylor_ops as rules;

use super::{OpSequence, TaylorCache};

impl<B: Base> OpSequence<B> {
    /// Reverse sweep over `q` orders using an external cache.
    ///
    /// Same contract as [`RecordedFunction::reverse`](super::RecordedFunction::reverse)
    /// without the non-finite check.
    pub fn reverse_with(&self, cache: &mut TaylorCache<B>, q: usize, w: &[B]) -> Result<Vec<B>> {
        self.check_cache(cache)?;
        let (n, m) = (self.domain_size(), self.range_size());
        if q == 0 || q > cache.orders {
            return Err(AdError::ReverseOrder {
                requested: q,
                needed: q.saturating_sub(1),
                available: cache.orders,
            });
        }
        if w.len() != m && w.len() != m * q {
            return Err(AdError::WeightMismatch {
                got: w.len(),
                range: m,
                full: m * q,
            });
        }

        cache.partial.clear();
        cache.partial.resize(self.slot_count() * q, B::zero());
        for (i, &dep) in self.dependents.iter().enumerate() {
            let Arg::Slot(s) = dep else { continue };
            if !self.slot_variable[s as usize] {
                continue;
            }
            let p = &mut cache.partial[s as usize * q..(s as usize + 1) * q];
            if w.len() == m * q {
                for (k, pk) in p.iter_mut().enumerate() {
                    *pk = *pk + w[i * q + k];
                }
            } else {
                p[q - 1] = p[q - 1] + w[i];
            }
        }

        for i in (0..self.ops.len()).rev() {
            let op = &self.ops[i];
            if op.variable && !cache.skipped[i] && op.result != NO_RESULT {
                self.reverse_op(cache, i, q)?;
            }
        }
        trace!("reverse over {q} order(s): {} operation(s)", self.ops.len());

        let mut dw = vec![B::zero(); n * q];
        for (j, &s) in self.independents.iter().enumerate() {
            let s = s as usize;
            dw[j * q..(j + 1) * q].copy_from_slice(&cache.partial[s * q..(s + 1) * q]);
        }
        Ok(dw)
    }

    /// Propagate the adjoints of operation `i`'s results into its operands.
    ///
    /// Operand increments are formed in scratch space and added afterwards,
    /// so an operation may use the same slot twice (`x * x`).
    fn reverse_op(&self, cache: &mut TaylorCache<B>, i: usize, q: usize) -> Result<()> {
        let op = &self.ops[i];
        let args = &self.args[op.arg_range()];
        let cap = cache.cap;
        let d = q - 1;
        let TaylorCache {
            taylor,
            partial,
            scratch,
            load_source,
            branch,
            ..
        } = cache;
        let taylor: &[B] = taylor;

        let r = op.result as usize;
        let (below, above) = partial.split_at_mut(r * q);
        let x = |a: usize| self.series(taylor, cap, args[a]);
        let res = move |offset: usize| -> &[B] {
            let start = (r + offset) * cap;
            &taylor[start..start + q]
        };

        let operands = match op.op {
            OpCode::Call => args.len() - 1,
            OpCode::CumSum => 0,
            _ => 2,
        };
        scratch.clear();
        scratch.resize(operands.max(2) * q, B::zero());
        let (px, py) = scratch.split_at_mut(q);
        let py = &mut py[..q];

        match op.op {
            OpCode::Independent
            | OpCode::Dynamic
            | OpCode::Sign
            | OpCode::Discrete
            | OpCode::Compare
            | OpCode::Store => return Ok(()),

            OpCode::Add => rules::reverse_add(d, &above[..q], px, py),
            OpCode::Sub => rules::reverse_sub(d, &above[..q], px, py),
            OpCode::Mul => rules::reverse_mul(d, x(0), x(1), &above[..q], px, py),
            OpCode::Azmul => rules::reverse_azmul(d, x(0), x(1), &above[..q], px, py),
            OpCode::Div => rules::reverse_div(d, x(1), res(0), &mut above[..q], px, py),
            OpCode::Pow => {
                let (pz, rest) = above.split_at_mut(q);
                let (pl, rest) = rest.split_at_mut(q);
                rules::reverse_pow(
                    d,
                    x(0),
                    x(1),
                    res(0),
                    res(1),
                    res(2),
                    pz,
                    pl,
                    &mut rest[..q],
                    px,
                    py,
                );
            }

            OpCode::Neg => rules::reverse_neg(d, &above[..q], px),
            OpCode::Abs => rules::reverse_abs(d, x(0), &above[..q], px),
            OpCode::Sqrt => rules::reverse_sqrt(d, res(0), &mut above[..q], px),
            OpCode::Exp => rules::reverse_exp(d, x(0), res(0), &mut above[..q], px, false),
            OpCode::ExpM1 => rules::reverse_exp(d, x(0), res(0), &mut above[..q], px, true),
            OpCode::Ln => {
                let b0 = x(0).at(0);
                rules::reverse_log(d, x(0), b0, res(0), &mut above[..q], px);
            }
            OpCode::Ln1p => {
                let b0 = B::one() + x(0).at(0);
                rules::reverse_log(d, x(0), b0, res(0), &mut above[..q], px);
            }

            OpCode::Sin | OpCode::Cos | OpCode::Sinh | OpCode::Cosh => {
                let (pz, rest) = above.split_at_mut(q);
                let pa = &mut rest[..q];
                let hyperbolic = matches!(op.op, OpCode::Sinh | OpCode::Cosh);
                if matches!(op.op, OpCode::Sin | OpCode::Sinh) {
                    rules::reverse_sin_cos(d, x(0), res(0), res(1), pz, pa, px, hyperbolic);
                } else {
                    rules::reverse_sin_cos(d, x(0), res(1), res(0), pa, pz, px, hyperbolic);
                }
            }
            OpCode::Tan | OpCode::Tanh => {
                let (pz, rest) = above.split_at_mut(q);
                let hyperbolic = op.op == OpCode::Tanh;
                rules::reverse_tan(d, x(0), res(0), res(1), pz, &mut rest[..q], px, hyperbolic);
            }
            OpCode::Asin | OpCode::Acos => {
                let (pz, rest) = above.split_at_mut(q);
                let acos = op.op == OpCode::Acos;
                rules::reverse_asin(d, x(0), res(0), res(1), pz, &mut rest[..q], px, acos);
            }
            OpCode::Atan => {
                let (pz, rest) = above.split_at_mut(q);
                rules::reverse_atan(d, x(0), res(0), res(1), pz, &mut rest[..q], px);
            }

            OpCode::CondExp => {
                let chosen = if branch[i] { args[3] } else { args[4] };
                self.accumulate(below, q, chosen, &above[..q]);
                return Ok(());
            }
            OpCode::CumSum => {
                let pz = &above[..q];
                for pair in args.chunks_exact(2) {
                    if pair[0].imm() == 0 {
                        self.accumulate(below, q, pair[1], pz);
                    } else {
                        for (t, &p) in px.iter_mut().zip(pz) {
                            *t = -p;
                        }
                        self.accumulate(below, q, pair[1], px);
                    }
                }
                return Ok(());
            }
            OpCode::Load => {
                self.accumulate(below, q, load_source[i], &above[..q]);
                return Ok(());
            }
            OpCode::Call => {
                let atomic = &self.atomics[args[0].imm() as usize];
                let inputs = &args[1..];
                let m = op.result_count as usize;
                let mut tx = vec![B::zero(); inputs.len() * q];
                for (j, &arg) in inputs.iter().enumerate() {
                    let s = self.series(taylor, cap, arg);
                    for k in 0..q {
                        tx[j * q + k] = s.at(k);
                    }
                }
                let mut ty = vec![B::zero(); m * q];
                for out in 0..m {
                    ty[out * q..(out + 1) * q].copy_from_slice(res(out));
                }
                scratch.clear();
                scratch.resize(inputs.len() * q, B::zero());
                atomic
                    .reverse(d, &tx, &ty, &above[..m * q], scratch)
                    .map_err(|e| tag_error(atomic.name(), e))?;
                for (j, &arg) in inputs.iter().enumerate() {
                    self.accumulate(below, q, arg, &scratch[j * q..(j + 1) * q]);
                }
                return Ok(());
            }
        }

        self.accumulate(below, q, args[0], px);
        if args.len() > 1 {
            self.accumulate(below, q, args[1], py);
        }
        Ok(())
    }

    /// Add `increment` to the adjoints of `arg` if it is a variable slot.
    #[inline]
    fn accumulate(&self, partial: &mut [B], q: usize, arg: Arg, increment: &[B]) {
        if let Arg::Slot(s) = arg {
            if self.slot_variable[s as usize] {
                let target = &mut partial[s as usize * q..(s as usize + 1) * q];
                for (t, &v) in target.iter_mut().zip(increment) {
                    *t = *t + v;
                }
            }
        }
    }
}

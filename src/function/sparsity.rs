use log::trace;

use crate::base::Base;
use crate::error::{AdError, Result};
use crate::opcode::{Arg, OpClass, OpCode};
use crate::sparse::{iter_bits, SlotSets, SparsityPattern};

use super::OpSequence;

impl<B: Base> OpSequence<B> {
    /// Jacobian sparsity times `r`.
    ///
    /// `r` is `n × q` (one row per independent). The result is `m × q`:
    /// entry `(i, c)` is set if dependent `i` may depend on an independent
    /// whose row in `r` has column `c` set. With `r` the identity this is the
    /// Jacobian pattern itself.
    pub fn forward_sparsity(&self, r: &SparsityPattern) -> Result<SparsityPattern> {
        if r.rows() != self.domain_size() {
            return Err(AdError::PatternMismatch {
                rows: r.rows(),
                cols: r.cols(),
                expected_rows: self.domain_size(),
            });
        }
        let sets = self.jacobian_sets(r);
        let mut out = SparsityPattern::new(self.range_size(), r.cols());
        for (i, &dep) in self.dependents.iter().enumerate() {
            if let Arg::Slot(s) = dep {
                out.union_row(i, sets.get(s as usize));
            }
        }
        trace!("forward sparsity: {} entries", out.nnz());
        Ok(out)
    }

    /// `s` times the Jacobian sparsity.
    ///
    /// `s` is `m × q` with one row per dependent; the result is `n × q`
    /// with one row per independent.
    pub fn reverse_sparsity(&self, s: &SparsityPattern) -> Result<SparsityPattern> {
        if s.rows() != self.range_size() {
            return Err(AdError::PatternMismatch {
                rows: s.rows(),
                cols: s.cols(),
                expected_rows: self.range_size(),
            });
        }
        let q = s.cols();
        let mut sets = SlotSets::new(self.slot_count(), q);
        let mut arenas = SlotSets::new(self.arenas.len(), q);
        for (i, &dep) in self.dependents.iter().enumerate() {
            if let Arg::Slot(slot) = dep {
                if self.slot_variable[slot as usize] {
                    sets.union_words(slot as usize, s.row_words(i));
                }
            }
        }

        let mut acc = vec![0u64; sets.words()];
        self.release_arenas(self.ops.len(), &mut sets, &arenas);
        for i in (0..self.ops.len()).rev() {
            let op = &self.ops[i];
            let args = &self.args[op.arg_range()];
            if op.variable {
                acc.iter_mut().for_each(|w| *w = 0);
                for r in op.result_range() {
                    for (a, &v) in acc.iter_mut().zip(sets.get(r)) {
                        *a |= v;
                    }
                }
                match op.op {
                    OpCode::Independent
                    | OpCode::Dynamic
                    | OpCode::Sign
                    | OpCode::Discrete
                    | OpCode::Compare => {}
                    OpCode::CondExp => {
                        self.union_arg(&mut sets, args[3], &acc);
                        self.union_arg(&mut sets, args[4], &acc);
                    }
                    OpCode::Load => arenas.union_words(args[0].imm() as usize, &acc),
                    OpCode::Store => {
                        let a = arenas.get(args[0].imm() as usize).to_vec();
                        self.union_arg(&mut sets, args[2], &a);
                    }
                    OpCode::Call => {
                        let atomic = &self.atomics[args[0].imm() as usize];
                        for (out, input) in atomic.dependency() {
                            if let Arg::Slot(src) = args[1 + input] {
                                if self.slot_variable[src as usize] {
                                    sets.union_from(src as usize, op.result as usize + out);
                                }
                            }
                        }
                    }
                    _ => {
                        for &arg in args {
                            self.union_arg(&mut sets, arg, &acc);
                        }
                    }
                }
            }
            self.release_arenas(i, &mut sets, &arenas);
        }

        let mut out = SparsityPattern::new(self.domain_size(), q);
        for (j, &slot) in self.independents.iter().enumerate() {
            out.union_row(j, sets.get(slot as usize));
        }
        trace!("reverse sparsity: {} entries", out.nnz());
        Ok(out)
    }

    /// Sparsity of the Hessian of `Σ select[i] · f_i`, as an `n × n`
    /// symmetric pattern.
    pub fn hessian_sparsity(&self, select: &[bool]) -> Result<SparsityPattern> {
        let (n, m) = (self.domain_size(), self.range_size());
        if select.len() != m {
            return Err(AdError::RangeMismatch {
                expected: m,
                got: select.len(),
            });
        }
        let jac = self.jacobian_sets(&SparsityPattern::identity(n));

        let mut live = vec![false; self.slot_count()];
        let mut arena_live = vec![false; self.arenas.len()];
        for (i, &dep) in self.dependents.iter().enumerate() {
            if let Arg::Slot(s) = dep {
                live[s as usize] |= select[i];
            }
        }

        let mut hess = SparsityPattern::new(n, n);
        let mark = |live: &mut Vec<bool>, arg: Arg| {
            if let Arg::Slot(s) = arg {
                live[s as usize] = true;
            }
        };

        for i in (0..self.ops.len()).rev() {
            let op = &self.ops[i];
            let args = &self.args[op.arg_range()];
            if op.variable {
                let result_live = op.result_range().any(|r| live[r]);
                match op.op {
                    OpCode::Store => {
                        if arena_live[args[0].imm() as usize] {
                            mark(&mut live, args[2]);
                        }
                    }
                    OpCode::Load => {
                        if result_live {
                            arena_live[args[0].imm() as usize] = true;
                        }
                    }
                    OpCode::CondExp => {
                        if result_live {
                            mark(&mut live, args[3]);
                            mark(&mut live, args[4]);
                        }
                    }
                    OpCode::Call => {
                        if result_live {
                            let mut all = vec![0u64; jac.words()];
                            for &arg in &args[1..] {
                                mark(&mut live, arg);
                                union_into(&mut all, self.arg_set(&jac, arg));
                            }
                            mark_pairs(&mut hess, &all, &all);
                        }
                    }
                    code if result_live => {
                        let x = self.arg_set(&jac, args[0]).to_vec();
                        let y = args.get(1).map(|&a| self.arg_set(&jac, a).to_vec());
                        let class = code.class();
                        match class {
                            OpClass::ZeroDerivative | OpClass::Linear => {}
                            OpClass::UnaryNonlinear => mark_pairs(&mut hess, &x, &x),
                            OpClass::Bilinear => {
                                if let Some(y) = &y {
                                    mark_pairs(&mut hess, &x, y);
                                }
                            }
                            OpClass::Quotient => {
                                if let Some(y) = &y {
                                    mark_pairs(&mut hess, &x, y);
                                    mark_pairs(&mut hess, y, y);
                                }
                            }
                            OpClass::Dense => {
                                let mut all = x.clone();
                                if let Some(y) = &y {
                                    union_into(&mut all, y);
                                }
                                mark_pairs(&mut hess, &all, &all);
                            }
                        }
                        if class != OpClass::ZeroDerivative {
                            for &arg in args {
                                mark(&mut live, arg);
                            }
                        }
                    }
                    _ => {}
                }
            }
            for arena in self.arenas_at(i) {
                if arena_live[arena] {
                    for &e in &self.arenas[arena].elements {
                        mark(&mut live, e);
                    }
                }
            }
        }
        trace!("hessian sparsity: {} entries", hess.nnz());
        Ok(hess)
    }

    /// Dependency sets of every slot on the rows of `r`.
    fn jacobian_sets(&self, r: &SparsityPattern) -> SlotSets {
        let mut sets = SlotSets::new(self.slot_count(), r.cols());
        let mut arenas = SlotSets::new(self.arenas.len(), r.cols());
        for (i, op) in self.ops.iter().enumerate() {
            for arena in self.arenas_at(i) {
                for &e in &self.arenas[arena].elements {
                    if let Arg::Slot(s) = e {
                        let words = sets.get(s as usize).to_vec();
                        arenas.union_words(arena, &words);
                    }
                }
            }
            if !op.variable {
                continue;
            }
            let args = &self.args[op.arg_range()];
            let z = op.result as usize;
            match op.op {
                OpCode::Independent => sets.union_words(z, r.row_words(args[0].imm() as usize)),
                OpCode::Dynamic | OpCode::Sign | OpCode::Discrete | OpCode::Compare => {}
                OpCode::CondExp => {
                    self.gather(&mut sets, z, args[3]);
                    self.gather(&mut sets, z, args[4]);
                }
                OpCode::Load => {
                    let words = arenas.get(args[0].imm() as usize).to_vec();
                    sets.union_words(z, &words);
                }
                OpCode::Store => {
                    if let Arg::Slot(s) = args[2] {
                        let words = sets.get(s as usize).to_vec();
                        arenas.union_words(args[0].imm() as usize, &words);
                    }
                }
                OpCode::Call => {
                    let atomic = &self.atomics[args[0].imm() as usize];
                    for (out, input) in atomic.dependency() {
                        self.gather(&mut sets, z + out, args[1 + input]);
                    }
                }
                _ => {
                    for &arg in args {
                        for res in op.result_range() {
                            self.gather(&mut sets, res, arg);
                        }
                    }
                }
            }
        }
        sets
    }

    /// Indices of arenas registered just before operation `position`.
    fn arenas_at(&self, position: usize) -> impl Iterator<Item = usize> + '_ {
        self.arenas
            .iter()
            .enumerate()
            .filter(move |(_, a)| a.position as usize == position)
            .map(|(i, _)| i)
    }

    /// Reverse mode: hand each arena's accumulated set to its initial
    /// elements once the sweep passes the point where it was registered.
    fn release_arenas(&self, position: usize, sets: &mut SlotSets, arenas: &SlotSets) {
        for arena in self.arenas_at(position) {
            for &e in &self.arenas[arena].elements {
                self.union_arg(sets, e, arenas.get(arena));
            }
        }
    }

    #[inline]
    fn gather(&self, sets: &mut SlotSets, dst: usize, arg: Arg) {
        if let Arg::Slot(s) = arg {
            if self.slot_variable[s as usize] {
                sets.union_from(dst, s as usize);
            }
        }
    }

    #[inline]
    fn union_arg(&self, sets: &mut SlotSets, arg: Arg, words: &[u64]) {
        if let Arg::Slot(s) = arg {
            if self.slot_variable[s as usize] {
                sets.union_words(s as usize, words);
            }
        }
    }

    fn arg_set<'a>(&self, sets: &'a SlotSets, arg: Arg) -> &'a [u64] {
        match arg {
            Arg::Slot(s) => sets.get(s as usize),
            _ => &[],
        }
    }
}

fn union_into(dst: &mut Vec<u64>, src: &[u64]) {
    if dst.len() < src.len() {
        dst.resize(src.len(), 0);
    }
    for (d, &s) in dst.iter_mut().zip(src) {
        *d |= s;
    }
}

/// Mark `(i, j)` and `(j, i)` for every `i` in `a` and `j` in `b`.
fn mark_pairs(hess: &mut SparsityPattern, a: &[u64], b: &[u64]) {
    for i in iter_bits(a) {
        for j in iter_bits(b) {
            hess.insert(i, j);
            hess.insert(j, i);
        }
    }
}

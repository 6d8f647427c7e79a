//! Sparse Jacobians and Hessians by compressed sweeps.
//!
//! Given a sparsity pattern, structurally orthogonal columns (or rows) are
//! grouped by [`column_coloring`] (or [`row_coloring`]) and each group is
//! seeded in a single sweep. The values come back in the order of
//! [`SparsityPattern::entries`].

use log::debug;

use crate::base::Base;
use crate::error::{AdError, Result};
use crate::sparse::{column_coloring, row_coloring, SparsityPattern};

use super::RecordedFunction;

impl<B: Base> RecordedFunction<B> {
    /// Jacobian entries at `x` for every entry of `pattern` (`m × n`).
    ///
    /// Uses forward sweeps over column colors or reverse sweeps over row
    /// colors, whichever needs fewer. `pattern` must cover the Jacobian,
    /// e.g. `forward_sparsity(&SparsityPattern::identity(n))`; entries
    /// outside it are assumed zero.
    ///
    /// ```
    /// use tapir::{record, SparsityPattern};
    ///
    /// let mut f = record(|x| vec![x[0] * 2.0, x[1] * x[2]], &[1.0, 2.0, 3.0]).unwrap();
    /// let pattern = f.forward_sparsity(&SparsityPattern::identity(3)).unwrap();
    /// let values = f.sparse_jacobian(&[1.0, 2.0, 3.0], &pattern).unwrap();
    /// assert_eq!(pattern.entries(), vec![(0, 0), (1, 1), (1, 2)]);
    /// assert_eq!(values, vec![2.0, 3.0, 2.0]);
    /// ```
    pub fn sparse_jacobian(&mut self, x: &[B], pattern: &SparsityPattern) -> Result<Vec<B>> {
        self.check_shape(pattern, self.range_size(), self.domain_size())?;
        let (col_colors, num_col) = column_coloring(pattern);
        let (row_colors, num_row) = row_coloring(pattern);
        if num_col <= num_row {
            self.jacobian_by_columns(x, pattern, &col_colors, num_col)
        } else {
            self.jacobian_by_rows(x, pattern, &row_colors, num_row)
        }
    }

    /// [`sparse_jacobian`](Self::sparse_jacobian) with first-order forward
    /// sweeps, one per column color.
    pub fn sparse_jacobian_forward(&mut self, x: &[B], pattern: &SparsityPattern) -> Result<Vec<B>> {
        self.check_shape(pattern, self.range_size(), self.domain_size())?;
        let (colors, num_colors) = column_coloring(pattern);
        self.jacobian_by_columns(x, pattern, &colors, num_colors)
    }

    /// [`sparse_jacobian`](Self::sparse_jacobian) with first-order reverse
    /// sweeps, one per row color.
    pub fn sparse_jacobian_reverse(&mut self, x: &[B], pattern: &SparsityPattern) -> Result<Vec<B>> {
        self.check_shape(pattern, self.range_size(), self.domain_size())?;
        let (colors, num_colors) = row_coloring(pattern);
        self.jacobian_by_rows(x, pattern, &colors, num_colors)
    }

    /// Entries of the Hessian of `Σ w[i] · f_i` at `x` for every entry of
    /// `pattern` (`n × n`), e.g. one from
    /// [`hessian_sparsity`](Self::hessian_sparsity).
    ///
    /// Each column color costs one first-order forward sweep and one
    /// two-order reverse sweep.
    pub fn sparse_hessian(&mut self, x: &[B], w: &[B], pattern: &SparsityPattern) -> Result<Vec<B>> {
        let (n, m) = (self.domain_size(), self.range_size());
        if w.len() != m {
            return Err(AdError::RangeMismatch {
                expected: m,
                got: w.len(),
            });
        }
        self.check_shape(pattern, n, n)?;
        let (colors, num_colors) = column_coloring(pattern);
        debug!("sparse hessian: {} entries, {num_colors} color(s)", pattern.nnz());

        let entries = pattern.entries();
        let mut values = vec![B::zero(); entries.len()];
        self.forward(0, x)?;
        let mut dir = vec![B::zero(); n];
        for color in 0..num_colors {
            for (d, &c) in dir.iter_mut().zip(&colors) {
                *d = if c == color { B::one() } else { B::zero() };
            }
            self.forward(1, &dir)?;
            let dw = self.reverse(2, w)?;
            for (v, &(r, c)) in values.iter_mut().zip(&entries) {
                if colors[c] == color {
                    *v = dw[r * 2];
                }
            }
        }
        Ok(values)
    }

    fn check_shape(&self, pattern: &SparsityPattern, rows: usize, cols: usize) -> Result<()> {
        if pattern.rows() != rows || pattern.cols() != cols {
            return Err(AdError::PatternShape {
                rows: pattern.rows(),
                cols: pattern.cols(),
                expected_rows: rows,
                expected_cols: cols,
            });
        }
        Ok(())
    }

    fn jacobian_by_columns(
        &mut self,
        x: &[B],
        pattern: &SparsityPattern,
        colors: &[u32],
        num_colors: u32,
    ) -> Result<Vec<B>> {
        debug!("sparse jacobian: {} entries, {num_colors} column color(s)", pattern.nnz());
        let entries = pattern.entries();
        let mut values = vec![B::zero(); entries.len()];
        self.forward(0, x)?;
        let mut dir = vec![B::zero(); self.domain_size()];
        for color in 0..num_colors {
            for (d, &c) in dir.iter_mut().zip(colors) {
                *d = if c == color { B::one() } else { B::zero() };
            }
            let dy = self.forward(1, &dir)?;
            for (v, &(r, c)) in values.iter_mut().zip(&entries) {
                if colors[c] == color {
                    *v = dy[r];
                }
            }
        }
        Ok(values)
    }

    fn jacobian_by_rows(
        &mut self,
        x: &[B],
        pattern: &SparsityPattern,
        colors: &[u32],
        num_colors: u32,
    ) -> Result<Vec<B>> {
        debug!("sparse jacobian: {} entries, {num_colors} row color(s)", pattern.nnz());
        let entries = pattern.entries();
        let mut values = vec![B::zero(); entries.len()];
        self.forward(0, x)?;
        let mut w = vec![B::zero(); self.range_size()];
        for color in 0..num_colors {
            for (wi, &c) in w.iter_mut().zip(colors) {
                *wi = if c == color { B::one() } else { B::zero() };
            }
            let dw = self.reverse(1, &w)?;
            for (v, &(r, c)) in values.iter_mut().zip(&entries) {
                if colors[r] == color {
                    *v = dw[c];
                }
            }
        }
        Ok(values)
    }
}

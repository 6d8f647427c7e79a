//! Boolean sparsity patterns.
//!
//! A [`SparsityPattern`] is a dense `rows × cols` bit matrix stored as packed
//! `u64` words per row. Sparsity sweeps keep one such row per slot.
//!
//! [`column_coloring`] and [`row_coloring`] group structurally orthogonal
//! columns (rows) so that a sparse Jacobian or Hessian can be recovered from
//! one compressed sweep per group.

use std::cmp::Reverse;
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row-major bit matrix.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SparsityPattern {
    rows: usize,
    cols: usize,
    words: usize,
    bits: Vec<u64>,
}

impl SparsityPattern {
    /// All-false pattern.
    pub fn new(rows: usize, cols: usize) -> Self {
        let words = cols.div_ceil(64);
        SparsityPattern {
            rows,
            cols,
            words,
            bits: vec![0; rows * words],
        }
    }

    /// `n × n` identity.
    pub fn identity(n: usize) -> Self {
        let mut p = Self::new(n, n);
        for i in 0..n {
            p.insert(i, i);
        }
        p
    }

    pub fn from_entries(rows: usize, cols: usize, entries: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut p = Self::new(rows, cols);
        for (r, c) in entries {
            p.insert(r, c);
        }
        p
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Set entry `(r, c)`.
    ///
    /// # Panics
    ///
    /// Panics if `r` or `c` is out of range.
    pub fn insert(&mut self, r: usize, c: usize) {
        assert!(r < self.rows && c < self.cols, "({r}, {c}) outside {}x{}", self.rows, self.cols);
        self.bits[r * self.words + c / 64] |= 1 << (c % 64);
    }

    pub fn contains(&self, r: usize, c: usize) -> bool {
        r < self.rows && c < self.cols && self.bits[r * self.words + c / 64] & (1 << (c % 64)) != 0
    }

    /// Column indices set in row `r`, ascending.
    pub fn row(&self, r: usize) -> impl Iterator<Item = usize> + '_ {
        iter_bits(self.row_words(r))
    }

    /// Number of entries set.
    pub fn nnz(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// All set entries in row-major order.
    pub fn entries(&self) -> Vec<(usize, usize)> {
        (0..self.rows)
            .flat_map(|r| self.row(r).map(move |c| (r, c)))
            .collect()
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::new(self.cols, self.rows);
        for (r, c) in self.entries() {
            t.insert(c, r);
        }
        t
    }

    pub(crate) fn row_words(&self, r: usize) -> &[u64] {
        &self.bits[r * self.words..(r + 1) * self.words]
    }

    pub(crate) fn union_row(&mut self, r: usize, words: &[u64]) {
        let row = &mut self.bits[r * self.words..(r + 1) * self.words];
        for (dst, &src) in row.iter_mut().zip(words) {
            *dst |= src;
        }
    }
}

impl std::fmt::Debug for SparsityPattern {
    /// One line per row, `x` for set entries.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SparsityPattern {}x{}", self.rows, self.cols)?;
        for r in 0..self.rows {
            for c in 0..self.cols {
                f.write_str(if self.contains(r, c) { "x" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════
//  Coloring
// ══════════════════════════════════════════════

/// Greedy coloring of the columns of `pattern` such that no two columns of
/// the same color have an entry in the same row.
///
/// Columns are visited by decreasing entry count; each takes the smallest
/// color not used by a column it shares a row with. Returns the color of
/// every column and the number of colors.
pub fn column_coloring(pattern: &SparsityPattern) -> (Vec<u32>, u32) {
    let by_col = pattern.transpose();
    let mut order: Vec<usize> = (0..pattern.cols()).collect();
    order.sort_by_key(|&c| Reverse(by_col.row(c).count()));

    let mut colors = vec![u32::MAX; pattern.cols()];
    let mut num_colors = 0u32;
    let mut used = HashSet::new();
    for &c in &order {
        used.clear();
        for r in by_col.row(c) {
            used.extend(pattern.row(r).map(|other| colors[other]).filter(|&k| k != u32::MAX));
        }
        let mut color = 0u32;
        while used.contains(&color) {
            color += 1;
        }
        colors[c] = color;
        num_colors = num_colors.max(color + 1);
    }
    (colors, num_colors)
}

/// Coloring of the rows of `pattern`: no two rows of the same color have an
/// entry in the same column.
pub fn row_coloring(pattern: &SparsityPattern) -> (Vec<u32>, u32) {
    column_coloring(&pattern.transpose())
}

pub(crate) fn iter_bits(words: &[u64]) -> impl Iterator<Item = usize> + '_ {
    words.iter().enumerate().flat_map(|(w, &word)| {
        let mut rest = word;
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let bit = rest.trailing_zeros() as usize;
            rest &= rest - 1;
            Some(w * 64 + bit)
        })
    })
}

/// One bit set per slot, all of the same width.
pub(crate) struct SlotSets {
    words: usize,
    bits: Vec<u64>,
}

impl SlotSets {
    pub(crate) fn new(count: usize, width: usize) -> Self {
        let words = width.div_ceil(64);
        SlotSets {
            words,
            bits: vec![0; count * words],
        }
    }

    #[inline]
    pub(crate) fn get(&self, i: usize) -> &[u64] {
        &self.bits[i * self.words..(i + 1) * self.words]
    }

    #[inline]
    pub(crate) fn union_words(&mut self, dst: usize, words: &[u64]) {
        let row = &mut self.bits[dst * self.words..(dst + 1) * self.words];
        for (d, &s) in row.iter_mut().zip(words) {
            *d |= s;
        }
    }

    /// `sets[dst] |= sets[src]`.
    #[inline]
    pub(crate) fn union_from(&mut self, dst: usize, src: usize) {
        if dst == src {
            return;
        }
        for w in 0..self.words {
            let v = self.bits[src * self.words + w];
            self.bits[dst * self.words + w] |= v;
        }
    }

    pub(crate) fn words(&self) -> usize {
        self.words
    }
}

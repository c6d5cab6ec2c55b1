//! Row-distributed sparse matrix operand.
//!
//! Each rank stores the rows it owns in compressed-sparse-row form with
//! global column indices. The matrix only serves as an operand of the
//! matrix-vector accumulations on [`Vector`](crate::vector::Vector).

use std::collections::BTreeMap;
use std::ops::Range;

use crate::scalar::Scalar;
use crate::vector_error::VectorError;

#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix<T> {
    rows: Range<usize>,
    n_cols: usize,
    row_ptr: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<T>,
}

impl<T: Scalar> CsrMatrix<T> {
    /// Build the local rows `rows` of a matrix with `n_cols` global columns.
    /// Repeated `(row, col)` pairs are summed.
    pub fn from_triplets(
        rows: Range<usize>,
        n_cols: usize,
        triplets: impl IntoIterator<Item = (usize, usize, T)>,
    ) -> Result<Self, VectorError> {
        let mut entries: BTreeMap<(usize, usize), T> = BTreeMap::new();
        for (r, c, v) in triplets {
            if !rows.contains(&r) {
                return Err(VectorError::LayoutMismatch(format!(
                    "row {r} outside local rows {rows:?}"
                )));
            }
            if c >= n_cols {
                return Err(VectorError::LayoutMismatch(format!(
                    "column {c} outside {n_cols} columns"
                )));
            }
            *entries.entry((r, c)).or_insert_with(T::zero) += v;
        }

        let n_rows = rows.len();
        let mut row_ptr = vec![0usize; n_rows + 1];
        let mut cols = Vec::with_capacity(entries.len());
        let mut vals = Vec::with_capacity(entries.len());
        for ((r, c), v) in entries {
            row_ptr[r - rows.start + 1] += 1;
            cols.push(c);
            vals.push(v);
        }
        for i in 0..n_rows {
            row_ptr[i + 1] += row_ptr[i];
        }
        Ok(Self {
            rows,
            n_cols,
            row_ptr,
            cols,
            vals,
        })
    }

    /// Global rows stored on this rank.
    pub fn local_rows(&self) -> Range<usize> {
        self.rows.clone()
    }
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }
    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    /// `(column, value)` pairs of local row `k`.
    pub fn row(&self, k: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let span = self.row_ptr[k]..self.row_ptr[k + 1];
        self.cols[span.clone()]
            .iter()
            .copied()
            .zip(self.vals[span].iter().copied())
    }

    /// `y += A x` for the local rows, with `x` given in full (all `n_cols` entries).
    pub(crate) fn mult_add(&self, x: &[T], y: &mut [T]) {
        for (k, yk) in y.iter_mut().enumerate().take(self.rows.len()) {
            *yk += self.row(k).fold(T::zero(), |acc, (c, a)| acc + a * x[c]);
        }
    }

    /// Contributions of the local rows to `Aᵀ x` (or `Aᴴ x` with `conjugate`),
    /// as `(column, value)` pairs; `x` holds the entries of the local rows.
    pub(crate) fn transpose_contributions(&self, x: &[T], conjugate: bool) -> Vec<(usize, T)> {
        let mut out = Vec::with_capacity(self.nnz());
        for (k, &xk) in x.iter().enumerate().take(self.rows.len()) {
            for (c, a) in self.row(k) {
                let a = if conjugate { a.conj() } else { a };
                out.push((c, a * xk));
            }
        }
        out
    }
}

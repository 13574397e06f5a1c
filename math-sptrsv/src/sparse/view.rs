//! Solve-oriented view of a triangular matrix
//!
//! The kernel needs two adjacency lists regardless of how the matrix is
//! stored: for each row, the off-diagonal coefficients it reads (to compute
//! its value), and for each column, the rows that read it (to signal them once
//! the value is written). One of the two is a filtered copy of the stored
//! layout, the other its transpose; both are built here in O(nnz).

use super::triangular::{DiagonalKind, TriangularMatrix};
use crate::traits::Scalar;

/// Borrowed matrix plus the dependency structure a solve walks
#[derive(Debug)]
pub struct TriangularView<'a, T: Scalar> {
    matrix: &'a TriangularMatrix<T>,
    /// Row i reads `dep_cols[dep_ptrs[i]..dep_ptrs[i + 1]]`
    dep_ptrs: Vec<usize>,
    dep_cols: Vec<usize>,
    dep_vals: Vec<T>,
    /// Column j is read by `dependent_rows[dependent_ptrs[j]..dependent_ptrs[j + 1]]`
    dependent_ptrs: Vec<usize>,
    dependent_rows: Vec<usize>,
    pivots: Vec<T>,
}

impl<'a, T: Scalar> TriangularView<'a, T> {
    /// Build the view for a validated matrix
    pub fn new(matrix: &'a TriangularMatrix<T>) -> Self {
        let n = matrix.n();
        let unit = matrix.diagonal_kind() == DiagonalKind::Unit;

        let mut pivots = vec![T::one(); n];
        let mut dep_ptrs = vec![0usize; n + 1];
        let mut dependent_ptrs = vec![0usize; n + 1];

        for (row, col, val) in matrix.entries() {
            if row == col {
                if !unit {
                    pivots[row] = val;
                }
            } else {
                dep_ptrs[row + 1] += 1;
                dependent_ptrs[col + 1] += 1;
            }
        }
        for i in 0..n {
            dep_ptrs[i + 1] += dep_ptrs[i];
            dependent_ptrs[i + 1] += dependent_ptrs[i];
        }

        let off_diagonal = dep_ptrs[n];
        let mut dep_cols = vec![0usize; off_diagonal];
        let mut dep_vals = vec![T::zero(); off_diagonal];
        let mut dependent_rows = vec![0usize; off_diagonal];
        let mut dep_fill = dep_ptrs[..n].to_vec();
        let mut dependent_fill = dependent_ptrs[..n].to_vec();

        for (row, col, val) in matrix.entries().filter(|&(row, col, _)| row != col) {
            dep_cols[dep_fill[row]] = col;
            dep_vals[dep_fill[row]] = val;
            dep_fill[row] += 1;

            dependent_rows[dependent_fill[col]] = row;
            dependent_fill[col] += 1;
        }

        Self {
            matrix,
            dep_ptrs,
            dep_cols,
            dep_vals,
            dependent_ptrs,
            dependent_rows,
            pivots,
        }
    }

    /// Underlying matrix
    pub fn matrix(&self) -> &'a TriangularMatrix<T> {
        self.matrix
    }

    /// Matrix dimension
    pub fn n(&self) -> usize {
        self.matrix.n()
    }

    /// Stored entries of the underlying matrix
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    /// Number of off-diagonal entries
    pub fn off_diagonal_nnz(&self) -> usize {
        self.dep_cols.len()
    }

    /// Off-diagonal `(col, coefficient)` pairs row `row` reads
    #[inline]
    pub fn dependencies(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.dep_ptrs[row]..self.dep_ptrs[row + 1];
        self.dep_cols[range.clone()]
            .iter()
            .copied()
            .zip(self.dep_vals[range].iter().copied())
    }

    /// Rows whose off-diagonal entries reference `col`
    #[inline]
    pub fn dependents(&self, col: usize) -> &[usize] {
        &self.dependent_rows[self.dependent_ptrs[col]..self.dependent_ptrs[col + 1]]
    }

    /// Number of rows `row` must wait for
    #[inline]
    pub fn in_degree(&self, row: usize) -> usize {
        self.dep_ptrs[row + 1] - self.dep_ptrs[row]
    }

    /// Work of one row: its off-diagonal entries plus the diagonal
    #[inline]
    pub fn row_nnz(&self, row: usize) -> usize {
        self.in_degree(row) + 1
    }

    /// Diagonal coefficient of `row` (one for unit-diagonal matrices)
    #[inline]
    pub fn pivot(&self, row: usize) -> T {
        self.pivots[row]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::{StorageOrder, Triangle};

    fn scenario() -> TriangularMatrix<f64> {
        TriangularMatrix::from_triplets(
            4,
            Triangle::Lower,
            DiagonalKind::Explicit,
            &[
                (0, 0, 2.0),
                (1, 1, 3.0),
                (2, 2, 1.0),
                (3, 3, 4.0),
                (2, 0, 1.0),
                (3, 1, 1.0),
                (3, 0, 0.5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_adjacency_from_csc() {
        let m = scenario();
        let view = TriangularView::new(&m);

        assert_eq!(view.off_diagonal_nnz(), 3);
        assert_eq!(view.in_degree(0), 0);
        assert_eq!(view.in_degree(2), 1);
        assert_eq!(view.in_degree(3), 2);
        assert_eq!(view.dependents(0), &[2, 3]);
        assert_eq!(view.dependents(1), &[3]);
        assert!(view.dependents(3).is_empty());

        let deps: Vec<_> = view.dependencies(3).collect();
        assert_eq!(deps, vec![(0, 0.5), (1, 1.0)]);
        assert_eq!(view.pivot(1), 3.0);
        assert_eq!(view.row_nnz(3), 3);
    }

    #[test]
    fn test_adjacency_from_csr_transpose() {
        let upper = scenario().transpose();
        assert_eq!(upper.order(), StorageOrder::RowMajor);
        let view = TriangularView::new(&upper);

        // Uᵀ = L: row 0 now reads columns 2 and 3
        assert_eq!(view.in_degree(0), 2);
        assert_eq!(view.in_degree(3), 0);
        assert_eq!(view.dependents(3), &[0, 1]);
        assert_eq!(view.pivot(3), 4.0);
    }

    #[test]
    fn test_unit_diagonal_pivots() {
        let m = TriangularMatrix::from_triplets(
            3,
            Triangle::Lower,
            DiagonalKind::Unit,
            &[(1, 1, 9.0), (2, 0, 2.0)],
        )
        .unwrap();
        let view = TriangularView::new(&m);
        assert_eq!(view.pivot(1), 1.0);
        assert_eq!(view.in_degree(2), 1);
    }
}

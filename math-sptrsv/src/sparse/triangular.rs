//! Compressed triangular matrix
//!
//! A [`TriangularMatrix`] stores one triangle of a square sparse matrix in
//! compressed column (CSC) or compressed row (CSR) form:
//! - `ptrs`: where each column (or row) starts in `indices`/`values`
//! - `indices`: row index (CSC) or column index (CSR) of each entry
//! - `values`: non-zero entries
//!
//! Construction validates every structural invariant, so a solve never has
//! to re-check indices while workers are running.

use crate::error::{MatrixDefect, Result, SolveError};
use crate::parallel::parallel_map_indexed;
use crate::traits::Scalar;
use ndarray::{Array1, Array2};
use std::ops::Range;

/// Compressed layout of the stored arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOrder {
    /// CSC: `ptrs` indexes columns, `indices` holds row ids
    ColumnMajor,
    /// CSR: `ptrs` indexes rows, `indices` holds column ids
    RowMajor,
}

impl StorageOrder {
    fn flipped(self) -> Self {
        match self {
            StorageOrder::ColumnMajor => StorageOrder::RowMajor,
            StorageOrder::RowMajor => StorageOrder::ColumnMajor,
        }
    }
}

/// Which half of the matrix holds the entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triangle {
    /// Entries satisfy `row >= col`
    Lower,
    /// Entries satisfy `row <= col`
    Upper,
}

impl Triangle {
    /// Whether `(row, col)` lies inside this triangle (diagonal included)
    #[inline]
    pub fn contains(self, row: usize, col: usize) -> bool {
        match self {
            Triangle::Lower => row >= col,
            Triangle::Upper => row <= col,
        }
    }

    fn flipped(self) -> Self {
        match self {
            Triangle::Lower => Triangle::Upper,
            Triangle::Upper => Triangle::Lower,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Triangle::Lower => "lower",
            Triangle::Upper => "upper",
        }
    }
}

/// How the diagonal is represented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagonalKind {
    /// Every row stores its own diagonal entry
    Explicit,
    /// The diagonal is implicitly one; stored diagonal entries are ignored
    Unit,
}

/// Square sparse triangular matrix in compressed form
///
/// Immutable once built. The solver only borrows it.
#[derive(Debug, Clone)]
pub struct TriangularMatrix<T: Scalar> {
    n: usize,
    order: StorageOrder,
    triangle: Triangle,
    diagonal: DiagonalKind,
    ptrs: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> TriangularMatrix<T> {
    /// Create a triangular matrix from raw compressed arrays
    ///
    /// Fails with [`SolveError::MalformedMatrix`] when the pointer array is
    /// not monotonic, an index is out of range, an entry sits on the wrong
    /// side of the diagonal, an entry is duplicated, or (for
    /// [`DiagonalKind::Explicit`]) a row has no diagonal entry.
    pub fn from_raw_parts(
        n: usize,
        order: StorageOrder,
        triangle: Triangle,
        diagonal: DiagonalKind,
        ptrs: Vec<usize>,
        indices: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self> {
        let matrix = Self {
            n,
            order,
            triangle,
            diagonal,
            ptrs,
            indices,
            values,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Create a matrix from (row, col, value) triplets, stored column-major
    ///
    /// Duplicates are rejected rather than summed.
    pub fn from_triplets(
        n: usize,
        triangle: Triangle,
        diagonal: DiagonalKind,
        triplets: &[(usize, usize, T)],
    ) -> Result<Self> {
        for (slot, &(row, col, _)) in triplets.iter().enumerate() {
            let index = row.max(col);
            if index >= n {
                return Err(MatrixDefect::IndexOutOfRange { index, slot, n }.into());
            }
        }

        let mut sorted: Vec<(usize, usize, T)> = triplets.to_vec();
        sorted.sort_by_key(|&(row, col, _)| (col, row));

        let mut ptrs = vec![0usize; n + 1];
        for &(_, col, _) in &sorted {
            ptrs[col + 1] += 1;
        }
        for j in 0..n {
            ptrs[j + 1] += ptrs[j];
        }

        let indices = sorted.iter().map(|&(row, _, _)| row).collect();
        let values = sorted.iter().map(|&(_, _, v)| v).collect();

        Self::from_raw_parts(
            n,
            StorageOrder::ColumnMajor,
            triangle,
            diagonal,
            ptrs,
            indices,
            values,
        )
    }

    /// Create a matrix from one triangle of a dense square matrix
    ///
    /// Off-diagonal entries with magnitude `<= threshold` are dropped. The
    /// diagonal is always stored, even when zero, so a zero pivot shows up as
    /// a singular pivot at solve time rather than a missing entry.
    pub fn from_dense(dense: &Array2<T>, triangle: Triangle, threshold: T) -> Result<Self> {
        let n = dense.nrows();
        if dense.ncols() != n {
            return Err(SolveError::DimensionMismatch {
                expected: n,
                got: dense.ncols(),
            });
        }

        let mut ptrs = Vec::with_capacity(n + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        ptrs.push(0);

        for col in 0..n {
            for row in 0..n {
                let val = dense[[row, col]];
                let keep = row == col || val.abs() > threshold;
                if !keep {
                    continue;
                }
                if !triangle.contains(row, col) {
                    return Err(MatrixDefect::WrongTriangle {
                        row,
                        col,
                        triangle: triangle.name(),
                    }
                    .into());
                }
                indices.push(row);
                values.push(val);
            }
            ptrs.push(indices.len());
        }

        Self::from_raw_parts(
            n,
            StorageOrder::ColumnMajor,
            triangle,
            DiagonalKind::Explicit,
            ptrs,
            indices,
            values,
        )
    }

    /// Identity matrix (a valid lower or upper triangle)
    pub fn identity(n: usize, triangle: Triangle) -> Self {
        Self::from_diagonal(&Array1::from_elem(n, T::one()), triangle)
    }

    /// Diagonal-only matrix
    pub fn from_diagonal(diag: &Array1<T>, triangle: Triangle) -> Self {
        let n = diag.len();
        Self {
            n,
            order: StorageOrder::ColumnMajor,
            triangle,
            diagonal: DiagonalKind::Explicit,
            ptrs: (0..=n).collect(),
            indices: (0..n).collect(),
            values: diag.to_vec(),
        }
    }

    fn validate(&self) -> Result<()> {
        let n = self.n;
        if self.ptrs.len() != n + 1 {
            return Err(MatrixDefect::PointerLength {
                expected: n + 1,
                got: self.ptrs.len(),
            }
            .into());
        }
        if self.indices.len() != self.values.len() {
            return Err(MatrixDefect::LengthMismatch {
                indices: self.indices.len(),
                values: self.values.len(),
            }
            .into());
        }

        let nnz = self.values.len();
        let first = self.ptrs[0];
        let last = self.ptrs[n];
        if first != 0 || last != nnz {
            return Err(MatrixDefect::PointerBounds { first, last, nnz }.into());
        }
        if let Some(position) = self.ptrs.windows(2).position(|w| w[1] < w[0]) {
            return Err(MatrixDefect::NonMonotonicPointers { position }.into());
        }

        // last_seen[inner] == outer + 1 marks a position already used in this outer slice
        let mut last_seen = vec![0usize; n];
        let mut has_diagonal = vec![false; n];

        for outer in 0..n {
            for slot in self.outer_range(outer) {
                let inner = self.indices[slot];
                if inner >= n {
                    return Err(MatrixDefect::IndexOutOfRange {
                        index: inner,
                        slot,
                        n,
                    }
                    .into());
                }

                let (row, col) = self.coords(outer, inner);
                if !self.triangle.contains(row, col) {
                    return Err(MatrixDefect::WrongTriangle {
                        row,
                        col,
                        triangle: self.triangle.name(),
                    }
                    .into());
                }
                if last_seen[inner] == outer + 1 {
                    return Err(MatrixDefect::DuplicateEntry { row, col }.into());
                }
                last_seen[inner] = outer + 1;

                if row == col {
                    has_diagonal[row] = true;
                }
            }
        }

        if self.diagonal == DiagonalKind::Explicit {
            if let Some(row) = has_diagonal.iter().position(|&present| !present) {
                return Err(MatrixDefect::MissingDiagonal { row }.into());
            }
        }

        Ok(())
    }

    /// Matrix dimension
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Storage layout
    pub fn order(&self) -> StorageOrder {
        self.order
    }

    /// Declared triangle
    pub fn triangle(&self) -> Triangle {
        self.triangle
    }

    /// Diagonal representation
    pub fn diagonal_kind(&self) -> DiagonalKind {
        self.diagonal
    }

    /// Raw pointer array (`n + 1` entries)
    pub fn ptrs(&self) -> &[usize] {
        &self.ptrs
    }

    /// Raw inner index array
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Raw value array
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Slot range of one column (CSC) or row (CSR)
    #[inline]
    pub fn outer_range(&self, outer: usize) -> Range<usize> {
        self.ptrs[outer]..self.ptrs[outer + 1]
    }

    /// `(inner index, value)` pairs of one column (CSC) or row (CSR)
    pub fn outer_entries(&self, outer: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.outer_range(outer);
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    #[inline]
    fn coords(&self, outer: usize, inner: usize) -> (usize, usize) {
        match self.order {
            StorageOrder::ColumnMajor => (inner, outer),
            StorageOrder::RowMajor => (outer, inner),
        }
    }

    /// Every stored entry as `(row, col, value)`, in storage order
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.n).flat_map(move |outer| {
            self.outer_entries(outer).map(move |(inner, val)| {
                let (row, col) = self.coords(outer, inner);
                (row, col, val)
            })
        })
    }

    /// Transpose by reinterpreting the compressed arrays
    ///
    /// The CSC arrays of `L` read as CSR are `Lᵀ`, an upper matrix, so no
    /// entry moves.
    pub fn transpose(self) -> Self {
        Self {
            order: self.order.flipped(),
            triangle: self.triangle.flipped(),
            ..self
        }
    }

    /// Entry at `(row, col)`, zero if not stored
    ///
    /// Under [`DiagonalKind::Unit`] the diagonal reads as one.
    pub fn get(&self, row: usize, col: usize) -> T {
        if row == col && self.diagonal == DiagonalKind::Unit {
            return T::one();
        }
        let (outer, inner) = match self.order {
            StorageOrder::ColumnMajor => (col, row),
            StorageOrder::RowMajor => (row, col),
        };
        self.outer_entries(outer)
            .find(|&(idx, _)| idx == inner)
            .map(|(_, val)| val)
            .unwrap_or_else(T::zero)
    }

    /// Effective diagonal (ones under [`DiagonalKind::Unit`])
    pub fn diagonal(&self) -> Array1<T> {
        Array1::from_iter((0..self.n).map(|i| self.get(i, i)))
    }

    /// Matrix-vector product `y = A * x`
    pub fn matvec(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.n, "Input vector size mismatch");

        let mut y = Array1::from_elem(self.n, T::zero());
        for (row, col, val) in self.effective_entries() {
            y[row] += val * x[col];
        }
        y
    }

    /// Product with a dense block `Y = A * X` where `X` is `n × k`
    ///
    /// Right-hand-side columns are processed in parallel when the `rayon`
    /// feature is enabled.
    pub fn matmul_dense(&self, x: &Array2<T>) -> Array2<T> {
        assert_eq!(x.nrows(), self.n, "Input block size mismatch");

        let k = x.ncols();
        let columns: Vec<Array1<T>> =
            parallel_map_indexed(k, |lane| self.matvec(&x.column(lane).to_owned()));

        let mut y = Array2::from_elem((self.n, k), T::zero());
        for (lane, column) in columns.into_iter().enumerate() {
            y.column_mut(lane).assign(&column);
        }
        y
    }

    /// Largest absolute entry of `A * X - B`
    ///
    /// NaN entries in the residual propagate to the result.
    pub fn residual_norm(&self, x: &Array2<T>, b: &Array2<T>) -> T {
        assert_eq!(x.dim(), b.dim(), "Solution and right-hand side shapes differ");

        let ax = self.matmul_dense(x);
        ax.iter()
            .zip(b.iter())
            .map(|(&lhs, &rhs)| (lhs - rhs).abs())
            .fold(T::zero(), |acc, r| {
                if acc.is_nan() || r.is_nan() {
                    T::nan()
                } else {
                    acc.max(r)
                }
            })
    }

    /// Convert to a dense matrix (for debugging and small matrices)
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::from_elem((self.n, self.n), T::zero());
        for (row, col, val) in self.effective_entries() {
            dense[[row, col]] = val;
        }
        dense
    }

    fn effective_entries(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let unit = self.diagonal == DiagonalKind::Unit;
        let stored = self
            .entries()
            .filter(move |&(row, col, _)| !(unit && row == col));
        let implicit = (0..self.n)
            .filter(move |_| unit)
            .map(|i| (i, i, T::one()));
        stored.chain(implicit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn scenario_lower() -> TriangularMatrix<f64> {
        let triplets = [
            (0, 0, 2.0),
            (1, 1, 3.0),
            (2, 2, 1.0),
            (3, 3, 4.0),
            (2, 0, 1.0),
            (3, 1, 1.0),
        ];
        TriangularMatrix::from_triplets(4, Triangle::Lower, DiagonalKind::Explicit, &triplets)
            .unwrap()
    }

    #[test]
    fn test_from_triplets_builds_csc() {
        let m = scenario_lower();
        assert_eq!(m.n(), 4);
        assert_eq!(m.nnz(), 6);
        assert_eq!(m.order(), StorageOrder::ColumnMajor);
        assert_eq!(m.ptrs(), &[0, 2, 4, 5, 6]);
        assert_eq!(m.indices(), &[0, 2, 1, 3, 2, 3]);
        assert_relative_eq!(m.get(2, 0), 1.0);
        assert_relative_eq!(m.get(0, 2), 0.0);
        assert_relative_eq!(m.get(3, 3), 4.0);
    }

    #[test]
    fn test_rejects_wrong_triangle() {
        let err = TriangularMatrix::from_triplets(
            2,
            Triangle::Lower,
            DiagonalKind::Explicit,
            &[(0, 0, 1.0), (1, 1, 1.0), (0, 1, 5.0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SolveError::MalformedMatrix(MatrixDefect::WrongTriangle { row: 0, col: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_and_pointers() {
        let err = TriangularMatrix::<f64>::from_raw_parts(
            2,
            StorageOrder::ColumnMajor,
            Triangle::Lower,
            DiagonalKind::Unit,
            vec![0, 1, 2],
            vec![0, 7],
            vec![1.0, 1.0],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SolveError::MalformedMatrix(MatrixDefect::IndexOutOfRange { index: 7, .. })
        ));

        let err = TriangularMatrix::<f64>::from_raw_parts(
            3,
            StorageOrder::RowMajor,
            Triangle::Lower,
            DiagonalKind::Unit,
            vec![0, 2, 1, 2],
            vec![0, 1],
            vec![1.0, 1.0],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SolveError::MalformedMatrix(MatrixDefect::NonMonotonicPointers { position: 1 })
        ));

        let err = TriangularMatrix::<f64>::from_raw_parts(
            2,
            StorageOrder::RowMajor,
            Triangle::Lower,
            DiagonalKind::Unit,
            vec![0, 1],
            vec![0],
            vec![1.0],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SolveError::MalformedMatrix(MatrixDefect::PointerLength { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_rejects_duplicates_and_missing_diagonal() {
        let err = TriangularMatrix::from_triplets(
            2,
            Triangle::Lower,
            DiagonalKind::Explicit,
            &[(0, 0, 1.0), (1, 1, 1.0), (1, 0, 1.0), (1, 0, 2.0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SolveError::MalformedMatrix(MatrixDefect::DuplicateEntry { row: 1, col: 0 })
        ));

        let err = TriangularMatrix::from_triplets(
            3,
            Triangle::Lower,
            DiagonalKind::Explicit,
            &[(0, 0, 1.0), (2, 2, 1.0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SolveError::MalformedMatrix(MatrixDefect::MissingDiagonal { row: 1 })
        ));

        // Unit diagonal needs no stored diagonal
        let m = TriangularMatrix::from_triplets(
            3,
            Triangle::Lower,
            DiagonalKind::Unit,
            &[(2, 0, 4.0)],
        )
        .unwrap();
        assert_relative_eq!(m.get(1, 1), 1.0);
    }

    #[test]
    fn test_transpose_reinterprets_storage() {
        let lower = scenario_lower();
        let upper = lower.clone().transpose();
        assert_eq!(upper.triangle(), Triangle::Upper);
        assert_eq!(upper.order(), StorageOrder::RowMajor);
        assert_eq!(upper.to_dense(), lower.to_dense().t());
    }

    #[test]
    fn test_from_dense_and_products() {
        let dense = array![[2.0_f64, 0.0, 0.0], [1.0, 3.0, 0.0], [0.0, -1.0, 4.0]];
        let m = TriangularMatrix::from_dense(&dense, Triangle::Lower, 1e-15).unwrap();
        assert_eq!(m.nnz(), 5);
        assert_eq!(m.to_dense(), dense);

        let x = array![1.0_f64, 2.0, 3.0];
        let y = m.matvec(&x);
        assert_relative_eq!(y[0], 2.0);
        assert_relative_eq!(y[1], 7.0);
        assert_relative_eq!(y[2], 10.0);

        let block = array![[1.0_f64, 0.0], [2.0, 1.0], [3.0, 0.0]];
        let yb = m.matmul_dense(&block);
        assert_relative_eq!(yb[[2, 0]], 10.0);
        assert_relative_eq!(yb[[1, 1]], 3.0);
        assert_relative_eq!(m.residual_norm(&block, &yb), 0.0);

        assert!(TriangularMatrix::from_dense(&dense, Triangle::Upper, 1e-15).is_err());
    }
}

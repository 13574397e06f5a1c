//! Error types for the triangular solve.
//!
//! Structural and configuration errors are raised before any worker starts.
//! A singular pivot is the only error discovered while the solve runs; it is
//! reported once after every row has been processed.

use thiserror::Error;

/// Structural defects found while validating a [`TriangularMatrix`](crate::TriangularMatrix).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixDefect {
    /// The pointer array does not have `n + 1` entries.
    #[error("pointer array has {got} entries, expected {expected}")]
    PointerLength {
        /// Expected length (`n + 1`)
        expected: usize,
        /// Actual length
        got: usize,
    },

    /// The index and value arrays disagree in length.
    #[error("index array has {indices} entries but value array has {values}")]
    LengthMismatch {
        /// Length of the index array
        indices: usize,
        /// Length of the value array
        values: usize,
    },

    /// The pointer array does not start at zero or does not end at nnz.
    #[error("pointer array must span 0..{nnz}, found {first}..{last}")]
    PointerBounds {
        /// First pointer value
        first: usize,
        /// Last pointer value
        last: usize,
        /// Number of stored entries
        nnz: usize,
    },

    /// The pointer array decreases somewhere.
    #[error("pointer array decreases at position {position}")]
    NonMonotonicPointers {
        /// Position `p` where `ptr[p + 1] < ptr[p]`
        position: usize,
    },

    /// A stored index is outside `0..n`.
    #[error("index {index} at slot {slot} is out of range for dimension {n}")]
    IndexOutOfRange {
        /// Offending index value
        index: usize,
        /// Position in the index array
        slot: usize,
        /// Matrix dimension
        n: usize,
    },

    /// An entry lies on the wrong side of the diagonal.
    #[error("entry ({row}, {col}) lies outside the {triangle} triangle")]
    WrongTriangle {
        /// Row of the entry
        row: usize,
        /// Column of the entry
        col: usize,
        /// Declared triangle
        triangle: &'static str,
    },

    /// The same (row, col) position is stored twice.
    #[error("entry ({row}, {col}) is stored more than once")]
    DuplicateEntry {
        /// Row of the entry
        row: usize,
        /// Column of the entry
        col: usize,
    },

    /// An explicit-diagonal matrix has no stored diagonal for this row.
    #[error("no diagonal entry stored for row {row}")]
    MissingDiagonal {
        /// Row without a diagonal
        row: usize,
    },
}

/// Errors returned by the triangular solver.
#[derive(Debug, Error)]
pub enum SolveError {
    /// The matrix failed structural validation.
    #[error("malformed triangular matrix: {0}")]
    MalformedMatrix(#[from] MatrixDefect),

    /// A zero (or below tolerance) pivot was met during the solve.
    ///
    /// The solution buffer still holds every row that does not depend on a
    /// singular row; the singular rows and their dependents are NaN.
    #[error("singular pivot at row {row} ({count} singular rows in total)")]
    SingularPivot {
        /// First singular row in traversal order
        row: usize,
        /// Number of singular rows
        count: usize,
    },

    /// A direction code outside {0 = forward, 1 = backward}.
    #[error("unsupported substitution direction code {0}")]
    UnsupportedDirection(i32),

    /// The solver configuration cannot be honored.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The right-hand side does not match the matrix dimension.
    #[error("dimension mismatch: expected {expected} rows, got {got}")]
    DimensionMismatch {
        /// Matrix dimension
        expected: usize,
        /// Rows in the supplied buffer
        got: usize,
    },

    /// Output and right-hand-side buffers differ in shape.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Shape of the right-hand side (`n`, `k`)
        expected: (usize, usize),
        /// Shape of the output buffer
        got: (usize, usize),
    },

    /// An execution group thread could not be started.
    #[error("failed to start execution group: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

impl SolveError {
    /// Returns `true` for errors detected before any work starts.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SolveError::MalformedMatrix(_)
                | SolveError::UnsupportedDirection(_)
                | SolveError::InvalidConfiguration(_)
                | SolveError::DimensionMismatch { .. }
                | SolveError::ShapeMismatch { .. }
        )
    }

    /// Returns `true` for errors produced by the numeric values of the matrix.
    pub fn is_numeric(&self) -> bool {
        matches!(self, SolveError::SingularPivot { .. })
    }
}

/// A specialized `Result` type for solver operations.
pub type Result<T> = std::result::Result<T, SolveError>;

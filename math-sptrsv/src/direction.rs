//! Substitution direction
//!
//! Forward substitution consumes a lower triangle and solves rows in
//! increasing order; backward substitution consumes an upper triangle and
//! solves rows in decreasing order. The direction carries no state beyond
//! that choice.

use crate::error::{Result, SolveError};
use crate::sparse::Triangle;

/// Direction code for forward substitution in numeric configurations
pub const SUBSTITUTION_FORWARD: i32 = 0;
/// Direction code for backward substitution in numeric configurations
pub const SUBSTITUTION_BACKWARD: i32 = 1;

/// Forward or backward substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolveDirection {
    /// Solve `L x = b`, rows `0..n`
    Forward,
    /// Solve `U x = b`, rows `n-1..=0`
    Backward,
}

impl SolveDirection {
    /// Parse a numeric direction code
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            SUBSTITUTION_FORWARD => Ok(SolveDirection::Forward),
            SUBSTITUTION_BACKWARD => Ok(SolveDirection::Backward),
            other => Err(SolveError::UnsupportedDirection(other)),
        }
    }

    /// Numeric code of this direction
    pub fn code(self) -> i32 {
        match self {
            SolveDirection::Forward => SUBSTITUTION_FORWARD,
            SolveDirection::Backward => SUBSTITUTION_BACKWARD,
        }
    }

    /// Triangle this direction consumes
    pub fn triangle(self) -> Triangle {
        match self {
            SolveDirection::Forward => Triangle::Lower,
            SolveDirection::Backward => Triangle::Upper,
        }
    }

    /// Check that a matrix of the given triangle can be solved in this direction
    pub fn check_triangle(self, triangle: Triangle) -> Result<()> {
        if triangle == self.triangle() {
            Ok(())
        } else {
            Err(SolveError::InvalidConfiguration(format!(
                "{self:?} substitution needs a {:?} triangular matrix, got {triangle:?}",
                self.triangle()
            )))
        }
    }

    /// Row id at traversal position `pos`
    #[inline]
    pub fn row_at(self, pos: usize, n: usize) -> usize {
        match self {
            SolveDirection::Forward => pos,
            SolveDirection::Backward => n - 1 - pos,
        }
    }

    /// Traversal position of row `row`
    #[inline]
    pub fn position_of(self, row: usize, n: usize) -> usize {
        // the mapping is its own inverse
        self.row_at(row, n)
    }

    /// Rows in traversal order
    pub fn traversal(self, n: usize) -> impl Iterator<Item = usize> {
        (0..n).map(move |pos| self.row_at(pos, n))
    }
}

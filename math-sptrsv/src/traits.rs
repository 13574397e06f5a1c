//! Scalar abstraction for the triangular solve
//!
//! The solve is defined over real floating point values in single or double
//! precision. [`Scalar`] bundles the arithmetic the kernel needs with a
//! [`Precision`] tag so callers and the benchmark harness can report which
//! variant they are running.

use num_traits::{Float, FromPrimitive, NumAssign, ToPrimitive};
use std::fmt::{Debug, Display};

/// Floating point width of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 32-bit IEEE 754
    Single,
    /// 64-bit IEEE 754
    Double,
}

impl Precision {
    /// Size in bytes of one value
    pub fn bytes(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Single => f.write_str("single"),
            Precision::Double => f.write_str("double"),
        }
    }
}

/// Trait for the real scalar types a triangular solve runs on.
///
/// # Implementations
///
/// Provided for:
/// - `f64` (default)
/// - `f32` (for memory-constrained or throughput-bound runs)
pub trait Scalar:
    Float + NumAssign + FromPrimitive + ToPrimitive + Copy + Send + Sync + Debug + Display + 'static
{
    /// Precision tag for this type
    const PRECISION: Precision;

    /// Convert from an `f64` literal, saturating to infinity when out of range
    fn from_f64_lossy(value: f64) -> Self;

    /// Whether `|self| <= tol`, treating NaN as singular
    #[inline]
    fn is_singular_pivot(&self, tol: Self) -> bool {
        self.is_nan() || self.abs() <= tol
    }
}

impl Scalar for f64 {
    const PRECISION: Precision = Precision::Double;

    #[inline]
    fn from_f64_lossy(value: f64) -> Self {
        value
    }
}

impl Scalar for f32 {
    const PRECISION: Precision = Precision::Single;

    #[inline]
    fn from_f64_lossy(value: f64) -> Self {
        value as f32
    }
}

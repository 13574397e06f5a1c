//! Test data for triangular solve tests and benchmarks
//!
//! Seeded generators for well-conditioned random triangular systems with
//! different dependency shapes.

use crate::sparse::{DiagonalKind, Triangle, TriangularMatrix};
use crate::traits::Scalar;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random diagonally dominant lower-triangular matrix
///
/// Row `i` gets up to `2 * avg_off_diagonal` distinct off-diagonal entries in
/// columns `0..i`, values in `[-1, 1]`; the diagonal is one plus the row's
/// absolute sum, which keeps the solve well conditioned.
pub fn random_lower<T: Scalar>(
    n: usize,
    avg_off_diagonal: usize,
    seed: u64,
) -> TriangularMatrix<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut triplets = Vec::with_capacity(n * (avg_off_diagonal + 1));

    for row in 0..n {
        let mut cols: Vec<usize> = if row == 0 {
            Vec::new()
        } else {
            let count = rng.random_range(0..=2 * avg_off_diagonal);
            (0..count).map(|_| rng.random_range(0..row)).collect()
        };
        cols.sort_unstable();
        cols.dedup();

        let mut abs_sum = 0.0;
        for col in cols {
            let val: f64 = rng.random_range(-1.0..=1.0);
            abs_sum += val.abs();
            triplets.push((row, col, T::from_f64_lossy(val)));
        }
        triplets.push((row, row, T::from_f64_lossy(1.0 + abs_sum)));
    }

    build_lower(n, &triplets)
}

/// Random upper-triangular matrix, the transpose of [`random_lower`]
pub fn random_upper<T: Scalar>(
    n: usize,
    avg_off_diagonal: usize,
    seed: u64,
) -> TriangularMatrix<T> {
    random_lower(n, avg_off_diagonal, seed).transpose()
}

/// Lower matrix where every `stride`-th row is dense and the rest are bidiagonal
///
/// Produces the skewed row density the NNZ strategy balances.
pub fn skewed_lower<T: Scalar>(n: usize, stride: usize, seed: u64) -> TriangularMatrix<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    let stride = stride.max(1);
    let mut triplets = Vec::new();

    for row in 0..n {
        let mut abs_sum = 0.0;
        if row % stride == 0 {
            for col in 0..row {
                let val: f64 = rng.random_range(-1.0..=1.0) / row as f64;
                abs_sum += val.abs();
                triplets.push((row, col, T::from_f64_lossy(val)));
            }
        } else if row > 0 {
            let val: f64 = rng.random_range(-1.0..=1.0);
            abs_sum += val.abs();
            triplets.push((row, row - 1, T::from_f64_lossy(val)));
        }
        triplets.push((row, row, T::from_f64_lossy(1.0 + abs_sum)));
    }

    build_lower(n, &triplets)
}

/// Bidiagonal lower matrix: every row waits for the previous one
pub fn chain_lower<T: Scalar>(n: usize) -> TriangularMatrix<T> {
    let mut triplets: Vec<(usize, usize, T)> =
        (0..n).map(|i| (i, i, T::from_f64_lossy(2.0))).collect();
    triplets.extend((1..n).map(|i| (i, i - 1, T::from_f64_lossy(-1.0))));
    build_lower(n, &triplets)
}

/// Dense `n × k` right-hand side with entries in `[-10, 10]`
pub fn random_rhs<T: Scalar>(n: usize, k: usize, seed: u64) -> Array2<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((n, k), || T::from_f64_lossy(rng.random_range(-10.0..=10.0)))
}

fn build_lower<T: Scalar>(n: usize, triplets: &[(usize, usize, T)]) -> TriangularMatrix<T> {
    // generated entries are in range, unique and below the diagonal
    let built =
        TriangularMatrix::from_triplets(n, Triangle::Lower, DiagonalKind::Explicit, triplets);
    match built {
        Ok(matrix) => matrix,
        Err(err) => unreachable!("generated matrix is malformed: {err}"),
    }
}

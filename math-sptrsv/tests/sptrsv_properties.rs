//! Integration tests for the synchronization-free triangular solve
//!
//! Each test checks one property of the solve against a sequential dense
//! reference: correctness, completeness, direction symmetry, strategy
//! equivalence, the diagonal case and singular propagation.

use approx::assert_relative_eq;
use math_audio_sptrsv::testdata::{chain_lower, random_lower, random_rhs, random_upper, skewed_lower};
use math_audio_sptrsv::{
    DiagonalKind, SolveDirection, SolveError, SolverConfig, StorageOrder, Triangle,
    TriangularMatrix, TriangularSolver, WarpStrategy, sptrsv,
};
use ndarray::{Array1, Array2, array};
use std::collections::VecDeque;

/// Sequential dense substitution used as the reference
fn dense_reference(matrix: &TriangularMatrix<f64>, b: &Array2<f64>) -> Array2<f64> {
    let a = matrix.to_dense();
    let n = matrix.n();
    let rows: Vec<usize> = match matrix.triangle() {
        Triangle::Lower => (0..n).collect(),
        Triangle::Upper => (0..n).rev().collect(),
    };

    let mut x = b.clone();
    for lane in 0..b.ncols() {
        for &i in &rows {
            let mut sum = b[[i, lane]];
            for j in 0..n {
                if j != i && a[[i, j]] != 0.0 {
                    sum -= a[[i, j]] * x[[j, lane]];
                }
            }
            x[[i, lane]] = sum / a[[i, i]];
        }
    }
    x
}

fn config(strategy: WarpStrategy, units: usize) -> SolverConfig {
    SolverConfig {
        strategy,
        compute_units: Some(units),
        group_size: 4,
        track_writes: true,
        ..SolverConfig::default()
    }
}

fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[test]
fn test_scenario_from_description() {
    let l = TriangularMatrix::from_triplets(
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
        ],
    )
    .unwrap();

    for strategy in [WarpStrategy::Nnz, WarpStrategy::Rhs, WarpStrategy::Auto] {
        let mut b = array![[2.0], [6.0], [5.0], [12.0]];
        sptrsv(&l, SolveDirection::Forward, &mut b, &config(strategy, 4)).unwrap();
        assert_eq!(b, array![[1.0], [2.0], [4.0], [2.5]]);
    }
}

#[test]
fn test_random_systems_match_reference() {
    for (seed, &(n, avg, k)) in [(200, 4, 1), (500, 8, 3), (64, 1, 9)].iter().enumerate() {
        let seed = seed as u64;
        let l = random_lower::<f64>(n, avg, seed);
        let b = random_rhs::<f64>(n, k, seed + 100);

        let mut x = b.clone();
        sptrsv(&l, SolveDirection::Forward, &mut x, &config(WarpStrategy::Auto, 4)).unwrap();

        assert!(max_abs_diff(&x, &dense_reference(&l, &b)) < 1e-10);
        assert!(l.residual_norm(&x, &b) < 1e-9);
    }
}

#[test]
fn test_backward_random_systems() {
    let u = random_upper::<f64>(300, 5, 9);
    assert_eq!(u.order(), StorageOrder::RowMajor);
    let b = random_rhs::<f64>(300, 2, 10);

    let mut solver =
        TriangularSolver::new(&u, SolveDirection::Backward, &config(WarpStrategy::Nnz, 3))
            .unwrap();
    let x = solver.solve(&b).unwrap();

    assert!(max_abs_diff(&x, &dense_reference(&u, &b)) < 1e-10);
    assert!(u.residual_norm(&x, &b) < 1e-9);
}

#[test]
fn test_every_row_written_and_released_once() {
    let l = random_lower::<f64>(400, 6, 21);
    let k = 5;
    let b = random_rhs::<f64>(400, k, 22);

    for strategy in [WarpStrategy::Nnz, WarpStrategy::Rhs] {
        let mut solver =
            TriangularSolver::new(&l, SolveDirection::Forward, &config(strategy, 6)).unwrap();
        let mut x = b.clone();
        let stats = solver.solve_in_place(&mut x).unwrap();

        assert_eq!(stats.strategy, strategy);
        assert_eq!(stats.writes_per_row, Some(vec![k; 400]));

        let tracker = solver.tracker();
        assert!(tracker.all_resolved());
        assert_eq!(tracker.released() + tracker.initially_ready(), 400);
    }
}

#[test]
fn test_direction_symmetry_under_reversal() {
    // P L P with P the reversal permutation is upper triangular
    let n = 150;
    let l = random_lower::<f64>(n, 4, 31);
    let reversed: Vec<(usize, usize, f64)> = l
        .entries()
        .map(|(row, col, val)| (n - 1 - row, n - 1 - col, val))
        .collect();
    let u = TriangularMatrix::from_triplets(n, Triangle::Upper, DiagonalKind::Explicit, &reversed)
        .unwrap();

    let b = random_rhs::<f64>(n, 2, 32);
    let b_reversed = Array2::from_shape_fn((n, 2), |(i, lane)| b[[n - 1 - i, lane]]);

    let mut x_forward = b.clone();
    sptrsv(&l, SolveDirection::Forward, &mut x_forward, &config(WarpStrategy::Nnz, 4)).unwrap();
    let mut x_backward = b_reversed;
    sptrsv(&u, SolveDirection::Backward, &mut x_backward, &config(WarpStrategy::Nnz, 4)).unwrap();

    for i in 0..n {
        for lane in 0..2 {
            assert_relative_eq!(
                x_forward[[i, lane]],
                x_backward[[n - 1 - i, lane]],
                epsilon = 1e-12,
                max_relative = 1e-12
            );
        }
    }
}

#[test]
fn test_transpose_solves_transposed_system() {
    let n = 120;
    let l = random_lower::<f64>(n, 3, 41);
    let b = random_rhs::<f64>(n, 1, 42);
    let dense_lt = l.to_dense().t().to_owned();

    let lt = l.transpose();
    let mut x = b.clone();
    sptrsv(&lt, SolveDirection::Backward, &mut x, &config(WarpStrategy::Auto, 4)).unwrap();

    let lx = dense_lt.dot(&x);
    assert!(max_abs_diff(&lx, &b) < 1e-9);
}

#[test]
fn test_strategies_agree_bitwise() {
    let l = skewed_lower::<f64>(600, 50, 51);
    let b = random_rhs::<f64>(600, 7, 52);

    let solve = |strategy| {
        let mut x = b.clone();
        sptrsv(&l, SolveDirection::Forward, &mut x, &config(strategy, 5)).unwrap();
        x
    };

    // scheduling changes, the arithmetic order per row does not
    let nnz = solve(WarpStrategy::Nnz);
    assert_eq!(nnz, solve(WarpStrategy::Rhs));
    assert_eq!(nnz, solve(WarpStrategy::Auto));
}

#[test]
fn test_diagonal_matrix_divides_elementwise() {
    let diag = Array1::from_iter((1..=50).map(|i| i as f64 * 0.5));
    let d = TriangularMatrix::from_diagonal(&diag, Triangle::Lower);
    let b = random_rhs::<f64>(50, 3, 61);

    for strategy in [WarpStrategy::Nnz, WarpStrategy::Rhs, WarpStrategy::Auto] {
        let mut x = b.clone();
        sptrsv(&d, SolveDirection::Forward, &mut x, &config(strategy, 4)).unwrap();
        for i in 0..50 {
            for lane in 0..3 {
                assert_eq!(x[[i, lane]], b[[i, lane]] / diag[i]);
            }
        }
    }
}

#[test]
fn test_singular_pivot_propagates_to_dependents_only() {
    let n = 200;
    let singular = 40;
    let l = random_lower::<f64>(n, 2, 71);

    let poisoned: Vec<(usize, usize, f64)> = l
        .entries()
        .map(|(row, col, val)| {
            if row == singular && col == singular {
                (row, col, 0.0)
            } else {
                (row, col, val)
            }
        })
        .collect();
    let l_singular =
        TriangularMatrix::from_triplets(n, Triangle::Lower, DiagonalKind::Explicit, &poisoned)
            .unwrap();

    // rows reachable from the singular row through dependencies
    let dense = l.to_dense();
    let mut tainted = vec![false; n];
    tainted[singular] = true;
    let mut queue = VecDeque::from([singular]);
    while let Some(col) = queue.pop_front() {
        for row in (col + 1)..n {
            if !tainted[row] && dense[[row, col]] != 0.0 {
                tainted[row] = true;
                queue.push_back(row);
            }
        }
    }

    let b = random_rhs::<f64>(n, 1, 72);
    let reference = dense_reference(&l, &b);
    let mut x = b.clone();
    let err = sptrsv(
        &l_singular,
        SolveDirection::Forward,
        &mut x,
        &config(WarpStrategy::Nnz, 4),
    )
    .unwrap_err();

    assert!(matches!(err, SolveError::SingularPivot { row, count: 1 } if row == singular));
    for i in 0..n {
        if tainted[i] {
            assert!(x[[i, 0]].is_nan(), "row {i} should be NaN");
        } else {
            assert!(x[[i, 0]].is_finite(), "row {i} should be finite");
            assert_relative_eq!(x[[i, 0]], reference[[i, 0]], epsilon = 1e-10);
        }
    }
}

#[test]
fn test_long_chain_with_oversubscribed_groups() {
    let l = chain_lower::<f64>(3_000);
    let b = Array2::from_elem((3_000, 1), 1.0);
    let config = SolverConfig {
        compute_units: Some(8),
        groups_per_unit: 2,
        spin_limit: 8,
        ..SolverConfig::default()
    };

    let mut x = b.clone();
    let stats = sptrsv(&l, SolveDirection::Forward, &mut x, &config).unwrap();

    assert_eq!(stats.groups, 16);
    // x_i = (1 + x_{i-1}) / 2 converges to 1
    assert_relative_eq!(x[[0, 0]], 0.5);
    assert_relative_eq!(x[[2_999, 0]], 1.0, epsilon = 1e-12);
}

#[test]
fn test_single_precision() {
    let l = random_lower::<f32>(300, 4, 81);
    let b = random_rhs::<f32>(300, 2, 82);
    let mut x = b.clone();
    sptrsv(&l, SolveDirection::Forward, &mut x, &config(WarpStrategy::Auto, 4)).unwrap();
    assert!(l.residual_norm(&x, &b) < 1e-3);
}

#[test]
fn test_unit_diagonal_csr_input() {
    // L = [[1, 0, 0], [2, 1, 0], [0, 3, 1]] given row by row with implicit unit diagonal
    let l = TriangularMatrix::from_raw_parts(
        3,
        StorageOrder::RowMajor,
        Triangle::Lower,
        DiagonalKind::Unit,
        vec![0, 0, 1, 2],
        vec![0, 1],
        vec![2.0, 3.0],
    )
    .unwrap();
    let mut b = array![[1.0], [4.0], [7.0]];
    sptrsv(&l, SolveDirection::Forward, &mut b, &SolverConfig::default()).unwrap();
    assert_eq!(b, array![[1.0], [2.0], [1.0]]);
}

#[test]
fn test_auto_threshold_is_tunable() {
    let l = random_lower::<f64>(100, 3, 91);
    let wide = SolverConfig {
        auto_rhs_ratio: 0.5,
        ..SolverConfig::default()
    };
    let strict = SolverConfig {
        auto_rhs_ratio: 100.0,
        ..SolverConfig::default()
    };

    let solver = TriangularSolver::new(&l, SolveDirection::Forward, &wide).unwrap();
    assert_eq!(solver.plan(8).strategy(), WarpStrategy::Rhs);
    assert_eq!(solver.plan(1).strategy(), WarpStrategy::Nnz);

    let solver = TriangularSolver::new(&l, SolveDirection::Forward, &strict).unwrap();
    assert_eq!(solver.plan(8).strategy(), WarpStrategy::Nnz);
}

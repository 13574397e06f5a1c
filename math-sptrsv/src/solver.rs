//! Triangular solver facade
//!
//! [`TriangularSolver`] ties the pieces together for one matrix and one
//! direction: it checks the configuration, builds the dependency view and the
//! readiness counters once, and then runs any number of solves, each with its
//! own work assignment for the right-hand-side width at hand.

use crate::config::SolverConfig;
use crate::direction::SolveDirection;
use crate::error::{Result, SolveError};
use crate::kernel::{self, KernelContext};
use crate::parallel::is_parallel_available;
use crate::sparse::{TriangularMatrix, TriangularView};
use crate::strategy::{Assignment, MatrixStats, PartitionParams, WarpStrategy};
use crate::tracker::ReadinessTracker;
use crate::traits::Scalar;
use ndarray::{Array1, Array2, Axis};
use std::time::{Duration, Instant};

/// Summary of one completed solve
#[derive(Debug, Clone)]
pub struct SolveStats {
    /// Concrete strategy used (never `Auto`)
    pub strategy: WarpStrategy,
    /// Execution groups that ran
    pub groups: usize,
    /// Work items dealt to the groups
    pub work_items: usize,
    /// Number of right-hand-side columns
    pub rhs_width: usize,
    /// Wall time of the kernel
    pub elapsed: Duration,
    /// Scalar writes per row when `track_writes` is on
    pub writes_per_row: Option<Vec<usize>>,
}

/// Reusable sparse triangular solver for one matrix and direction
#[derive(Debug)]
pub struct TriangularSolver<'a, T: Scalar> {
    view: TriangularView<'a, T>,
    direction: SolveDirection,
    config: SolverConfig,
    tracker: ReadinessTracker,
}

impl<'a, T: Scalar> TriangularSolver<'a, T> {
    /// Prepare a solver
    ///
    /// Fails before any work starts when the configuration is invalid or the
    /// matrix triangle does not match the direction (forward needs lower,
    /// backward needs upper).
    pub fn new(
        matrix: &'a TriangularMatrix<T>,
        direction: SolveDirection,
        config: &SolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        direction.check_triangle(matrix.triangle())?;

        let view = TriangularView::new(matrix);
        let tracker = ReadinessTracker::initialize(&view, direction);

        log::debug!(
            "sptrsv setup: n={} nnz={} {:?} {} precision, {} rows ready at start, parallel preprocessing: {}",
            view.n(),
            view.nnz(),
            direction,
            T::PRECISION,
            tracker.initially_ready(),
            is_parallel_available()
        );

        Ok(Self {
            view,
            direction,
            config: config.clone(),
            tracker,
        })
    }

    /// Substitution direction
    pub fn direction(&self) -> SolveDirection {
        self.direction
    }

    /// Active configuration
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Dependency view of the matrix
    pub fn view(&self) -> &TriangularView<'a, T> {
        &self.view
    }

    /// Readiness counters of the last solve
    pub fn tracker(&self) -> &ReadinessTracker {
        &self.tracker
    }

    /// Work assignment a solve with `rhs_width` right-hand sides would use
    pub fn plan(&self, rhs_width: usize) -> Assignment {
        let stats = MatrixStats::from_view(&self.view, rhs_width);
        let params = PartitionParams {
            groups: self.config.max_groups(),
            group_size: self.config.group_size,
            auto_rhs_ratio: self.config.auto_rhs_ratio,
        };
        self.config
            .strategy
            .partition(&stats, self.direction, &params)
    }

    /// Overwrite `rhs` (`n × k`) with the solution
    ///
    /// On [`SolveError::SingularPivot`] the buffer holds the best-effort
    /// solution: singular rows and everything depending on them are NaN.
    pub fn solve_in_place(&mut self, rhs: &mut Array2<T>) -> Result<SolveStats> {
        let n = self.view.n();
        if rhs.nrows() != n {
            return Err(SolveError::DimensionMismatch {
                expected: n,
                got: rhs.nrows(),
            });
        }
        let k = rhs.ncols();
        if k == 0 {
            return Err(SolveError::InvalidConfiguration(
                "right-hand side has no columns".into(),
            ));
        }

        let assignment = self.plan(k);
        debug_assert!(assignment.covers_exactly_once(n, k));
        debug_assert!(assignment.is_traversal_ordered(self.direction, n));

        self.tracker.reset();
        let ctx = KernelContext {
            view: &self.view,
            tracker: &self.tracker,
            assignment: &assignment,
            pivot_tolerance: T::from_f64_lossy(self.config.pivot_tolerance),
            spin_limit: self.config.spin_limit,
            track_writes: self.config.track_writes,
        };

        let start = Instant::now();
        let outcome = if rhs.is_standard_layout() {
            let data = rhs
                .as_slice_mut()
                .expect("standard layout array should be contiguous");
            kernel::run(&ctx, data, k)?
        } else {
            let mut contiguous = rhs.as_standard_layout().into_owned();
            let data = contiguous
                .as_slice_mut()
                .expect("standard layout array should be contiguous");
            let outcome = kernel::run(&ctx, data, k)?;
            rhs.assign(&contiguous);
            outcome
        };
        let elapsed = start.elapsed();

        if let Some(row) = outcome
            .singular_rows
            .iter()
            .copied()
            .min_by_key(|&row| self.direction.position_of(row, n))
        {
            let count = outcome.singular_rows.len();
            log::warn!("sptrsv: {count} singular pivot(s), first at row {row}");
            return Err(SolveError::SingularPivot { row, count });
        }

        let stats = SolveStats {
            strategy: assignment.strategy(),
            groups: assignment.num_groups(),
            work_items: assignment.work_items(),
            rhs_width: k,
            elapsed,
            writes_per_row: outcome.writes_per_row,
        };

        if self.config.verbose {
            log::info!(
                "sptrsv: n={} nnz={} k={} {:?}/{:?} on {} groups, {:.3} ms",
                n,
                self.view.nnz(),
                k,
                self.direction,
                stats.strategy,
                stats.groups,
                elapsed.as_secs_f64() * 1000.0
            );
        }

        Ok(stats)
    }

    /// Solve into a separate output buffer of the same shape as `rhs`
    pub fn solve_into(&mut self, rhs: &Array2<T>, out: &mut Array2<T>) -> Result<SolveStats> {
        if out.dim() != rhs.dim() {
            return Err(SolveError::ShapeMismatch {
                expected: rhs.dim(),
                got: out.dim(),
            });
        }
        out.assign(rhs);
        self.solve_in_place(out)
    }

    /// Solve for a block of right-hand sides, returning a new buffer
    pub fn solve(&mut self, rhs: &Array2<T>) -> Result<Array2<T>> {
        let mut x = rhs.clone();
        self.solve_in_place(&mut x)?;
        Ok(x)
    }

    /// Solve for a single right-hand-side vector
    pub fn solve_vector(&mut self, b: &Array1<T>) -> Result<Array1<T>> {
        let mut x = b.clone().insert_axis(Axis(1));
        self.solve_in_place(&mut x)?;
        Ok(x.remove_axis(Axis(1)))
    }
}

/// One-shot solve of `matrix · X = rhs`, overwriting `rhs` with `X`
pub fn sptrsv<T: Scalar>(
    matrix: &TriangularMatrix<T>,
    direction: SolveDirection,
    rhs: &mut Array2<T>,
    config: &SolverConfig,
) -> Result<SolveStats> {
    TriangularSolver::new(matrix, direction, config)?.solve_in_place(rhs)
}

//! Solver configuration

use crate::error::{Result, SolveError};
use crate::parallel::available_units;
use crate::strategy::WarpStrategy;

/// Lanes per execution group on the GPU the algorithm was designed for
pub const WARP_SIZE: usize = 32;
/// Warps scheduled per GPU thread block, kept for reference
pub const GPU_WARPS_PER_BLOCK: usize = 16;
/// Warmup solves discarded by the benchmark harness
pub const BENCH_WARMUP: usize = 1;
/// Timed solves in the benchmark harness
pub const BENCH_REPEAT: usize = 100;
/// Upper bound on concurrent execution groups (OS threads) of one solve
pub const MAX_EXECUTION_GROUPS: usize = 1024;

/// Triangular solver configuration
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Work assignment policy
    pub strategy: WarpStrategy,
    /// Right-hand-side lanes handled per work item under the RHS policy
    pub group_size: usize,
    /// Execution groups per compute unit
    pub groups_per_unit: usize,
    /// Compute units to use (`None` = available hardware threads, capped at
    /// [`MAX_EXECUTION_GROUPS`])
    pub compute_units: Option<usize>,
    /// AUTO picks RHS when `k >= auto_rhs_ratio * nnz / n` and `k > 1`
    pub auto_rhs_ratio: f64,
    /// Pivots with magnitude at or below this are singular
    pub pivot_tolerance: f64,
    /// Busy-wait polls before a waiting group starts yielding its time slice
    pub spin_limit: u32,
    /// Count writes per row (for checking the write-once invariant)
    pub track_writes: bool,
    /// Log a summary of every solve at info level
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            strategy: WarpStrategy::Auto,
            group_size: WARP_SIZE,
            groups_per_unit: 1,
            compute_units: None,
            auto_rhs_ratio: 1.0,
            pivot_tolerance: 0.0,
            spin_limit: 1 << 10,
            track_writes: false,
            verbose: false,
        }
    }
}

impl SolverConfig {
    /// Configuration with a given strategy and defaults elsewhere
    pub fn with_strategy(strategy: WarpStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Check that every field can be honored
    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(SolveError::InvalidConfiguration(
                "group_size must be at least 1".into(),
            ));
        }
        if self.groups_per_unit == 0 {
            return Err(SolveError::InvalidConfiguration(
                "groups_per_unit must be at least 1".into(),
            ));
        }
        if self.compute_units == Some(0) {
            return Err(SolveError::InvalidConfiguration(
                "compute_units must be at least 1".into(),
            ));
        }
        match self.units().checked_mul(self.groups_per_unit) {
            Some(groups) if groups <= MAX_EXECUTION_GROUPS => {}
            _ => {
                return Err(SolveError::InvalidConfiguration(format!(
                    "compute_units x groups_per_unit must not exceed {MAX_EXECUTION_GROUPS}, got {} x {}",
                    self.units(),
                    self.groups_per_unit
                )));
            }
        }
        if !self.auto_rhs_ratio.is_finite() || self.auto_rhs_ratio < 0.0 {
            return Err(SolveError::InvalidConfiguration(format!(
                "auto_rhs_ratio must be a finite non-negative number, got {}",
                self.auto_rhs_ratio
            )));
        }
        if !self.pivot_tolerance.is_finite() || self.pivot_tolerance < 0.0 {
            return Err(SolveError::InvalidConfiguration(format!(
                "pivot_tolerance must be a finite non-negative number, got {}",
                self.pivot_tolerance
            )));
        }
        Ok(())
    }

    fn units(&self) -> usize {
        self.compute_units
            .unwrap_or_else(|| available_units().min(MAX_EXECUTION_GROUPS))
    }

    /// Upper bound on concurrent execution groups
    ///
    /// Saturates instead of overflowing; [`validate`](Self::validate) rejects
    /// anything above [`MAX_EXECUTION_GROUPS`].
    pub fn max_groups(&self) -> usize {
        self.units().saturating_mul(self.groups_per_unit)
    }
}

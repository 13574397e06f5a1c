//! Warp assignment strategies
//!
//! A strategy maps execution groups to work items. A work item is one row
//! together with a range of right-hand-side lanes. Every `(row, lane)` pair is
//! covered by exactly one item, and every group lists its items in traversal
//! order. The second property is what keeps busy-waiting groups from
//! deadlocking: the earliest unsolved item always has its inputs ready and
//! sits at the head of its group's queue.
//!
//! Three policies exist and no more are expected, so they are a closed enum:
//! - [`WarpStrategy::Nnz`]: whole rows, balanced by non-zero count
//! - [`WarpStrategy::Rhs`]: rows split into lane blocks of `group_size`
//!   right-hand-side columns, dealt round-robin
//! - [`WarpStrategy::Auto`]: picks one of the two from `(n, nnz, k)`

use crate::direction::SolveDirection;
use crate::error::{Result, SolveError};
use crate::parallel::parallel_map_indexed;
use crate::sparse::TriangularView;
use crate::traits::Scalar;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::ops::Range;

/// Strategy code for non-zero balanced assignment
pub const OPT_WARP_NNZ: i32 = 1;
/// Strategy code for right-hand-side split assignment
pub const OPT_WARP_RHS: i32 = 2;
/// Strategy code for automatic selection
pub const OPT_WARP_AUTO: i32 = 3;

/// Work assignment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WarpStrategy {
    /// Balance whole rows across groups by non-zero count
    Nnz,
    /// Split each row's right-hand-side lanes into blocks handled by different groups
    Rhs,
    /// Choose between `Nnz` and `Rhs` from the problem shape
    #[default]
    Auto,
}

impl WarpStrategy {
    /// Parse a numeric strategy code
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            OPT_WARP_NNZ => Ok(WarpStrategy::Nnz),
            OPT_WARP_RHS => Ok(WarpStrategy::Rhs),
            OPT_WARP_AUTO => Ok(WarpStrategy::Auto),
            other => Err(SolveError::InvalidConfiguration(format!(
                "unknown warp strategy code {other}"
            ))),
        }
    }

    /// Numeric code of this strategy
    pub fn code(self) -> i32 {
        match self {
            WarpStrategy::Nnz => OPT_WARP_NNZ,
            WarpStrategy::Rhs => OPT_WARP_RHS,
            WarpStrategy::Auto => OPT_WARP_AUTO,
        }
    }

    /// Replace `Auto` by the concrete policy for this problem shape
    ///
    /// `Rhs` is chosen when there is more than one right-hand side and
    /// `k >= auto_rhs_ratio * nnz / n`, i.e. when the per-row work is wider
    /// across right-hand sides than along the row. Deterministic in `(n, nnz, k)`.
    pub fn resolve(self, stats: &MatrixStats, auto_rhs_ratio: f64) -> WarpStrategy {
        match self {
            WarpStrategy::Auto => {
                let k = stats.rhs_width;
                if k > 1 && k as f64 >= auto_rhs_ratio * stats.avg_row_nnz() {
                    WarpStrategy::Rhs
                } else {
                    WarpStrategy::Nnz
                }
            }
            concrete => concrete,
        }
    }

    /// Build the assignment for this problem
    pub fn partition(
        self,
        stats: &MatrixStats,
        direction: SolveDirection,
        params: &PartitionParams,
    ) -> Assignment {
        let resolved = self.resolve(stats, params.auto_rhs_ratio);
        let assignment = match resolved {
            WarpStrategy::Rhs => partition_by_rhs(stats, direction, params),
            _ => partition_by_nnz(stats, direction, params),
        };
        log::debug!(
            "{:?} resolved to {:?}: {} groups, {} work items, {} lane blocks",
            self,
            resolved,
            assignment.num_groups(),
            assignment.work_items(),
            assignment.lane_blocks()
        );
        assignment
    }
}

/// Shape of one solve: what the strategies look at
#[derive(Debug, Clone)]
pub struct MatrixStats {
    /// Matrix dimension
    pub n: usize,
    /// Stored entries
    pub nnz: usize,
    /// Number of right-hand-side columns
    pub rhs_width: usize,
    /// Non-zeros per row, diagonal included
    pub row_nnz: Vec<usize>,
}

impl MatrixStats {
    /// Gather statistics from a view
    pub fn from_view<T: Scalar>(view: &TriangularView<'_, T>, rhs_width: usize) -> Self {
        let row_nnz = parallel_map_indexed(view.n(), |row| view.row_nnz(row));
        Self {
            n: view.n(),
            nnz: view.nnz(),
            rhs_width,
            row_nnz,
        }
    }

    /// Average non-zeros per row
    pub fn avg_row_nnz(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.nnz as f64 / self.n as f64
        }
    }
}

/// Tunables for building an assignment
#[derive(Debug, Clone, Copy)]
pub struct PartitionParams {
    /// Upper bound on concurrent execution groups
    pub groups: usize,
    /// Right-hand-side lanes per work item under `Rhs`
    pub group_size: usize,
    /// Threshold used when resolving `Auto`
    pub auto_rhs_ratio: f64,
}

/// One row and the right-hand-side lanes a group solves for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Row id
    pub row: usize,
    /// Right-hand-side columns
    pub lanes: Range<usize>,
}

/// Group → work item mapping, read-only while the kernel runs
#[derive(Debug, Clone)]
pub struct Assignment {
    strategy: WarpStrategy,
    groups: Vec<Vec<WorkItem>>,
    lane_blocks: usize,
}

impl Assignment {
    /// The concrete strategy that produced this assignment
    pub fn strategy(&self) -> WarpStrategy {
        self.strategy
    }

    /// Work items per group, each in traversal order
    pub fn groups(&self) -> &[Vec<WorkItem>] {
        &self.groups
    }

    /// Number of execution groups
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Total number of work items
    pub fn work_items(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// How many items each row is split into
    pub fn lane_blocks(&self) -> usize {
        self.lane_blocks
    }

    /// Check that every `(row, lane)` of an `n × k` problem is covered exactly once
    pub fn covers_exactly_once(&self, n: usize, k: usize) -> bool {
        let mut hits = vec![0u32; n * k];
        for item in self.groups.iter().flatten() {
            if item.row >= n || item.lanes.end > k {
                return false;
            }
            for lane in item.lanes.clone() {
                hits[item.row * k + lane] += 1;
            }
        }
        hits.iter().all(|&h| h == 1)
    }

    /// Check that each group lists its items in traversal order
    pub fn is_traversal_ordered(&self, direction: SolveDirection, n: usize) -> bool {
        self.groups.iter().all(|items| {
            items.windows(2).all(|w| {
                let a = (direction.position_of(w[0].row, n), w[0].lanes.start);
                let b = (direction.position_of(w[1].row, n), w[1].lanes.start);
                a < b
            })
        })
    }
}

fn group_count(requested: usize, items: usize) -> usize {
    requested.max(1).min(items)
}

/// Greedy balance: each row, in traversal order, goes to the least loaded group
fn partition_by_nnz(
    stats: &MatrixStats,
    direction: SolveDirection,
    params: &PartitionParams,
) -> Assignment {
    let n = stats.n;
    let num_groups = group_count(params.groups, n);
    let mut groups: Vec<Vec<WorkItem>> = vec![Vec::new(); num_groups];

    // ties go to the lowest group id
    let mut heap: BinaryHeap<Reverse<(usize, usize)>> =
        (0..num_groups).map(|g| Reverse((0, g))).collect();

    for row in direction.traversal(n) {
        if let Some(Reverse((load, group))) = heap.pop() {
            groups[group].push(WorkItem {
                row,
                lanes: 0..stats.rhs_width,
            });
            heap.push(Reverse((load + stats.row_nnz[row] * stats.rhs_width, group)));
        }
    }

    Assignment {
        strategy: WarpStrategy::Nnz,
        groups,
        lane_blocks: 1,
    }
}

/// Round-robin over (row, lane block) tiles in traversal order
fn partition_by_rhs(
    stats: &MatrixStats,
    direction: SolveDirection,
    params: &PartitionParams,
) -> Assignment {
    let n = stats.n;
    let k = stats.rhs_width;
    let block = params.group_size.max(1);
    let lane_blocks = k.div_ceil(block).max(1);
    let num_groups = group_count(params.groups, n * lane_blocks);
    let mut groups: Vec<Vec<WorkItem>> = vec![Vec::new(); num_groups];

    let mut tile = 0usize;
    for row in direction.traversal(n) {
        for b in 0..lane_blocks {
            let lanes = (b * block)..((b + 1) * block).min(k);
            groups[tile % num_groups].push(WorkItem { row, lanes });
            tile += 1;
        }
    }

    Assignment {
        strategy: WarpStrategy::Rhs,
        groups,
        lane_blocks,
    }
}

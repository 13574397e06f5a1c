//! Readiness tracking without level schedules
//!
//! Every row owns an atomic counter holding the number of rows it still waits
//! for. A worker that finishes a row decrements the counters of all rows that
//! read it; the worker owning a row spins until its counter reads zero.
//!
//! Ordering: a solved value is written before the decrement (`Release`) and
//! read after the zero observation (`Acquire`), so a dependent never sees a
//! stale value. The decrements on one counter form a release sequence, so the
//! zero observation synchronizes with every decrement, not only the last.

use crate::direction::SolveDirection;
use crate::sparse::TriangularView;
use crate::traits::Scalar;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Per-row dependency counters for one solve
#[derive(Debug)]
pub struct ReadinessTracker {
    counters: Vec<AtomicUsize>,
    initial: Vec<usize>,
    released: AtomicUsize,
    aborted: AtomicBool,
}

impl ReadinessTracker {
    /// Compute the in-degree of every row in O(nnz)
    ///
    /// Columns are scanned in traversal order and each off-diagonal entry
    /// increments the counter of the row that reads it.
    pub fn initialize<T: Scalar>(view: &TriangularView<'_, T>, direction: SolveDirection) -> Self {
        let n = view.n();
        let mut initial = vec![0usize; n];

        for col in direction.traversal(n) {
            for &row in view.dependents(col) {
                debug_assert!(
                    direction.position_of(row, n) > direction.position_of(col, n),
                    "row {row} reads column {col} which is solved later"
                );
                initial[row] += 1;
            }
        }

        let counters = initial.iter().map(|&c| AtomicUsize::new(c)).collect();
        Self {
            counters,
            initial,
            released: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
        }
    }

    /// Restore the initial counts before another solve
    pub fn reset(&mut self) {
        for (counter, &count) in self.counters.iter_mut().zip(&self.initial) {
            *counter.get_mut() = count;
        }
        *self.released.get_mut() = 0;
        *self.aborted.get_mut() = false;
    }

    /// Number of tracked rows
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no rows are tracked
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Dependency count of `row` before any work
    pub fn initial_count(&self, row: usize) -> usize {
        self.initial[row]
    }

    /// Number of rows that need no other row
    pub fn initially_ready(&self) -> usize {
        self.initial.iter().filter(|&&c| c == 0).count()
    }

    /// Outstanding dependencies of `row`
    #[inline]
    pub fn remaining(&self, row: usize) -> usize {
        self.counters[row].load(Ordering::Acquire)
    }

    /// Whether every dependency of `row` has been resolved
    #[inline]
    pub fn is_ready(&self, row: usize) -> bool {
        self.remaining(row) == 0
    }

    /// Busy-wait until `row` is ready
    ///
    /// Spins with [`std::hint::spin_loop`] for `spin_limit` polls, then yields
    /// the time slice between polls. Never parks. Returns `false` once the
    /// solve is aborted, even if the row is ready.
    pub fn wait_ready(&self, row: usize, spin_limit: u32) -> bool {
        let mut polls: u32 = 0;
        loop {
            if self.is_aborted() {
                return false;
            }
            if self.is_ready(row) {
                return true;
            }
            if polls < spin_limit {
                polls += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Release every waiter without resolving its row
    ///
    /// Used when a group cannot run (failed spawn or panic); rows it owns
    /// would otherwise never be signalled.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Whether [`abort`](Self::abort) was called since the last reset
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Mark `col` as solved and release the rows that read it
    ///
    /// Must be called after the value of `col` is fully written.
    pub fn signal_resolved<T: Scalar>(&self, view: &TriangularView<'_, T>, col: usize) {
        for &row in view.dependents(col) {
            let previous = self.counters[row].fetch_sub(1, Ordering::Release);
            debug_assert!(previous > 0, "counter of row {row} decremented below zero");
            if previous == 1 {
                self.released.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Counters brought to zero by a decrement so far
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    /// Whether every counter reads zero
    pub fn all_resolved(&self) -> bool {
        self.counters
            .iter()
            .all(|c| c.load(Ordering::Acquire) == 0)
    }
}

//! Synchronization-free substitution kernel
//!
//! Each execution group is a dedicated OS thread. Spin-waiting inside a
//! work-stealing task would stall the pool, so groups are scoped threads
//! that all run for the whole solve.
//!
//! Per work item a group goes through:
//! 1. **Waiting**: spin on the row's readiness counter
//! 2. **Solving**: `x[row] = (b[row] - Σ L[row, col] · x[col]) / L[row, row]` per lane
//! 3. **Resolved**: the lanes are written to the shared solution buffer
//! 4. **Terminal**: the readiness of dependent rows is signalled
//!
//! Step 4 always follows step 3 in program order and uses `Release`, so a
//! dependent's `Acquire` observation of its counter sees the written values.
//!
//! A group that cannot start or panics aborts the tracker, which releases
//! every waiting group; the solve then ends with an error instead of spinning
//! on rows nobody will resolve.

use crate::error::{Result, SolveError};
use crate::sparse::TriangularView;
use crate::strategy::{Assignment, WorkItem};
use crate::tracker::ReadinessTracker;
use crate::traits::Scalar;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Row-major `n × k` buffer shared by all groups during one solve
///
/// Holds the right-hand side on entry and the solution on exit.
struct SharedSolution<'a, T> {
    ptr: *mut T,
    len: usize,
    width: usize,
    _borrow: PhantomData<&'a mut [T]>,
}

// Safe: every (row, lane) slot has exactly one writer (the group whose work
// item covers it), and other groups only read a slot after observing the
// readiness signal that follows the write (Release/Acquire).
unsafe impl<T: Send> Send for SharedSolution<'_, T> {}
unsafe impl<T: Send> Sync for SharedSolution<'_, T> {}

impl<'a, T: Copy> SharedSolution<'a, T> {
    fn new(data: &'a mut [T], width: usize) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
            width,
            _borrow: PhantomData,
        }
    }

    #[inline]
    fn offset(&self, row: usize, lane: usize) -> usize {
        let offset = row * self.width + lane;
        debug_assert!(offset < self.len, "slot ({row}, {lane}) out of bounds");
        offset
    }

    /// # Safety
    /// The slot must not be written concurrently: it is either owned by the
    /// calling group or its row has been signalled as resolved.
    #[inline]
    unsafe fn get(&self, row: usize, lane: usize) -> T {
        unsafe { *self.ptr.add(self.offset(row, lane)) }
    }

    /// # Safety
    /// The calling group must own the slot through its work item.
    #[inline]
    unsafe fn set(&self, row: usize, lane: usize, value: T) {
        unsafe { *self.ptr.add(self.offset(row, lane)) = value }
    }
}

/// Everything a group needs besides the solution buffer
pub(crate) struct KernelContext<'s, 'v, T: Scalar> {
    pub view: &'s TriangularView<'v, T>,
    pub tracker: &'s ReadinessTracker,
    pub assignment: &'s Assignment,
    pub pivot_tolerance: T,
    pub spin_limit: u32,
    pub track_writes: bool,
}

/// What a kernel run reports back
#[derive(Debug, Default)]
pub(crate) struct KernelOutcome {
    /// Rows with a singular pivot, in no particular order
    pub singular_rows: Vec<usize>,
    /// Scalar writes per row, when tracking is on
    pub writes_per_row: Option<Vec<usize>>,
}

/// Per-solve shared state beyond the readiness counters
struct SolveState {
    /// Lane blocks of each row still being written (only when rows are split)
    pending_blocks: Vec<AtomicUsize>,
    writes: Vec<AtomicUsize>,
}

/// Run every group of `ctx.assignment` over `data` (row-major, `n × width`)
///
/// `data` holds the right-hand side on entry and the solution on return.
/// Fails with [`SolveError::ThreadSpawn`] when a group thread cannot be
/// started; the buffer is then only partially solved.
pub(crate) fn run<T: Scalar>(
    ctx: &KernelContext<'_, '_, T>,
    data: &mut [T],
    width: usize,
) -> Result<KernelOutcome> {
    let n = ctx.view.n();
    assert_eq!(data.len(), n * width, "solution buffer does not match n x width");

    let lane_blocks = ctx.assignment.lane_blocks();
    let state = SolveState {
        pending_blocks: if lane_blocks > 1 {
            (0..n).map(|_| AtomicUsize::new(lane_blocks)).collect()
        } else {
            Vec::new()
        },
        writes: if ctx.track_writes {
            (0..n).map(|_| AtomicUsize::new(0)).collect()
        } else {
            Vec::new()
        },
    };
    let solution = SharedSolution::new(data, width);

    let groups = ctx.assignment.groups();
    let mut spawn_error = None;
    let singular_rows = match groups {
        [] => Vec::new(),
        // a single group solves in traversal order and never waits
        [items] => solve_group(ctx, &state, &solution, items),
        _ => std::thread::scope(|s| {
            let mut handles = Vec::with_capacity(groups.len());
            for (group, items) in groups.iter().enumerate() {
                let state = &state;
                let solution = &solution;
                let spawned = std::thread::Builder::new()
                    .name(format!("sptrsv-group-{group}"))
                    .spawn_scoped(s, move || solve_group(ctx, state, solution, items));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        log::error!("sptrsv: failed to start group {group}: {err}");
                        ctx.tracker.abort();
                        spawn_error = Some(err);
                        break;
                    }
                }
            }

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        }),
    };

    if let Some(err) = spawn_error {
        return Err(SolveError::ThreadSpawn(err));
    }

    let writes_per_row = ctx.track_writes.then(|| {
        state
            .writes
            .into_iter()
            .map(AtomicUsize::into_inner)
            .collect()
    });

    Ok(KernelOutcome {
        singular_rows,
        writes_per_row,
    })
}

/// Aborts the solve when the owning group unwinds
struct AbortOnUnwind<'a>(&'a ReadinessTracker);

impl Drop for AbortOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

/// Solve the work items of one group, returning the singular rows it met
fn solve_group<T: Scalar>(
    ctx: &KernelContext<'_, '_, T>,
    state: &SolveState,
    solution: &SharedSolution<'_, T>,
    items: &[WorkItem],
) -> Vec<usize> {
    let view = ctx.view;
    let mut singular_rows = Vec::new();
    let _guard = AbortOnUnwind(ctx.tracker);

    for item in items {
        let row = item.row;
        if !ctx.tracker.wait_ready(row, ctx.spin_limit) {
            break;
        }

        let pivot = view.pivot(row);
        let singular = pivot.is_singular_pivot(ctx.pivot_tolerance);

        for lane in item.lanes.clone() {
            let value = if singular {
                T::nan()
            } else {
                // Safe: (row, lane) is owned by this item; every col read here
                // has been signalled, which wait_ready observed with Acquire.
                let mut sum = unsafe { solution.get(row, lane) };
                for (col, coeff) in view.dependencies(row) {
                    sum -= coeff * unsafe { solution.get(col, lane) };
                }
                sum / pivot
            };
            // Safe: (row, lane) is owned by this item
            unsafe { solution.set(row, lane, value) };
        }

        if !state.writes.is_empty() {
            state.writes[row].fetch_add(item.lanes.len(), Ordering::Relaxed);
        }
        if singular && item.lanes.start == 0 {
            singular_rows.push(row);
        }

        // the last lane block of a row to finish publishes the whole row
        let publish = state.pending_blocks.is_empty()
            || state.pending_blocks[row].fetch_sub(1, Ordering::AcqRel) == 1;
        if publish {
            ctx.tracker.signal_resolved(view, row);
        }
    }

    singular_rows
}

//! Process-wide tallies of the work done by a selection.
//!
//! Kernel evaluations dominate the cost of scoring candidates, rank-one
//! updates the cost of growing the Gram matrix. Both are bumped from the
//! rayon workers scoring a step, and read once the selection is over.

use std::sync::atomic::{AtomicU64, Ordering};

static KERNEL_EVALUATIONS: AtomicU64 = AtomicU64::new(0);
static RANK_ONE_UPDATES: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn inc_kernel_count() {
    KERNEL_EVALUATIONS.fetch_add(1, Ordering::Relaxed);
}

/// Counts rank-one updates of the running inverse.
#[inline]
pub fn inc_update_count() {
    RANK_ONE_UPDATES.fetch_add(1, Ordering::Relaxed);
}

/// Work done since the last [`take`] or [`reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkCounts {
    pub kernel_evaluations: u64,
    pub rank_one_updates: u64,
}

impl From<WorkCounts> for (u64, u64) {
    fn from(counts: WorkCounts) -> Self {
        (counts.kernel_evaluations, counts.rank_one_updates)
    }
}

/// Reads both counters and sets them to zero.
///
/// Counts are global to the process: selections running concurrently
/// share them.
pub fn take() -> WorkCounts {
    WorkCounts {
        kernel_evaluations: KERNEL_EVALUATIONS.swap(0, Ordering::SeqCst),
        rank_one_updates: RANK_ONE_UPDATES.swap(0, Ordering::SeqCst),
    }
}

/// Discards the work counted so far.
pub fn reset() {
    take();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn take_reads_the_work_done() {
        inc_kernel_count();
        inc_update_count();
        inc_update_count();
        // Other tests of this crate only ever add to the counters
        let counts = take();
        assert!(counts.kernel_evaluations >= 1);
        assert!(counts.rank_one_updates >= 2);
        let (kernel, updates): (u64, u64) = counts.into();
        assert_eq!(kernel, counts.kernel_evaluations);
        assert_eq!(updates, counts.rank_one_updates);
    }
}

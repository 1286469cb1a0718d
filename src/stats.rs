//! Statistics Module - Per-Region Allocation Counters
//!
//! One `Stats` block lives inside every façade's control block and is
//! updated by whichever engine is active. All fields are plain counters;
//! there is nothing to synchronize since the core is single-threaded.

/// Lifetime statistics for one region managed by a [`crate::Facade`] or
/// [`crate::OwnedFacade`].
///
/// Returned by `get_stats` as a snapshot copy; see the invariants in the
/// crate's module docs for how the fields relate to one another.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_allocations: u64,
    pub total_frees: u64,
    pub failed_allocations: u64,
    pub current_allocated: u64,
    pub peak_allocated: u64,
    pub current_requested: u64,
    pub peak_requested: u64,
    pub heap_size: u64,
}

impl Stats {
    pub(crate) fn record_alloc(&mut self, committed: u64, requested: u64) {
        self.total_allocations += 1;
        self.current_allocated += committed;
        self.peak_allocated = self.peak_allocated.max(self.current_allocated);
        self.current_requested += requested;
        self.peak_requested = self.peak_requested.max(self.current_requested);
    }

    pub(crate) fn record_free(&mut self, committed: u64, requested: u64) {
        self.total_frees += 1;
        self.current_allocated -= committed;
        self.current_requested -= requested;
    }

    pub(crate) fn record_failed(&mut self) {
        self.failed_allocations += 1;
    }

    /// Zeros every counter except `heap_size`.
    pub(crate) fn reset(&mut self) {
        let heap_size = self.heap_size;
        *self = Stats::default();
        self.heap_size = heap_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_round_trip_restores_current_counters() {
        let mut stats = Stats {
            heap_size: 1024,
            ..Default::default()
        };
        stats.record_alloc(32, 10);
        assert_eq!(stats.current_allocated, 32);
        assert_eq!(stats.current_requested, 10);
        stats.record_free(32, 10);
        assert_eq!(stats.current_allocated, 0);
        assert_eq!(stats.current_requested, 0);
        assert_eq!(stats.total_allocations, 1);
        assert_eq!(stats.total_frees, 1);
    }

    #[test]
    fn peaks_never_decrease() {
        let mut stats = Stats::default();
        stats.record_alloc(100, 90);
        stats.record_free(100, 90);
        stats.record_alloc(10, 5);
        assert_eq!(stats.peak_allocated, 100);
        assert_eq!(stats.peak_requested, 90);
        assert!(stats.current_allocated <= stats.peak_allocated);
        assert!(stats.current_requested <= stats.peak_requested);
    }

    #[test]
    fn reset_clears_everything_but_heap_size() {
        let mut stats = Stats {
            heap_size: 4096,
            ..Default::default()
        };
        stats.record_alloc(64, 50);
        stats.reset();
        assert_eq!(stats.heap_size, 4096);
        assert_eq!(stats.total_allocations, 0);
        assert_eq!(stats.current_allocated, 0);
        assert_eq!(stats.peak_allocated, 0);
    }
}

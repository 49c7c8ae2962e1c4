//! High-water mark of a query's charged memory, read into
//! `peak_memory_bytes` of the query report.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_bytes: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the monitor after every successful charge.
    pub fn record_used(&self, used_bytes: usize) {
        let previous = self.peak_bytes.fetch_max(used_bytes, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        if used_bytes > previous {
            tracing::trace!(used_bytes, "new query memory peak");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = previous;
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Acquire)
    }
}

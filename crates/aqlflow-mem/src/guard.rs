//! ResourceMonitor + RAII reservation.
//!
//! Holders must *always* reserve before keeping memory alive. Dropping the
//! reservation returns the bytes to the monitor (panic-safe).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aqlflow_core::budget::{BudgetGuard, MemoryBudget};

use crate::error::{Error, Result};
use crate::tracking::PeakTracker;

/// Shared inner state for the monitor.
struct MonitorInner {
    /// 0 means unlimited.
    limit: usize,
    used: AtomicUsize,
    peak: PeakTracker,
}

impl MonitorInner {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
            peak: PeakTracker::new(),
        }
    }

    fn try_acquire(&self, bytes: usize) -> bool {
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = cur.saturating_add(bytes);
            if self.limit != 0 && next > self.limit {
                return false;
            }
            if self
                .used
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.peak.record_used(next);
                return true;
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Per-query byte accounting with a hard ceiling.
///
/// Cloning is cheap and every clone shares the same counter, so pipeline
/// instances running on different threads account against one ceiling.
#[derive(Clone)]
pub struct ResourceMonitor {
    inner: Arc<MonitorInner>,
}

impl ResourceMonitor {
    /// `limit_bytes == 0` disables the ceiling.
    pub fn new(limit_bytes: usize) -> Self {
        Self {
            inner: Arc::new(MonitorInner::new(limit_bytes)),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Reserve `bytes`, failing with `BudgetExceeded` if the ceiling would be crossed.
    pub fn reserve(&self, bytes: usize, tag: &'static str) -> Result<Reservation> {
        self.try_acquire(bytes, tag)
            .ok_or_else(|| Error::BudgetExceeded {
                tag,
                requested: bytes,
                limit: self.inner.limit,
                used: self.used_bytes(),
            })
    }

    /// Current usage (advisory).
    pub fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }

    pub fn limit_bytes(&self) -> usize {
        self.inner.limit
    }

    /// Highest usage observed so far.
    pub fn peak_bytes(&self) -> usize {
        self.inner.peak.peak()
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// RAII guard that accounts for a number of bytes.
/// Dropping it returns bytes to the monitor.
pub struct Reservation {
    inner: Arc<MonitorInner>,
    bytes: usize,
    tag: &'static str,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.inner.release(self.bytes);
            // NOTE: do not log here to keep drop path fast.
            self.bytes = 0;
        }
    }
}

impl BudgetGuard for Reservation {
    fn bytes(&self) -> usize {
        self.bytes
    }
    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl Reservation {
    /// Grow this reservation by `delta` bytes.
    pub fn grow(&mut self, delta: usize) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        if self.inner.try_acquire(delta) {
            self.bytes += delta;
            Ok(())
        } else {
            Err(Error::BudgetExceeded {
                tag: self.tag,
                requested: delta,
                limit: self.inner.limit,
                used: self.inner.used.load(Ordering::Relaxed),
            })
        }
    }

    /// Give back up to `delta` bytes; shrinking always succeeds.
    pub fn shrink(&mut self, delta: usize) {
        let delta = delta.min(self.bytes);
        if delta > 0 {
            self.inner.release(delta);
            self.bytes -= delta;
        }
    }

    /// Resize to exactly `new_bytes`.
    pub fn try_resize(&mut self, new_bytes: usize) -> Result<()> {
        if new_bytes >= self.bytes {
            self.grow(new_bytes - self.bytes)
        } else {
            self.shrink(self.bytes - new_bytes);
            Ok(())
        }
    }
}

impl MemoryBudget for ResourceMonitor {
    type Guard = Reservation;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard> {
        if bytes == 0 || self.inner.try_acquire(bytes) {
            Some(Reservation {
                inner: Arc::clone(&self.inner),
                bytes,
                tag,
            })
        } else {
            None
        }
    }

    fn capacity_bytes(&self) -> usize {
        self.inner.limit
    }

    fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }
}

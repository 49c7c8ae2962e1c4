//! Memory accounting seam between blocks, executors and the query monitor.
//!
//! Blocks and stateful executors (sort buffers, collect groups, subquery
//! results, traversal caches) only see these traits. `aqlflow-mem` provides
//! the `ResourceMonitor` that enforces the per-query ceiling.

/// Bytes charged to a query on behalf of one holder.
///
/// Dropping the guard returns its bytes to the query.
pub trait BudgetGuard: Send {
    /// Bytes currently charged.
    fn bytes(&self) -> usize;
    /// Holder name reported in `RESOURCE_LIMIT` errors.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A per-query memory ceiling.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Charge `bytes` to the query, or `None` if that would cross the ceiling.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    /// The ceiling in bytes.
    fn capacity_bytes(&self) -> usize;

    /// Bytes charged by all live guards of the query.
    fn used_bytes(&self) -> usize;
}

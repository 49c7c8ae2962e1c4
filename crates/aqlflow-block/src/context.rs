//! Mutable execution state threaded through one pipeline.

use std::sync::Arc;

use aqlflow_core::query::QueryContext;
use aqlflow_core::Result;
use aqlflow_mem::ResourceMonitor;

use crate::manager::BlockManager;

/// Block arena plus the shared query context.
///
/// Every `fetch`/`produce` call of a pipeline receives this by `&mut`.
pub struct ExecContext {
    pub blocks: BlockManager,
    pub query: Arc<QueryContext>,
}

impl ExecContext {
    /// A context with its own monitor sized from the query configuration.
    pub fn new(query: Arc<QueryContext>) -> Self {
        let monitor = ResourceMonitor::new(query.config().memory_limit_bytes);
        Self::with_monitor(query, monitor)
    }

    /// A context accounting against a monitor shared with other pipelines.
    pub fn with_monitor(query: Arc<QueryContext>, monitor: ResourceMonitor) -> Self {
        Self {
            blocks: BlockManager::new(monitor),
            query,
        }
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        self.blocks.monitor()
    }

    pub fn batch_size(&self) -> usize {
        self.query.config().batch_size
    }

    /// Fail with `Cancelled` once the query was killed.
    pub fn check_killed(&self) -> Result<()> {
        self.query.check_killed()
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(Arc::new(QueryContext::default()))
    }
}

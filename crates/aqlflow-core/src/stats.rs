//! Monotonic per-stage counters.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Rows pulled from upstream and inspected.
    pub rows_scanned: u64,
    /// Rows inspected but not passed on.
    pub rows_filtered: u64,
    /// Documents fetched from a storage collaborator.
    pub documents_looked_up: u64,
    /// Edges returned by graph expansion.
    pub edges_read: u64,
    /// Vertices reached by path enumeration.
    pub vertices_visited: u64,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for ExecutionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.rows_scanned += rhs.rows_scanned;
        self.rows_filtered += rhs.rows_filtered;
        self.documents_looked_up += rhs.documents_looked_up;
        self.edges_read += rhs.edges_read;
        self.vertices_visited += rhs.vertices_visited;
    }
}

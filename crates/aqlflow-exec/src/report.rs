//! Per-query report emitted once a pipeline finished.
//!
//! The plan hash only covers the stage names and their serialized
//! configuration, so two runs of the same plan hash identically regardless of
//! data, timing or counters.

use serde::Serialize;

use aqlflow_core::hash::{hash_serde, Hash256};
use aqlflow_core::query::{QueryId, Warning};
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::AqlValue;
use aqlflow_core::Result;
use aqlflow_operators::StageSummary;

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query_id: QueryId,

    /// Stable hash of every stage's name and configuration, upstream first.
    pub plan_hash: Hash256,

    /// Engine version string for provenance.
    pub engine_version: String,

    pub stages: Vec<StageSummary>,

    /// Rows handed out by the last stage, shadow rows included.
    pub rows_returned: u64,

    /// Sum of all stage counters.
    pub stats: ExecutionStats,

    pub peak_memory_bytes: usize,
    pub warnings: Vec<Warning>,
    /// Warnings registered, including those not kept.
    pub warnings_seen: usize,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl QueryReport {
    pub fn new(query_id: QueryId, stages: Vec<StageSummary>, started_ms: u64) -> Result<Self> {
        let plan: Vec<(&str, &AqlValue)> = stages.iter().map(|s| (s.name, &s.plan)).collect();
        let plan_hash = hash_serde(&plan)?;
        let mut stats = ExecutionStats::new();
        for stage in &stages {
            stats += stage.stats;
        }
        Ok(Self {
            query_id,
            plan_hash,
            engine_version: aqlflow_core::VERSION.to_string(),
            stages,
            rows_returned: 0,
            stats,
            peak_memory_bytes: 0,
            warnings: Vec::new(),
            warnings_seen: 0,
            started_ms,
            finished_ms: started_ms,
        })
    }

    pub fn finish(mut self, finished_ms: u64, rows_returned: u64, peak_memory_bytes: usize) -> Self {
        self.finished_ms = finished_ms;
        self.rows_returned = rows_returned;
        self.peak_memory_bytes = peak_memory_bytes;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<Warning>, warnings_seen: usize) -> Self {
        self.warnings = warnings;
        self.warnings_seen = warnings_seen;
        self
    }

    /// First stage with the given executor name.
    pub fn stage(&self, name: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqlflow_core::id::StageId;
    use serde_json::json;

    fn stage(id: u64, rows_scanned: u64) -> StageSummary {
        StageSummary {
            id: StageId::new(id),
            name: "filter",
            plan: json!({"condition": 0}),
            stats: ExecutionStats {
                rows_scanned,
                ..ExecutionStats::default()
            },
        }
    }

    #[test]
    fn plan_hash_ignores_counters_and_ids() {
        let qid = QueryId::generate();
        let a = QueryReport::new(qid, vec![stage(1, 10)], 5).unwrap();
        let b = QueryReport::new(qid, vec![stage(7, 99)], 6).unwrap();
        assert_eq!(a.plan_hash, b.plan_hash);
        assert_eq!(b.stats.rows_scanned, 99);
    }

    #[test]
    fn finish_records_timing() {
        let report = QueryReport::new(QueryId::generate(), vec![stage(1, 1)], 100)
            .unwrap()
            .finish(250, 3, 4096);
        assert_eq!(report.duration_ms(), 150);
        assert_eq!(report.rows_returned, 3);
        assert!(report.to_json().unwrap().contains("\"peak_memory_bytes\": 4096"));
        assert!(report.stage("filter").is_some());
    }
}

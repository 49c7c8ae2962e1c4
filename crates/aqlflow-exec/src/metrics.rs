//! Per-stage counters as trace events, emitted once a query report is built.

use aqlflow_operators::StageSummary;

/// One event per stage with its accumulated counters.
#[cfg(feature = "tracing")]
pub fn emit_stats(stages: &[StageSummary]) {
    for stage in stages {
        let s = &stage.stats;
        tracing::trace!(
            stage = %stage.id,
            name = stage.name,
            rows_scanned = s.rows_scanned,
            rows_filtered = s.rows_filtered,
            documents_looked_up = s.documents_looked_up,
            edges_read = s.edges_read,
            vertices_visited = s.vertices_visited,
            "stage stats"
        );
    }
}

#[cfg(not(feature = "tracing"))]
pub fn emit_stats(_stages: &[StageSummary]) { /* no-op */
}

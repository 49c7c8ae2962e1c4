//! Executor trait + common interfaces.
//!
//! The driver in `aqlflow-exec` owns one fetcher and one executor per stage,
//! allocates the output block, and calls `produce_rows` until the output is
//! full or the executor reports `Done`. Shadow rows never reach
//! `produce_rows`; the driver forwards them through `forward_shadow_row`.

use std::sync::Arc;

use aqlflow_block::{ExecContext, OutputRow, RegisterInfos, ShadowRow};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::AqlValue;
use aqlflow_core::Result;

use crate::fetcher::{FetcherKind, RowFetcher};

/// Trait that all executors implement.
///
/// Invariants:
/// - `produce_rows` never writes more rows than `output` has room for and never
///   leaves a row half written when it returns.
/// - After returning `Done`, further calls return `Done`, produce nothing and
///   pull nothing until `reset`.
/// - `Waiting` is only returned when the fetcher or a collaborator reported it;
///   the next call resumes exactly where this one stopped.
/// - Returned stats are the increments of this call.
pub trait Executor: Send {
    /// Human-readable executor name (stable).
    fn name(&self) -> &'static str;

    /// Register plan used to shape the output block.
    fn register_infos(&self) -> &Arc<RegisterInfos>;

    fn fetcher_kind(&self) -> FetcherKind {
        FetcherKind::SingleRow
    }

    fn produce_rows(
        &mut self,
        ctx: &mut ExecContext,
        fetcher: &mut RowFetcher,
        output: &mut OutputRow,
    ) -> Result<(ExecutionState, ExecutionStats)>;

    /// Write `shadow` into the current output row.
    fn forward_shadow_row(
        &mut self,
        ctx: &mut ExecContext,
        shadow: &ShadowRow,
        output: &mut OutputRow,
    ) -> Result<()> {
        output.copy_shadow_row(&mut ctx.blocks, shadow)
    }

    /// Prepare for the next subquery run after a relevant shadow row.
    fn reset(&mut self, ctx: &mut ExecContext) -> Result<()>;

    /// Serializable description of the executor's configuration.
    fn describe(&self) -> Result<AqlValue>;
}

//! Pass-through executor.

use std::sync::Arc;

use aqlflow_block::{ExecContext, OutputRow, RegisterInfos};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::AqlValue;
use aqlflow_core::Result;

use crate::fetcher::RowFetcher;
use crate::traits::Executor;

/// Copies every input row unchanged.
pub struct IdExecutor {
    infos: Arc<RegisterInfos>,
}

impl IdExecutor {
    pub fn new(infos: Arc<RegisterInfos>) -> Self {
        Self { infos }
    }
}

impl Executor for IdExecutor {
    fn name(&self) -> &'static str {
        "id"
    }

    fn register_infos(&self) -> &Arc<RegisterInfos> {
        &self.infos
    }

    fn produce_rows(
        &mut self,
        ctx: &mut ExecContext,
        fetcher: &mut RowFetcher,
        output: &mut OutputRow,
    ) -> Result<(ExecutionState, ExecutionStats)> {
        let mut stats = ExecutionStats::new();
        while !output.is_full() {
            let (state, row) = fetcher.fetch_row(ctx, output.rows_left())?;
            if let Some(row) = row {
                stats.rows_scanned += 1;
                output.copy_row(&mut ctx.blocks, &row)?;
                output.advance_row()?;
            }
            if state != ExecutionState::HasMore {
                return Ok((state, stats));
            }
        }
        Ok((ExecutionState::HasMore, stats))
    }

    fn reset(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> Result<AqlValue> {
        Ok(serde_json::to_value(&*self.infos)?)
    }
}

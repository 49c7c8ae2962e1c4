//! Entry into a subquery.

use std::sync::Arc;

use aqlflow_block::{ExecContext, InputRow, OutputRow, RegisterInfos, ShadowRow};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::AqlValue;
use aqlflow_core::Result;

use crate::fetcher::RowFetcher;
use crate::traits::Executor;

/// Emits every data row followed by a relevant shadow copy of it, so the
/// subquery body runs once per row. Shadow rows of enclosing subqueries move
/// one level deeper.
pub struct SubqueryStartExecutor {
    infos: Arc<RegisterInfos>,
    /// Row whose shadow copy is still owed.
    pending_shadow: Option<InputRow>,
    fetch_state: ExecutionState,
}

impl SubqueryStartExecutor {
    pub fn new(infos: Arc<RegisterInfos>) -> Self {
        Self {
            infos,
            pending_shadow: None,
            fetch_state: ExecutionState::HasMore,
        }
    }
}

impl Executor for SubqueryStartExecutor {
    fn name(&self) -> &'static str {
        "subquery_start"
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
        loop {
            if output.is_full() {
                return Ok((ExecutionState::HasMore, stats));
            }
            if let Some(row) = self.pending_shadow.take() {
                output.create_shadow_row(&mut ctx.blocks, &row)?;
                output.advance_row()?;
                continue;
            }
            if self.fetch_state.is_done() {
                return Ok((ExecutionState::Done, stats));
            }
            let (state, row) = fetcher.fetch_row(ctx, output.rows_left())?;
            if state.is_waiting() {
                return Ok((ExecutionState::Waiting, stats));
            }
            self.fetch_state = state;
            if let Some(row) = row {
                stats.rows_scanned += 1;
                output.copy_row(&mut ctx.blocks, &row)?;
                output.advance_row()?;
                self.pending_shadow = Some(row);
            }
        }
    }

    fn forward_shadow_row(
        &mut self,
        ctx: &mut ExecContext,
        shadow: &ShadowRow,
        output: &mut OutputRow,
    ) -> Result<()> {
        output.increase_shadow_depth(&mut ctx.blocks, shadow)
    }

    fn reset(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.pending_shadow = None;
        self.fetch_state = ExecutionState::HasMore;
        Ok(())
    }

    fn describe(&self) -> Result<AqlValue> {
        Ok(serde_json::to_value(&*self.infos)?)
    }
}

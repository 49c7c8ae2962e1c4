//! Short-circuit executor for inputs known to be empty.

use std::sync::Arc;

use aqlflow_block::{ExecContext, OutputRow, RegisterInfos};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::AqlValue;
use aqlflow_core::Result;

use crate::fetcher::RowFetcher;
use crate::traits::Executor;

/// Returns `Done` on the first call without pulling a single row.
///
/// The fetcher state is checked exactly once so its bookkeeping records that the
/// stage ran.
pub struct NoResultsExecutor {
    infos: Arc<RegisterInfos>,
    state_checked: bool,
}

impl NoResultsExecutor {
    pub fn new(infos: Arc<RegisterInfos>) -> Self {
        Self {
            infos,
            state_checked: false,
        }
    }
}

impl Executor for NoResultsExecutor {
    fn name(&self) -> &'static str {
        "no_results"
    }

    fn register_infos(&self) -> &Arc<RegisterInfos> {
        &self.infos
    }

    fn produce_rows(
        &mut self,
        _ctx: &mut ExecContext,
        fetcher: &mut RowFetcher,
        _output: &mut OutputRow,
    ) -> Result<(ExecutionState, ExecutionStats)> {
        if !self.state_checked {
            fetcher.peek_state();
            self.state_checked = true;
        }
        Ok((ExecutionState::Done, ExecutionStats::new()))
    }

    fn reset(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> Result<AqlValue> {
        Ok(serde_json::to_value(&*self.infos)?)
    }
}

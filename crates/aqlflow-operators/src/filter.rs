//! Pass-through filter on a precomputed condition register.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use aqlflow_block::{ExecContext, OutputRow, RegisterInfos};
use aqlflow_core::register::RegisterId;
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::{self, AqlValue};
use aqlflow_core::{Error, Result};

use crate::fetcher::RowFetcher;
use crate::traits::Executor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterInfos {
    pub registers: Arc<RegisterInfos>,
    /// Register holding the evaluated condition.
    pub condition: RegisterId,
}

impl FilterInfos {
    pub fn new(registers: RegisterInfos, condition: RegisterId) -> Result<Self> {
        if condition.index() >= registers.input_registers() {
            return Err(Error::contract(format!(
                "condition register {condition} outside input width {}",
                registers.input_registers()
            )));
        }
        Ok(Self {
            registers: Arc::new(registers),
            condition,
        })
    }
}

/// Copies rows whose condition is truthy.
pub struct FilterExecutor {
    infos: Arc<FilterInfos>,
}

impl FilterExecutor {
    pub fn new(infos: Arc<FilterInfos>) -> Self {
        Self { infos }
    }
}

impl Executor for FilterExecutor {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn register_infos(&self) -> &Arc<RegisterInfos> {
        &self.infos.registers
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
                if value::is_truthy(row.value(&ctx.blocks, self.infos.condition)?) {
                    output.copy_row(&mut ctx.blocks, &row)?;
                    output.advance_row()?;
                } else {
                    stats.rows_filtered += 1;
                }
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

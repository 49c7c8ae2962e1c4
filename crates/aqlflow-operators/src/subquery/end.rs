//! Exit from a subquery.

use std::mem::size_of;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use aqlflow_block::{ExecContext, OutputRow, RegisterInfos, ShadowRow};
use aqlflow_core::register::RegisterId;
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::{self, AqlValue};
use aqlflow_core::{Error, Result};
use aqlflow_mem::Reservation;

use crate::fetcher::RowFetcher;
use crate::traits::Executor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubqueryEndInfos {
    pub registers: Arc<RegisterInfos>,
    /// Register of the subquery body's result; `None` collects nothing.
    pub input: Option<RegisterId>,
    /// Register receiving the result array.
    pub output: RegisterId,
}

impl SubqueryEndInfos {
    pub fn new(registers: RegisterInfos, input: Option<RegisterId>, output: RegisterId) -> Result<Self> {
        if !registers.is_writable(output) || registers.writable().len() != 1 {
            return Err(Error::contract(format!(
                "subquery end must write exactly register {output}"
            )));
        }
        if let Some(reg) = input {
            if reg.index() >= registers.input_registers() {
                return Err(Error::contract(format!(
                    "subquery result register {reg} outside input width {}",
                    registers.input_registers()
                )));
            }
        }
        Ok(Self {
            registers: Arc::new(registers),
            input,
            output,
        })
    }
}

/// Collapses the data rows of each subquery run into one array.
///
/// The relevant shadow row closing a run turns into the data row holding the
/// array; shadow rows of enclosing subqueries move one level up.
pub struct SubqueryEndExecutor {
    infos: Arc<SubqueryEndInfos>,
    accumulator: Vec<AqlValue>,
    reservation: Option<Reservation>,
    fetch_state: ExecutionState,
}

impl SubqueryEndExecutor {
    pub fn new(infos: Arc<SubqueryEndInfos>) -> Self {
        Self {
            infos,
            accumulator: Vec::new(),
            reservation: None,
            fetch_state: ExecutionState::HasMore,
        }
    }

    fn accumulate(&mut self, ctx: &ExecContext, value: AqlValue) -> Result<()> {
        let bytes = value::memory_usage(&value) + size_of::<AqlValue>();
        match self.reservation.as_mut() {
            Some(reservation) => reservation.grow(bytes)?,
            None => self.reservation = Some(ctx.monitor().reserve(bytes, "subquery_end")?),
        }
        self.accumulator.push(value);
        Ok(())
    }
}

impl Executor for SubqueryEndExecutor {
    fn name(&self) -> &'static str {
        "subquery_end"
    }

    fn register_infos(&self) -> &Arc<RegisterInfos> {
        &self.infos.registers
    }

    fn produce_rows(
        &mut self,
        ctx: &mut ExecContext,
        fetcher: &mut RowFetcher,
        _output: &mut OutputRow,
    ) -> Result<(ExecutionState, ExecutionStats)> {
        let mut stats = ExecutionStats::new();
        let at_most = ctx.batch_size();
        while !self.fetch_state.is_done() {
            let (state, row) = fetcher.fetch_row(ctx, at_most)?;
            if state.is_waiting() {
                return Ok((ExecutionState::Waiting, stats));
            }
            self.fetch_state = state;
            if let Some(row) = row {
                stats.rows_scanned += 1;
                if let Some(reg) = self.infos.input {
                    let value = row.value(&ctx.blocks, reg)?.clone();
                    self.accumulate(ctx, value)?;
                }
            }
        }
        Ok((ExecutionState::Done, stats))
    }

    fn forward_shadow_row(
        &mut self,
        ctx: &mut ExecContext,
        shadow: &ShadowRow,
        output: &mut OutputRow,
    ) -> Result<()> {
        if !shadow.is_relevant(&ctx.blocks)? {
            return output.decrease_shadow_depth(&mut ctx.blocks, shadow);
        }
        let result = AqlValue::Array(std::mem::take(&mut self.accumulator));
        output.consume_shadow_row(&mut ctx.blocks, self.infos.output, shadow, result)?;
        self.reservation = None;
        Ok(())
    }

    fn reset(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.accumulator.clear();
        self.reservation = None;
        self.fetch_state = ExecutionState::HasMore;
        Ok(())
    }

    fn describe(&self) -> Result<AqlValue> {
        Ok(serde_json::to_value(&*self.infos)?)
    }
}

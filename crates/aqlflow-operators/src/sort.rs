//! Full sort over one subquery run.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use aqlflow_block::{ExecContext, ItemMatrix, OutputRow, RegisterInfos};
use aqlflow_core::register::RegisterId;
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::{self, AqlValue};
use aqlflow_core::{Error, Result};

use crate::fetcher::{FetcherKind, RowFetcher};
use crate::traits::Executor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub register: RegisterId,
    pub ascending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortInfos {
    pub registers: Arc<RegisterInfos>,
    pub keys: Vec<SortKey>,
}

impl SortInfos {
    pub fn new(registers: RegisterInfos, keys: Vec<SortKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::BadParameter("sort needs at least one key".into()));
        }
        if let Some(key) = keys
            .iter()
            .find(|k| k.register.index() >= registers.input_registers())
        {
            return Err(Error::contract(format!(
                "sort register {} outside input width {}",
                key.register,
                registers.input_registers()
            )));
        }
        Ok(Self {
            registers: Arc::new(registers),
            keys,
        })
    }
}

enum SortState {
    Collecting,
    Emitting {
        matrix: ItemMatrix,
        order: Vec<usize>,
        next: usize,
    },
    Finished,
}

/// Materializes all rows of a run, then emits them in key order.
///
/// The sort is stable: rows with equal keys keep their input order.
pub struct SortExecutor {
    infos: Arc<SortInfos>,
    state: SortState,
}

impl SortExecutor {
    pub fn new(infos: Arc<SortInfos>) -> Self {
        Self {
            infos,
            state: SortState::Collecting,
        }
    }

    fn sort_order(&self, ctx: &ExecContext, matrix: &ItemMatrix) -> Result<Vec<usize>> {
        let registers: Vec<RegisterId> = self.infos.keys.iter().map(|k| k.register).collect();
        let keys = matrix
            .rows()
            .iter()
            .map(|row| row.values(&ctx.blocks, registers.iter().copied()))
            .collect::<Result<Vec<_>>>()?;
        let mut order: Vec<usize> = (0..matrix.size()).collect();
        order.sort_by(|&a, &b| {
            for (i, key) in self.infos.keys.iter().enumerate() {
                let ord = value::compare(&keys[a][i], &keys[b][i]);
                let ord = if key.ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(order)
    }
}

impl Executor for SortExecutor {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn register_infos(&self) -> &Arc<RegisterInfos> {
        &self.infos.registers
    }

    fn fetcher_kind(&self) -> FetcherKind {
        FetcherKind::AllRows
    }

    fn produce_rows(
        &mut self,
        ctx: &mut ExecContext,
        fetcher: &mut RowFetcher,
        output: &mut OutputRow,
    ) -> Result<(ExecutionState, ExecutionStats)> {
        let mut stats = ExecutionStats::new();
        if let SortState::Collecting = self.state {
            let (state, matrix) = fetcher.fetch_all_rows(ctx)?;
            let Some(matrix) = matrix else {
                return Ok((state, stats));
            };
            stats.rows_scanned += matrix.size() as u64;
            let order = self.sort_order(ctx, &matrix)?;
            self.state = SortState::Emitting {
                matrix,
                order,
                next: 0,
            };
        }
        match &mut self.state {
            SortState::Emitting {
                matrix,
                order,
                next,
            } => {
                while *next < order.len() && !output.is_full() {
                    if let Some(row) = matrix.row(order[*next]) {
                        output.copy_row(&mut ctx.blocks, &row)?;
                        output.advance_row()?;
                    }
                    *next += 1;
                }
                if *next < order.len() {
                    return Ok((ExecutionState::HasMore, stats));
                }
            }
            SortState::Finished => return Ok((ExecutionState::Done, stats)),
            SortState::Collecting => {}
        }
        if let SortState::Emitting { matrix, .. } =
            std::mem::replace(&mut self.state, SortState::Finished)
        {
            matrix.release(&mut ctx.blocks)?;
        }
        Ok((ExecutionState::Done, stats))
    }

    fn reset(&mut self, ctx: &mut ExecContext) -> Result<()> {
        if let SortState::Emitting { matrix, .. } =
            std::mem::replace(&mut self.state, SortState::Collecting)
        {
            matrix.release(&mut ctx.blocks)?;
        }
        Ok(())
    }

    fn describe(&self) -> Result<AqlValue> {
        Ok(serde_json::to_value(&*self.infos)?)
    }
}

//! Group-by over input that arrives sorted by the group key.

use std::mem::size_of;
use std::sync::Arc;

use serde_json::Map;

use aqlflow_block::{ExecContext, InputRow, OutputRow, PinnedRow, RegisterInfos};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::{self, AqlValue};
use aqlflow_core::{Error, Result};
use aqlflow_mem::Reservation;

use super::aggregator::{default_registry, Aggregator, AggregatorRegistry};
use super::infos::{CollectInto, SortedCollectInfos};
use crate::fetcher::RowFetcher;
use crate::traits::Executor;

/// The group currently being folded.
struct Group {
    key: Vec<AqlValue>,
    /// Source of the kept registers of the emitted row.
    first_row: PinnedRow,
    rows: u64,
    collected: Vec<AqlValue>,
    reservation: Reservation,
}

/// Emits one row per contiguous run of equal group keys.
///
/// Sorting is the upstream's job; an unsorted input yields one group per run.
pub struct SortedCollectExecutor {
    infos: Arc<SortedCollectInfos>,
    aggregators: Vec<Box<dyn Aggregator>>,
    group: Option<Group>,
    fetch_state: ExecutionState,
    seen_rows: bool,
    finished: bool,
}

impl SortedCollectExecutor {
    /// Resolve aggregates against the built-in functions.
    pub fn new(infos: Arc<SortedCollectInfos>) -> Result<Self> {
        Self::with_registry(infos, &default_registry())
    }

    pub fn with_registry(
        infos: Arc<SortedCollectInfos>,
        registry: &AggregatorRegistry,
    ) -> Result<Self> {
        let aggregators = infos
            .aggregates
            .iter()
            .map(|a| registry.create(&a.function))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            infos,
            aggregators,
            group: None,
            fetch_state: ExecutionState::HasMore,
            seen_rows: false,
            finished: false,
        })
    }

    fn start_group(&mut self, ctx: &mut ExecContext, row: InputRow, key: Vec<AqlValue>) -> Result<()> {
        let first_row = PinnedRow::pin(&mut ctx.blocks, row)?;
        let reservation = ctx.monitor().reserve(0, "sorted_collect")?;
        for agg in &mut self.aggregators {
            agg.reset();
        }
        self.group = Some(Group {
            key,
            first_row,
            rows: 0,
            collected: Vec::new(),
            reservation,
        });
        self.fold(ctx, row)
    }

    fn fold(&mut self, ctx: &ExecContext, row: InputRow) -> Result<()> {
        let group = self
            .group
            .as_mut()
            .ok_or_else(|| Error::contract("folding a row without an open group"))?;
        group.rows += 1;
        for (agg, spec) in self.aggregators.iter_mut().zip(&self.infos.aggregates) {
            match spec.input {
                Some(reg) => agg.reduce(row.value(&ctx.blocks, reg)?),
                None => agg.reduce(&AqlValue::Null),
            }
        }
        let collected = match &self.infos.into {
            CollectInto::Nothing => return Ok(()),
            CollectInto::Expression { input, .. } => row.value(&ctx.blocks, *input)?.clone(),
            CollectInto::Variables { variables, .. } => {
                let mut doc = Map::new();
                for (name, reg) in variables {
                    doc.insert(name.clone(), row.value(&ctx.blocks, *reg)?.clone());
                }
                AqlValue::Object(doc)
            }
        };
        group
            .reservation
            .grow(value::memory_usage(&collected) + size_of::<AqlValue>())?;
        group.collected.push(collected);
        Ok(())
    }

    fn emit_group(&mut self, ctx: &mut ExecContext, output: &mut OutputRow) -> Result<()> {
        let Some(group) = self.group.take() else {
            return Ok(());
        };
        let source = group.first_row.row();
        for ((_, out), key) in self.infos.groups.iter().zip(group.key) {
            output.set_value(&mut ctx.blocks, *out, &source, key)?;
        }
        for (agg, spec) in self.aggregators.iter().zip(&self.infos.aggregates) {
            output.set_value(&mut ctx.blocks, spec.output, &source, agg.finish())?;
        }
        if let Some(reg) = self.infos.count {
            output.set_value(&mut ctx.blocks, reg, &source, AqlValue::from(group.rows))?;
        }
        if let Some(reg) = self.infos.into.output() {
            output.set_value(&mut ctx.blocks, reg, &source, AqlValue::Array(group.collected))?;
        }
        output.advance_row()?;
        #[cfg(feature = "tracing")]
        tracing::trace!(rows = group.rows, "group emitted");
        group.first_row.unpin(&mut ctx.blocks)
    }

    /// The single row of an empty input without group keys.
    fn emit_empty(&mut self, ctx: &mut ExecContext, output: &mut OutputRow) -> Result<()> {
        for (agg, spec) in self.aggregators.iter_mut().zip(&self.infos.aggregates) {
            agg.reset();
            output.set_detached_value(&mut ctx.blocks, spec.output, agg.finish())?;
        }
        if let Some(reg) = self.infos.count {
            output.set_detached_value(&mut ctx.blocks, reg, AqlValue::from(0u64))?;
        }
        if let Some(reg) = self.infos.into.output() {
            output.set_detached_value(&mut ctx.blocks, reg, AqlValue::Array(Vec::new()))?;
        }
        output.advance_row()
    }
}

fn same_key(a: &[AqlValue], b: &[AqlValue]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| value::equals(x, y))
}

impl Executor for SortedCollectExecutor {
    fn name(&self) -> &'static str {
        "sorted_collect"
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
        loop {
            if self.finished {
                return Ok((ExecutionState::Done, stats));
            }
            if output.is_full() {
                return Ok((ExecutionState::HasMore, stats));
            }
            if self.fetch_state.is_done() {
                if self.group.is_some() {
                    self.emit_group(ctx, output)?;
                } else if !self.seen_rows && self.infos.groups.is_empty() {
                    self.emit_empty(ctx, output)?;
                }
                self.finished = true;
                continue;
            }

            let (state, row) = fetcher.fetch_row(ctx, output.rows_left())?;
            if state.is_waiting() {
                return Ok((ExecutionState::Waiting, stats));
            }
            self.fetch_state = state;
            let Some(row) = row else {
                continue;
            };
            stats.rows_scanned += 1;
            self.seen_rows = true;

            let key = row.values(&ctx.blocks, self.infos.groups.iter().map(|(input, _)| *input))?;
            let same_group = matches!(&self.group, Some(g) if same_key(&g.key, &key));
            if same_group {
                self.fold(ctx, row)?;
            } else {
                self.emit_group(ctx, output)?;
                self.start_group(ctx, row, key)?;
            }
        }
    }

    fn reset(&mut self, ctx: &mut ExecContext) -> Result<()> {
        if let Some(group) = self.group.take() {
            group.first_row.unpin(&mut ctx.blocks)?;
        }
        for agg in &mut self.aggregators {
            agg.reset();
        }
        self.fetch_state = ExecutionState::HasMore;
        self.seen_rows = false;
        self.finished = false;
        Ok(())
    }

    fn describe(&self) -> Result<AqlValue> {
        Ok(serde_json::to_value(&*self.infos)?)
    }
}

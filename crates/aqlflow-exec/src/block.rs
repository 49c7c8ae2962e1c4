//! The execution-block driver.
//!
//! One `ExecutionBlock` per pipeline stage. On every `execute` call it:
//! - checks the kill flag,
//! - allocates an output block of `min(at_most, batch_size)` rows (or resumes
//!   the partly filled one kept across `Waiting`),
//! - lets the executor produce rows until the output is full or the current
//!   subquery run is done,
//! - drops the data rows the executor left unread, forwards the shadow rows
//!   that follow and resets the executor after every relevant one,
//! - runs the executor once per subquery run, empty runs included,
//! - hands the block on once it is full or the input is exhausted.

use std::sync::Arc;

use aqlflow_block::{BlockHandle, ExecContext, OutputRow};
use aqlflow_core::id::StageId;
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::AqlValue;
use aqlflow_core::{Error, Result};
use aqlflow_operators::{AnyExecutor, Executor, RowFetcher, StageSummary, Upcoming, Upstream};

use crate::fail_point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Look at the next row and decide what to do with it.
    Dispatch,
    /// Executor produces the data rows of the current run.
    Produce,
    /// Drop data rows the executor did not consume.
    SkipRest,
    Finished,
}

/// Outcome of one fill attempt.
enum Fill {
    Waiting,
    Full,
    Finished,
}

pub struct ExecutionBlock {
    id: StageId,
    executor: AnyExecutor,
    fetcher: RowFetcher,
    output: Option<OutputRow>,
    phase: Phase,
    stats: ExecutionStats,
    /// The executor finished the current run.
    run_done: bool,
    seen_shadow_rows: bool,
    rows_skipped: u64,
    rows_returned: u64,
    failpoint: String,
}

impl ExecutionBlock {
    /// Stage pulling from `upstream` with the fetcher the executor asks for.
    pub fn new(id: StageId, executor: impl Into<AnyExecutor>, upstream: Box<dyn Upstream>) -> Self {
        let executor = executor.into();
        let fetcher = RowFetcher::for_kind(executor.fetcher_kind(), upstream);
        Self::with_fetcher(id, executor, fetcher)
    }

    /// Stage reading from an explicit fetcher, e.g. a `ConstFetcher`.
    pub fn with_fetcher(
        id: StageId,
        executor: impl Into<AnyExecutor>,
        fetcher: impl Into<RowFetcher>,
    ) -> Self {
        let executor = executor.into();
        let failpoint = format!("{}::execute", executor.name());
        Self {
            id,
            executor,
            fetcher: fetcher.into(),
            output: None,
            phase: Phase::Dispatch,
            stats: ExecutionStats::new(),
            run_done: false,
            seen_shadow_rows: false,
            rows_skipped: 0,
            rows_returned: 0,
            failpoint,
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.executor.name()
    }

    pub fn executor(&self) -> &AnyExecutor {
        &self.executor
    }

    pub fn fetcher(&self) -> &RowFetcher {
        &self.fetcher
    }

    /// Counters accumulated over every call so far.
    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    /// Data rows dropped because the executor finished its run early.
    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    /// Rows (data and shadow) handed downstream.
    pub fn rows_returned(&self) -> u64 {
        self.rows_returned
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished && self.output.is_none()
    }

    /// Name under which this stage's failpoint is armed.
    pub fn failpoint(&self) -> &str {
        &self.failpoint
    }

    pub fn summary(&self) -> StageSummary {
        StageSummary {
            id: self.id,
            name: self.executor.name(),
            plan: self.executor.describe().unwrap_or(AqlValue::Null),
            stats: self.stats,
        }
    }

    /// Produce the next block of at most `at_most` rows.
    ///
    /// `Waiting` never comes with a block; the call must be repeated with the
    /// same `at_most`. `Done` may come with the final block.
    pub fn execute(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<BlockHandle>)> {
        ctx.check_killed()?;
        fail_point!(self.failpoint.as_str());
        if at_most == 0 {
            return Err(Error::contract(format!(
                "{} asked for zero rows",
                self.executor.name()
            )));
        }
        if self.is_finished() {
            return Ok((ExecutionState::Done, None));
        }

        let mut output = match self.output.take() {
            Some(output) => output,
            None => {
                let rows = at_most.min(ctx.batch_size().max(1));
                let infos = Arc::clone(self.executor.register_infos());
                OutputRow::allocate(&mut ctx.blocks, rows, infos)?
            }
        };

        let fill = match self.fill(ctx, &mut output) {
            Ok(fill) => fill,
            Err(err) => {
                if let Err(_cleanup) = output.discard(&mut ctx.blocks) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        stage = %self.id,
                        name = self.name(),
                        error = %_cleanup,
                        "output block not released after failure"
                    );
                }
                return Err(err);
            }
        };
        let state = match fill {
            Fill::Waiting => {
                self.output = Some(output);
                #[cfg(feature = "tracing")]
                tracing::trace!(stage = %self.id, name = self.name(), "waiting");
                return Ok((ExecutionState::Waiting, None));
            }
            Fill::Full => ExecutionState::HasMore,
            Fill::Finished => ExecutionState::Done,
        };

        let block = output.take_block(&mut ctx.blocks)?;
        if let Some(handle) = block {
            let block = ctx.blocks.get(handle)?;
            block.validate_shadow_rows()?;
            self.rows_returned += block.num_rows() as u64;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(
            stage = %self.id,
            name = self.name(),
            state = ?state,
            rows = self.rows_returned,
            "block handed downstream"
        );
        Ok((state, block))
    }

    fn fill(&mut self, ctx: &mut ExecContext, output: &mut OutputRow) -> Result<Fill> {
        loop {
            if self.phase == Phase::Finished {
                return Ok(Fill::Finished);
            }
            if output.is_full() {
                return Ok(Fill::Full);
            }
            match self.phase {
                Phase::Dispatch => match self.fetcher.upcoming(ctx, output.rows_left())? {
                    Upcoming::Waiting => return Ok(Fill::Waiting),
                    Upcoming::DataRow => self.phase = Phase::Produce,
                    // A relevant shadow row right after the previous one closes an empty run.
                    Upcoming::ShadowRow { depth: 0 } if !self.run_done => self.phase = Phase::Produce,
                    Upcoming::ShadowRow { .. } => self.forward_shadow_row(ctx, output)?,
                    Upcoming::Exhausted if !self.run_done && !self.seen_shadow_rows => {
                        self.phase = Phase::Produce
                    }
                    Upcoming::Exhausted => self.finish(ctx)?,
                },
                Phase::Produce => {
                    let (state, stats) = self.executor.produce_rows(ctx, &mut self.fetcher, output)?;
                    self.stats += stats;
                    match state {
                        ExecutionState::Waiting => return Ok(Fill::Waiting),
                        ExecutionState::HasMore => {}
                        ExecutionState::Done => {
                            self.run_done = true;
                            self.phase = Phase::SkipRest;
                        }
                    }
                }
                Phase::SkipRest => {
                    let (state, skipped) = self.fetcher.skip_data_rows(ctx, output.rows_left())?;
                    self.rows_skipped += skipped as u64;
                    match state {
                        ExecutionState::Waiting => return Ok(Fill::Waiting),
                        ExecutionState::HasMore => self.phase = Phase::Dispatch,
                        ExecutionState::Done => self.finish(ctx)?,
                    }
                }
                Phase::Finished => return Ok(Fill::Finished),
            }
        }
    }

    /// Forward the buffered shadow row into `output`.
    fn forward_shadow_row(&mut self, ctx: &mut ExecContext, output: &mut OutputRow) -> Result<()> {
        let (_, shadow) = self.fetcher.fetch_shadow_row(ctx, output.rows_left())?;
        let shadow = shadow.ok_or_else(|| Error::contract("announced shadow row is gone"))?;
        self.seen_shadow_rows = true;
        let relevant = shadow.is_relevant(&ctx.blocks)?;
        self.executor.forward_shadow_row(ctx, &shadow, output)?;
        output.advance_row()?;
        if relevant {
            self.executor.reset(ctx)?;
            self.run_done = false;
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &mut ExecContext) -> Result<()> {
        self.phase = Phase::Finished;
        self.fetcher.release(ctx)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            stage = %self.id,
            name = self.name(),
            skipped = self.rows_skipped,
            "stage finished"
        );
        Ok(())
    }
}

impl Upstream for ExecutionBlock {
    fn fetch_block(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<BlockHandle>)> {
        self.execute(ctx, at_most)
    }

    fn collect_stages(&self, out: &mut Vec<StageSummary>) {
        self.fetcher.collect_stages(out);
        out.push(self.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqlflow_block::{BlockBuilder, ItemBlock, RegisterInfos};
    use aqlflow_core::error::codes;
    use aqlflow_core::query::QueryContext;
    use aqlflow_core::register::{RegisterId, RegisterSet};
    use aqlflow_mem::ResourceMonitor;
    use aqlflow_operators::id::IdExecutor;
    use aqlflow_operators::no_results::NoResultsExecutor;
    use aqlflow_operators::traversal::{InMemoryGraph, StartVertex, TraversalExecutor, TraversalInfos, TraversalOptions};
    use aqlflow_operators::{BlockQueue, ConstFetcher, WaitingBehavior};
    use serde_json::{json, Value};

    fn input(waiting: WaitingBehavior) -> Box<dyn Upstream> {
        Box::new(BlockQueue::new(
            [
                BlockBuilder::new(1).row([json!(1)]).row([json!(2)]).shadow([json!("a")], 0),
                BlockBuilder::new(1).row([json!(3)]).shadow([json!("b")], 0),
            ],
            waiting,
        ))
    }

    fn id_stage(upstream: Box<dyn Upstream>) -> ExecutionBlock {
        let infos = Arc::new(RegisterInfos::passthrough(1));
        ExecutionBlock::new(StageId::new(1), IdExecutor::new(infos), upstream)
    }

    /// (shadow depth, register 0) of every row handed out until `Done`.
    fn drain(stage: &mut ExecutionBlock, ctx: &mut ExecContext, at_most: usize) -> Vec<(Option<u32>, Value)> {
        let mut rows = Vec::new();
        loop {
            let (state, block) = stage.execute(ctx, at_most).unwrap();
            if let Some(handle) = block {
                let block = ctx.blocks.get(handle).unwrap();
                for i in 0..block.num_rows() {
                    rows.push((block.shadow_depth(i), block.value(i, RegisterId::new(0)).unwrap().clone()));
                }
                ctx.blocks.release(handle).unwrap();
            }
            if state.is_done() {
                return rows;
            }
        }
    }

    #[test]
    fn forwards_data_and_shadow_rows_in_order() {
        let mut ctx = ExecContext::default();
        let mut stage = id_stage(input(WaitingBehavior::Never));
        let rows = drain(&mut stage, &mut ctx, 10);
        assert_eq!(
            rows,
            vec![
                (None, json!(1)),
                (None, json!(2)),
                (Some(0), json!("a")),
                (None, json!(3)),
                (Some(0), json!("b")),
            ]
        );
        assert_eq!(stage.stats().rows_scanned, 3);
        assert_eq!(ctx.blocks.live_blocks(), 0);
    }

    #[test]
    fn waiting_does_not_change_output() {
        let mut plain_ctx = ExecContext::default();
        let plain = drain(&mut id_stage(input(WaitingBehavior::Never)), &mut plain_ctx, 2);
        let mut ctx = ExecContext::default();
        let waited = drain(&mut id_stage(input(WaitingBehavior::Always)), &mut ctx, 2);
        assert_eq!(plain, waited);
        assert_eq!(ctx.blocks.live_blocks(), 0);
    }

    #[test]
    fn done_is_terminal() {
        let mut ctx = ExecContext::default();
        let mut stage = id_stage(input(WaitingBehavior::Never));
        drain(&mut stage, &mut ctx, 10);
        for _ in 0..3 {
            assert_eq!(stage.execute(&mut ctx, 10).unwrap(), (ExecutionState::Done, None));
        }
        assert!(stage.is_finished());
    }

    #[test]
    fn zero_rows_requested_is_a_contract_error() {
        let mut ctx = ExecContext::default();
        let mut stage = id_stage(input(WaitingBehavior::Never));
        let err = stage.execute(&mut ctx, 0).unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
    }

    #[test]
    fn killed_query_fails_fast() {
        let mut ctx = ExecContext::default();
        let mut stage = id_stage(input(WaitingBehavior::Never));
        ctx.query.kill();
        assert!(stage.execute(&mut ctx, 10).unwrap_err().is_cancelled());
    }

    #[test]
    fn short_circuit_drops_data_rows_but_keeps_shadow_rows() {
        let mut ctx = ExecContext::default();
        let infos = Arc::new(RegisterInfos::passthrough(1));
        let mut stage = ExecutionBlock::new(
            StageId::new(2),
            NoResultsExecutor::new(infos),
            input(WaitingBehavior::Once),
        );
        let rows = drain(&mut stage, &mut ctx, 10);
        assert_eq!(rows, vec![(Some(0), json!("a")), (Some(0), json!("b"))]);
        assert_eq!(stage.rows_skipped(), 3);
        assert_eq!(stage.fetcher().state_checks(), 1);
    }

    #[test]
    fn const_fetcher_stage_serves_injected_block() {
        let mut ctx = ExecContext::default();
        let block = BlockBuilder::new(1)
            .row([json!("x")])
            .row([json!("y")])
            .build(&mut ctx.blocks)
            .unwrap();
        let mut fetcher = ConstFetcher::new();
        fetcher.inject_block(block);
        let infos = Arc::new(RegisterInfos::passthrough(1));
        let mut stage = ExecutionBlock::with_fetcher(StageId::new(3), IdExecutor::new(infos), fetcher);
        let rows = drain(&mut stage, &mut ctx, 1);
        assert_eq!(rows, vec![(None, json!("x")), (None, json!("y"))]);
        assert_eq!(stage.fetcher().upstream_calls(), 0);
    }

    #[test]
    fn failed_fill_gives_back_its_output_block() {
        let mut graph = InMemoryGraph::new();
        graph
            .add_vertex("v/a", json!({}))
            .add_vertex("v/b", json!({ "payload": "x".repeat(4096) }))
            .add_edge("v/a", "v/b");
        let infos = TraversalInfos::builder(
            RegisterInfos::new(1, 2, RegisterSet::from([1]), vec![RegisterSet::from([0])]).unwrap(),
            StartVertex::Constant("v/a".into()),
        )
        .options(TraversalOptions::default())
        .vertex_output(RegisterId::new(1))
        .build()
        .unwrap();
        let limit = ItemBlock::footprint(1, 1) + ItemBlock::footprint(1, 2) + 1024;
        let mut ctx = ExecContext::with_monitor(Arc::new(QueryContext::default()), ResourceMonitor::new(limit));
        let mut stage = ExecutionBlock::new(
            StageId::new(4),
            TraversalExecutor::new(Arc::new(infos), Arc::new(graph)),
            Box::new(BlockQueue::new([BlockBuilder::new(1).row([json!(null)])], WaitingBehavior::Never)),
        );

        let err = stage.execute(&mut ctx, 1).unwrap_err();
        assert_eq!(err.code(), codes::RESOURCE_LIMIT);
        // Only the input block held by the fetcher is left.
        assert_eq!(ctx.blocks.live_blocks(), 1);
        stage.finish(&mut ctx).unwrap();
        assert_eq!(ctx.blocks.live_blocks(), 0);
    }
}

//! Pipeline: the last stage of a plan plus the context it runs in.
//!
//! Starter behavior:
//! - Stages are chained upstream first through [`PipelineBuilder`].
//! - `run_to_completion` retries on `Waiting` up to a bounded number of
//!   consecutive attempts; `run_async` yields to the runtime instead.
//! - Every block handed out by the last stage is shown to a sink and released.
//! - A [`QueryReport`] is produced once the last stage is done.

use std::time::{SystemTime, UNIX_EPOCH};

use aqlflow_block::{BlockHandle, ExecContext, ItemBlock};
use aqlflow_core::id::StageId;
use aqlflow_core::state::ExecutionState;
use aqlflow_core::value::AqlValue;
use aqlflow_core::{Error, Result};
use aqlflow_operators::{AnyExecutor, BlockQueue, Upstream};

use crate::block::ExecutionBlock;
use crate::metrics;
use crate::report::QueryReport;

/// Consecutive `Waiting` answers tolerated by `run_to_completion`.
pub const DEFAULT_MAX_WAITS: usize = 1000;

/// Chains executors on top of a source, upstream first.
pub struct PipelineBuilder {
    source: Option<Box<dyn Upstream>>,
    last: Option<ExecutionBlock>,
    next_id: u64,
    max_waits: usize,
}

impl PipelineBuilder {
    pub fn new(source: impl Upstream + 'static) -> Self {
        Self {
            source: Some(Box::new(source)),
            last: None,
            next_id: 0,
            max_waits: DEFAULT_MAX_WAITS,
        }
    }

    /// Append a stage fed by everything added so far.
    pub fn stage(mut self, executor: impl Into<AnyExecutor>) -> Self {
        let upstream: Box<dyn Upstream> = match self.last.take() {
            Some(previous) => Box::new(previous),
            None => self
                .source
                .take()
                .unwrap_or_else(|| Box::new(BlockQueue::empty())),
        };
        self.next_id += 1;
        self.last = Some(ExecutionBlock::new(StageId::new(self.next_id), executor, upstream));
        self
    }

    pub fn max_waits(mut self, max_waits: usize) -> Self {
        self.max_waits = max_waits;
        self
    }

    pub fn build(self, ctx: ExecContext) -> Result<Pipeline> {
        let root = self
            .last
            .ok_or_else(|| Error::BadParameter("pipeline has no stages".into()))?;
        ctx.query.config().validate()?;
        Ok(Pipeline::new(root, ctx).with_max_waits(self.max_waits))
    }
}

pub struct Pipeline {
    root: ExecutionBlock,
    ctx: ExecContext,
    max_waits: usize,
    started_ms: Option<u64>,
}

impl Pipeline {
    pub fn new(root: ExecutionBlock, ctx: ExecContext) -> Self {
        Self {
            root,
            ctx,
            max_waits: DEFAULT_MAX_WAITS,
            started_ms: None,
        }
    }

    pub fn with_max_waits(mut self, max_waits: usize) -> Self {
        self.max_waits = max_waits;
        self
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ExecContext {
        &mut self.ctx
    }

    pub fn root(&self) -> &ExecutionBlock {
        &self.root
    }

    pub fn is_finished(&self) -> bool {
        self.root.is_finished()
    }

    /// Pull one block of up to `batch_size` rows from the last stage.
    ///
    /// The caller owns one reference to a returned block and must release it
    /// through `context_mut().blocks`.
    pub fn next_block(&mut self) -> Result<(ExecutionState, Option<BlockHandle>)> {
        if self.started_ms.is_none() {
            self.started_ms = Some(now_millis());
        }
        let at_most = self.ctx.batch_size().max(1);
        self.root.execute(&mut self.ctx, at_most)
    }

    /// Drive the pipeline until `Done`, showing every block to `sink`.
    ///
    /// Fails once the last stage answered `Waiting` more than `max_waits`
    /// times in a row.
    pub fn run_to_completion<F>(&mut self, mut sink: F) -> Result<QueryReport>
    where
        F: FnMut(&ItemBlock) -> Result<()>,
    {
        let mut waits = 0usize;
        loop {
            let (state, block) = self.next_block()?;
            if state.is_waiting() {
                waits += 1;
                if waits > self.max_waits {
                    return Err(Error::collaborator(
                        "upstream",
                        format!("still waiting after {} attempts", self.max_waits),
                    ));
                }
                continue;
            }
            waits = 0;
            self.deliver(block, &mut sink)?;
            if state.is_done() {
                return self.report();
            }
        }
    }

    /// Like `run_to_completion`, yielding to the runtime on every `Waiting`.
    #[cfg(feature = "async")]
    pub async fn run_async<F>(&mut self, mut sink: F) -> Result<QueryReport>
    where
        F: FnMut(&ItemBlock) -> Result<()>,
    {
        loop {
            let (state, block) = self.next_block()?;
            if state.is_waiting() {
                tokio::task::yield_now().await;
                continue;
            }
            self.deliver(block, &mut sink)?;
            if state.is_done() {
                return self.report();
            }
        }
    }

    /// Run to completion and return every data row, all registers.
    pub fn collect_rows(&mut self) -> Result<Vec<Vec<AqlValue>>> {
        let mut rows = Vec::new();
        self.run_to_completion(|block| {
            for row in 0..block.num_rows() {
                if block.is_shadow_row(row) {
                    continue;
                }
                let values = (0..block.num_registers())
                    .map(|reg| block.value(row, (reg as u32).into()).cloned())
                    .collect::<Result<Vec<_>>>()?;
                rows.push(values);
            }
            Ok(())
        })?;
        Ok(rows)
    }

    fn deliver<F>(&mut self, block: Option<BlockHandle>, sink: &mut F) -> Result<()>
    where
        F: FnMut(&ItemBlock) -> Result<()>,
    {
        let Some(handle) = block else {
            return Ok(());
        };
        let shown = sink(self.ctx.blocks.get(handle)?);
        self.ctx.blocks.release(handle)?;
        shown
    }

    /// Report of the run so far.
    pub fn report(&self) -> Result<QueryReport> {
        let mut stages = Vec::new();
        self.root.collect_stages(&mut stages);
        metrics::emit_stats(&stages);

        let started_ms = self.started_ms.unwrap_or_else(now_millis);
        let query = &self.ctx.query;
        let report = QueryReport::new(query.id(), stages, started_ms)?
            .finish(
                now_millis(),
                self.root.rows_returned(),
                self.ctx.monitor().peak_bytes(),
            )
            .with_warnings(query.warnings(), query.warnings_seen());

        #[cfg(feature = "tracing")]
        tracing::debug!(
            query = %report.query_id,
            rows = report.rows_returned,
            peak_memory_bytes = report.peak_memory_bytes,
            duration_ms = report.duration_ms(),
            "query finished"
        );
        Ok(report)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Row-at-a-time fetcher without buffering beyond the current block.

use aqlflow_block::{ExecContext, InputRow, ShadowRow};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::Result;

use super::buffer::RowBuffer;
use crate::upstream::{StageSummary, Upstream};

pub struct SingleRowFetcher {
    buffer: RowBuffer,
}

impl SingleRowFetcher {
    pub fn new(upstream: Box<dyn Upstream>) -> Self {
        Self {
            buffer: RowBuffer::new(Some(upstream)),
        }
    }

    /// Next data row of the current subquery run.
    ///
    /// Returns `Done` together with the last data row when a shadow row or the
    /// end of input follows, and `Done` without a row when already there.
    pub fn fetch_row(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<InputRow>)> {
        self.buffer.fetch_row(ctx, at_most)
    }

    pub fn fetch_shadow_row(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<ShadowRow>)> {
        self.buffer.fetch_shadow_row(ctx, at_most)
    }

    pub fn upstream_calls(&self) -> usize {
        self.buffer.upstream_calls()
    }

    pub(crate) fn buffer(&mut self) -> &mut RowBuffer {
        &mut self.buffer
    }

    pub(crate) fn buffer_ref(&self) -> &RowBuffer {
        &self.buffer
    }

    pub(crate) fn collect_stages(&self, out: &mut Vec<StageSummary>) {
        self.buffer.collect_stages(out);
    }
}

//! Fetcher that materializes a whole subquery run before serving it.

use aqlflow_block::{BlockHandle, ExecContext, ItemMatrix};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::Result;

use super::buffer::{Peek, RowBuffer};
use crate::upstream::{StageSummary, Upstream};

pub struct AllRowsFetcher {
    buffer: RowBuffer,
    matrix: ItemMatrix,
    last_block: Option<BlockHandle>,
}

impl AllRowsFetcher {
    pub fn new(upstream: Box<dyn Upstream>) -> Self {
        Self {
            buffer: RowBuffer::new(Some(upstream)),
            matrix: ItemMatrix::new(),
            last_block: None,
        }
    }

    /// Collect every data row up to the next shadow row or the end of input.
    ///
    /// On `Waiting` the rows gathered so far stay buffered and the call is
    /// resumed later. On `Done` the matrix is handed over; the caller releases it.
    pub fn fetch_all_rows(
        &mut self,
        ctx: &mut ExecContext,
    ) -> Result<(ExecutionState, Option<ItemMatrix>)> {
        let at_most = ctx.batch_size();
        loop {
            match self.buffer.peek(ctx, at_most)? {
                Peek::Waiting => return Ok((ExecutionState::Waiting, None)),
                Peek::Exhausted | Peek::Shadow(_) => {
                    self.last_block = None;
                    let matrix = std::mem::take(&mut self.matrix);
                    return Ok((ExecutionState::Done, Some(matrix)));
                }
                Peek::Data(row) => {
                    if self.last_block != Some(row.block()) {
                        ctx.blocks.retain(row.block())?;
                        self.matrix.add_block(row.block());
                        self.last_block = Some(row.block());
                    }
                    self.matrix.push_row(row);
                    self.buffer.advance();
                }
            }
        }
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

    /// Release both the upstream buffer and any partly gathered rows.
    pub(crate) fn release(&mut self, ctx: &mut ExecContext) -> Result<()> {
        self.last_block = None;
        std::mem::take(&mut self.matrix).release(&mut ctx.blocks)?;
        self.buffer.release(&mut ctx.blocks)
    }

    pub(crate) fn collect_stages(&self, out: &mut Vec<StageSummary>) {
        self.buffer.collect_stages(out);
    }
}

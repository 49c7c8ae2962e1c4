//! Block buffering shared by all fetchers.

use std::collections::VecDeque;

use aqlflow_block::{BlockHandle, BlockManager, ExecContext, InputRow, ShadowRow};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::{Error, Result};

use crate::upstream::{StageSummary, Upstream};

/// What the next buffered row is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Peek {
    Waiting,
    Exhausted,
    Data(InputRow),
    Shadow(ShadowRow),
}

/// Holds the current upstream block and a cursor into it.
///
/// The block is released lazily on the next pull, so the last row handed out
/// stays readable until the fetcher is asked for more.
pub(crate) struct RowBuffer {
    upstream: Option<Box<dyn Upstream>>,
    injected: VecDeque<BlockHandle>,
    block: Option<(BlockHandle, usize)>,
    index: usize,
    upstream_state: ExecutionState,
    upstream_calls: usize,
    state_checks: usize,
}

impl RowBuffer {
    pub(crate) fn new(upstream: Option<Box<dyn Upstream>>) -> Self {
        let upstream_state = if upstream.is_some() {
            ExecutionState::HasMore
        } else {
            ExecutionState::Done
        };
        Self {
            upstream,
            injected: VecDeque::new(),
            block: None,
            index: 0,
            upstream_state,
            upstream_calls: 0,
            state_checks: 0,
        }
    }

    pub(crate) fn inject(&mut self, block: BlockHandle) {
        self.injected.push_back(block);
    }

    pub(crate) fn upstream_calls(&self) -> usize {
        self.upstream_calls
    }

    pub(crate) fn state_checks(&self) -> usize {
        self.state_checks
    }

    pub(crate) fn collect_stages(&self, out: &mut Vec<StageSummary>) {
        if let Some(up) = &self.upstream {
            up.collect_stages(out);
        }
    }

    fn has_buffered_rows(&self) -> bool {
        matches!(self.block, Some((_, rows)) if self.index < rows) || !self.injected.is_empty()
    }

    /// Look at the next row, pulling from upstream when the buffer is empty.
    pub(crate) fn peek(&mut self, ctx: &mut ExecContext, at_most: usize) -> Result<Peek> {
        loop {
            if let Some((handle, rows)) = self.block {
                if self.index < rows {
                    let block = ctx.blocks.get(handle)?;
                    return Ok(if block.is_shadow_row(self.index) {
                        Peek::Shadow(ShadowRow::new(handle, self.index))
                    } else {
                        Peek::Data(InputRow::new(handle, self.index))
                    });
                }
                ctx.blocks.release(handle)?;
                self.block = None;
            }
            if let Some(handle) = self.injected.pop_front() {
                self.set_block(&ctx.blocks, handle)?;
                continue;
            }
            if self.upstream_state.is_done() {
                return Ok(Peek::Exhausted);
            }
            let Some(upstream) = self.upstream.as_mut() else {
                return Ok(Peek::Exhausted);
            };
            self.upstream_calls += 1;
            let (state, block) = upstream.fetch_block(ctx, at_most)?;
            self.upstream_state = state;
            match (state, block) {
                (ExecutionState::Waiting, Some(_)) => {
                    return Err(Error::contract("upstream returned a block together with WAITING"))
                }
                (ExecutionState::Waiting, None) => return Ok(Peek::Waiting),
                (_, Some(handle)) => self.set_block(&ctx.blocks, handle)?,
                (_, None) => {}
            }
        }
    }

    fn set_block(&mut self, blocks: &BlockManager, handle: BlockHandle) -> Result<()> {
        let rows = blocks.get(handle)?.num_rows();
        self.block = Some((handle, rows));
        self.index = 0;
        Ok(())
    }

    /// Move past the row last returned by `peek`.
    pub(crate) fn advance(&mut self) {
        self.index += 1;
    }

    /// State after the row just consumed: `Done` when the next row is a shadow
    /// row or nothing follows.
    pub(crate) fn state_after_data_row(&self, blocks: &BlockManager) -> Result<ExecutionState> {
        if let Some((handle, rows)) = self.block {
            if self.index < rows {
                let next_is_shadow = blocks.get(handle)?.is_shadow_row(self.index);
                return Ok(if next_is_shadow {
                    ExecutionState::Done
                } else {
                    ExecutionState::HasMore
                });
            }
        }
        Ok(self.state_without_buffer())
    }

    /// State after a shadow row: `HasMore` while anything may follow.
    pub(crate) fn state_after_shadow_row(&self) -> ExecutionState {
        if self.has_buffered_rows() {
            ExecutionState::HasMore
        } else {
            self.state_without_buffer()
        }
    }

    fn state_without_buffer(&self) -> ExecutionState {
        if !self.injected.is_empty() {
            return ExecutionState::HasMore;
        }
        if self.upstream_state.is_done() {
            ExecutionState::Done
        } else {
            ExecutionState::HasMore
        }
    }

    /// Known state without pulling.
    pub(crate) fn peek_state(&mut self) -> ExecutionState {
        self.state_checks += 1;
        if self.has_buffered_rows() {
            ExecutionState::HasMore
        } else {
            self.state_without_buffer()
        }
    }

    /// Give back the buffered blocks.
    pub(crate) fn release(&mut self, blocks: &mut BlockManager) -> Result<()> {
        if let Some((handle, _)) = self.block.take() {
            blocks.release(handle)?;
        }
        while let Some(handle) = self.injected.pop_front() {
            blocks.release(handle)?;
        }
        Ok(())
    }

    pub(crate) fn fetch_row(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<InputRow>)> {
        match self.peek(ctx, at_most)? {
            Peek::Waiting => Ok((ExecutionState::Waiting, None)),
            Peek::Exhausted | Peek::Shadow(_) => Ok((ExecutionState::Done, None)),
            Peek::Data(row) => {
                self.advance();
                Ok((self.state_after_data_row(&ctx.blocks)?, Some(row)))
            }
        }
    }

    pub(crate) fn fetch_shadow_row(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<ShadowRow>)> {
        match self.peek(ctx, at_most)? {
            Peek::Waiting => Ok((ExecutionState::Waiting, None)),
            Peek::Exhausted => Ok((ExecutionState::Done, None)),
            Peek::Data(_) => Ok((ExecutionState::HasMore, None)),
            Peek::Shadow(row) => {
                self.advance();
                Ok((self.state_after_shadow_row(), Some(row)))
            }
        }
    }

    pub(crate) fn skip_data_rows(&mut self, ctx: &mut ExecContext, at_most: usize) -> Result<(ExecutionState, usize)> {
        let mut skipped = 0;
        loop {
            match self.peek(ctx, at_most)? {
                Peek::Waiting => return Ok((ExecutionState::Waiting, skipped)),
                Peek::Exhausted => return Ok((ExecutionState::Done, skipped)),
                Peek::Shadow(_) => return Ok((ExecutionState::HasMore, skipped)),
                Peek::Data(_) => {
                    self.advance();
                    skipped += 1;
                }
            }
        }
    }
}

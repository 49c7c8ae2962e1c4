//! Fetcher serving injected blocks; never pulls from an upstream.

use aqlflow_block::{BlockHandle, ExecContext, InputRow, ShadowRow};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::Result;

use super::buffer::RowBuffer;

pub struct ConstFetcher {
    buffer: RowBuffer,
}

impl ConstFetcher {
    pub fn new() -> Self {
        Self {
            buffer: RowBuffer::new(None),
        }
    }

    /// Queue `block` behind the blocks already injected. The fetcher takes
    /// over the caller's reference.
    pub fn inject_block(&mut self, block: BlockHandle) {
        self.buffer.inject(block);
    }

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

    pub(crate) fn buffer(&mut self) -> &mut RowBuffer {
        &mut self.buffer
    }

    pub(crate) fn buffer_ref(&self) -> &RowBuffer {
        &self.buffer
    }
}

impl Default for ConstFetcher {
    fn default() -> Self {
        Self::new()
    }
}

//! All data rows of an input, materialized across blocks.

use aqlflow_core::Result;

use crate::manager::{BlockHandle, BlockManager};
use crate::rows::InputRow;

/// Data rows gathered up to the next shadow row or the end of input.
///
/// The matrix holds one reference on every block it spans.
#[derive(Debug, Default)]
pub struct ItemMatrix {
    blocks: Vec<BlockHandle>,
    rows: Vec<InputRow>,
}

impl ItemMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take over a reference on `block`.
    pub fn add_block(&mut self, block: BlockHandle) {
        self.blocks.push(block);
    }

    pub fn push_row(&mut self, row: InputRow) {
        self.rows.push(row);
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<InputRow> {
        self.rows.get(index).copied()
    }

    pub fn rows(&self) -> &[InputRow] {
        &self.rows
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Give back every block reference.
    pub fn release(self, blocks: &mut BlockManager) -> Result<()> {
        for block in self.blocks {
            blocks.release(block)?;
        }
        Ok(())
    }
}

//! Assemble item blocks from literal rows.

use aqlflow_core::register::RegisterId;
use aqlflow_core::value::AqlValue;
use aqlflow_core::{Error, Result};

use crate::block::ItemBlock;
use crate::manager::{BlockHandle, BlockManager};

/// Builds a block row by row. Used for literal inputs and in tests.
#[derive(Debug, Clone, Default)]
pub struct BlockBuilder {
    registers: usize,
    rows: Vec<(Vec<AqlValue>, Option<u32>)>,
}

impl BlockBuilder {
    pub fn new(registers: usize) -> Self {
        Self {
            registers,
            rows: Vec::new(),
        }
    }

    /// Append a data row. Missing trailing registers stay unwritten.
    pub fn row(mut self, values: impl IntoIterator<Item = AqlValue>) -> Self {
        self.rows.push((values.into_iter().collect(), None));
        self
    }

    /// Append a shadow row of `depth`.
    pub fn shadow(mut self, values: impl IntoIterator<Item = AqlValue>, depth: u32) -> Self {
        self.rows.push((values.into_iter().collect(), Some(depth)));
        self
    }

    pub fn push_row(&mut self, values: Vec<AqlValue>) {
        self.rows.push((values, None));
    }

    pub fn push_shadow(&mut self, values: Vec<AqlValue>, depth: u32) {
        self.rows.push((values, Some(depth)));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Materialize the block in `blocks`; the caller holds its only reference.
    pub fn build(self, blocks: &mut BlockManager) -> Result<BlockHandle> {
        if self.rows.is_empty() {
            return Err(Error::contract("cannot build a block without rows"));
        }
        let mut block = ItemBlock::new(blocks.monitor(), self.rows.len(), self.registers)?;
        for (row, (values, depth)) in self.rows.into_iter().enumerate() {
            if values.len() > self.registers {
                return Err(Error::contract(format!(
                    "row {row} has {} values for {} registers",
                    values.len(),
                    self.registers
                )));
            }
            for (reg, value) in values.into_iter().enumerate() {
                block.set_value(row, RegisterId::new(reg as u32), value)?;
            }
            if let Some(depth) = depth {
                block.set_shadow_depth(row, depth)?;
            }
        }
        block.validate_shadow_rows()?;
        Ok(blocks.insert(block))
    }
}

//! Row cursors into arena blocks.
//!
//! [`InputRow`] and [`ShadowRow`] are read-only views of one row of a block
//! owned by a fetcher. [`OutputRow`] is the write cursor over the block an
//! executor fills. All of them address blocks through the [`BlockManager`].

use std::sync::Arc;

use aqlflow_core::register::{RegisterId, RegisterSet};
use aqlflow_core::value::AqlValue;
use aqlflow_core::{Error, Result};

use crate::manager::{BlockHandle, BlockManager};
use crate::registers::RegisterInfos;

/// A data row of an upstream block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRow {
    block: BlockHandle,
    index: usize,
}

impl InputRow {
    pub fn new(block: BlockHandle, index: usize) -> Self {
        Self { block, index }
    }

    pub fn block(&self) -> BlockHandle {
        self.block
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Read a register; unwritten registers read as `null`.
    pub fn value<'a>(&self, blocks: &'a BlockManager, reg: RegisterId) -> Result<&'a AqlValue> {
        blocks.get(self.block)?.value(self.index, reg)
    }

    /// Clone the values of `regs` in order.
    pub fn values(
        &self,
        blocks: &BlockManager,
        regs: impl IntoIterator<Item = RegisterId>,
    ) -> Result<Vec<AqlValue>> {
        let block = blocks.get(self.block)?;
        regs.into_iter()
            .map(|reg| block.value(self.index, reg).cloned())
            .collect()
    }
}

/// A shadow row of an upstream block. Marks the end of one subquery
/// iteration at its depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowRow {
    block: BlockHandle,
    index: usize,
}

impl ShadowRow {
    pub fn new(block: BlockHandle, index: usize) -> Self {
        Self { block, index }
    }

    pub fn block(&self) -> BlockHandle {
        self.block
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn depth(&self, blocks: &BlockManager) -> Result<u32> {
        blocks
            .get(self.block)?
            .shadow_depth(self.index)
            .ok_or_else(|| Error::contract(format!("row {} of {} is not a shadow row", self.index, self.block)))
    }

    /// Depth 0 shadow rows close the innermost subquery.
    pub fn is_relevant(&self, blocks: &BlockManager) -> Result<bool> {
        Ok(self.depth(blocks)? == 0)
    }

    pub fn value<'a>(&self, blocks: &'a BlockManager, reg: RegisterId) -> Result<&'a AqlValue> {
        blocks.get(self.block)?.value(self.index, reg)
    }
}

/// An input row whose block is kept alive past the fetcher's own lifetime
/// for it. Must be given back with [`PinnedRow::unpin`].
#[derive(Debug, PartialEq, Eq)]
pub struct PinnedRow {
    row: InputRow,
}

impl PinnedRow {
    pub fn pin(blocks: &mut BlockManager, row: InputRow) -> Result<Self> {
        blocks.retain(row.block())?;
        Ok(Self { row })
    }

    pub fn row(&self) -> InputRow {
        self.row
    }

    pub fn unpin(self, blocks: &mut BlockManager) -> Result<()> {
        blocks.release(self.row.block())
    }
}

/// Write cursor over an output block.
///
/// A row counts as produced once every writable register is set and the
/// kept registers of its source row were copied. Only then may the cursor
/// advance.
#[derive(Debug)]
pub struct OutputRow {
    block: BlockHandle,
    capacity: usize,
    infos: Arc<RegisterInfos>,
    base_index: usize,
    values_written: usize,
    row_copied: bool,
}

impl OutputRow {
    /// Allocate an output block of `rows` rows shaped by `infos`.
    pub fn allocate(blocks: &mut BlockManager, rows: usize, infos: Arc<RegisterInfos>) -> Result<Self> {
        let block = blocks.allocate(rows, infos.output_registers())?;
        Ok(Self {
            block,
            capacity: rows,
            infos,
            base_index: 0,
            values_written: 0,
            row_copied: false,
        })
    }

    pub fn block(&self) -> BlockHandle {
        self.block
    }

    pub fn infos(&self) -> &RegisterInfos {
        &self.infos
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.base_index >= self.capacity
    }

    /// Completed rows.
    pub fn rows_written(&self) -> usize {
        self.base_index
    }

    pub fn rows_left(&self) -> usize {
        self.capacity - self.base_index
    }

    /// Whether the current row is complete.
    pub fn produced(&self) -> bool {
        self.row_copied && self.values_written == self.infos.writable().len()
    }

    fn ensure_room(&self) -> Result<()> {
        if self.is_full() {
            return Err(Error::contract(format!(
                "output block {} is full ({} rows)",
                self.block, self.capacity
            )));
        }
        Ok(())
    }

    /// Write an output register of the current row.
    ///
    /// Once every writable register is set the kept registers of `source` are
    /// copied in.
    pub fn set_value(
        &mut self,
        blocks: &mut BlockManager,
        reg: RegisterId,
        source: &InputRow,
        value: AqlValue,
    ) -> Result<()> {
        if !self.infos.is_writable(reg) {
            return Err(Error::contract(format!("register {reg} is not an output register")));
        }
        self.ensure_room()?;
        blocks.get_mut(self.block)?.set_value(self.base_index, reg, value)?;
        self.values_written += 1;
        if self.values_written == self.infos.writable().len() {
            self.copy_row(blocks, source)?;
        }
        Ok(())
    }

    /// Write an output register of a row that has no source row, e.g. the
    /// aggregate row of an empty input. Nothing is copied through.
    pub fn set_detached_value(
        &mut self,
        blocks: &mut BlockManager,
        reg: RegisterId,
        value: AqlValue,
    ) -> Result<()> {
        if !self.infos.is_writable(reg) {
            return Err(Error::contract(format!("register {reg} is not an output register")));
        }
        self.ensure_room()?;
        blocks.get_mut(self.block)?.set_value(self.base_index, reg, value)?;
        self.values_written += 1;
        if self.values_written == self.infos.writable().len() {
            self.row_copied = true;
        }
        Ok(())
    }

    /// Copy the kept registers of `source` into the current row. Idempotent
    /// per row.
    pub fn copy_row(&mut self, blocks: &mut BlockManager, source: &InputRow) -> Result<()> {
        if self.row_copied {
            return Ok(());
        }
        self.ensure_room()?;
        let infos = Arc::clone(&self.infos);
        self.copy_registers(blocks, source.block(), source.index(), infos.keep_for_data())?;
        self.row_copied = true;
        Ok(())
    }

    /// Turn a data row into a depth-0 shadow row.
    pub fn create_shadow_row(&mut self, blocks: &mut BlockManager, source: &InputRow) -> Result<()> {
        self.ensure_room()?;
        if self.values_written > 0 || self.row_copied {
            return Err(Error::contract("shadow row written over a partial row"));
        }
        let infos = Arc::clone(&self.infos);
        self.copy_registers(blocks, source.block(), source.index(), infos.keep_for_data())?;
        self.finish_shadow_row(blocks, 0)
    }

    /// Forward a shadow row at its depth.
    pub fn copy_shadow_row(&mut self, blocks: &mut BlockManager, shadow: &ShadowRow) -> Result<()> {
        let depth = shadow.depth(blocks)?;
        self.write_shadow_row(blocks, shadow, depth)
    }

    /// Forward a shadow row one subquery level deeper.
    pub fn increase_shadow_depth(&mut self, blocks: &mut BlockManager, shadow: &ShadowRow) -> Result<()> {
        let depth = shadow.depth(blocks)?;
        self.write_shadow_row(blocks, shadow, depth + 1)
    }

    /// Forward a non-relevant shadow row one subquery level up.
    pub fn decrease_shadow_depth(&mut self, blocks: &mut BlockManager, shadow: &ShadowRow) -> Result<()> {
        let depth = shadow.depth(blocks)?;
        if depth == 0 {
            return Err(Error::contract("cannot decrease the depth of a relevant shadow row"));
        }
        self.write_shadow_row(blocks, shadow, depth - 1)
    }

    /// Turn a relevant shadow row back into a data row carrying `value` in `reg`.
    pub fn consume_shadow_row(
        &mut self,
        blocks: &mut BlockManager,
        reg: RegisterId,
        shadow: &ShadowRow,
        value: AqlValue,
    ) -> Result<()> {
        if !shadow.is_relevant(blocks)? {
            return Err(Error::contract("only a relevant shadow row can be consumed"));
        }
        if !self.infos.is_writable(reg) {
            return Err(Error::contract(format!("register {reg} is not an output register")));
        }
        self.ensure_room()?;
        let infos = Arc::clone(&self.infos);
        self.copy_registers(blocks, shadow.block(), shadow.index(), infos.keep_for_shadow(0))?;
        blocks.get_mut(self.block)?.set_value(self.base_index, reg, value)?;
        self.values_written = infos.writable().len();
        self.row_copied = true;
        Ok(())
    }

    fn write_shadow_row(&mut self, blocks: &mut BlockManager, shadow: &ShadowRow, depth: u32) -> Result<()> {
        self.ensure_room()?;
        if self.values_written > 0 || self.row_copied {
            return Err(Error::contract("shadow row written over a partial row"));
        }
        let infos = Arc::clone(&self.infos);
        let source_depth = shadow.depth(blocks)?;
        self.copy_registers(
            blocks,
            shadow.block(),
            shadow.index(),
            infos.keep_for_shadow(source_depth),
        )?;
        self.finish_shadow_row(blocks, depth)
    }

    fn finish_shadow_row(&mut self, blocks: &mut BlockManager, depth: u32) -> Result<()> {
        blocks.get_mut(self.block)?.set_shadow_depth(self.base_index, depth)?;
        // Shadow rows carry no output values.
        self.values_written = self.infos.writable().len();
        self.row_copied = true;
        Ok(())
    }

    fn copy_registers(
        &mut self,
        blocks: &mut BlockManager,
        source: BlockHandle,
        index: usize,
        regs: &RegisterSet,
    ) -> Result<()> {
        let mut values = Vec::with_capacity(regs.len());
        {
            let src = blocks.get(source)?;
            for reg in regs.iter() {
                if let Some(v) = src.get(index, reg)? {
                    values.push((reg, v.clone()));
                }
            }
        }
        let dst = blocks.get_mut(self.block)?;
        for (reg, v) in values {
            dst.set_value(self.base_index, reg, v)?;
        }
        Ok(())
    }

    /// Move to the next row. The current row must be produced.
    pub fn advance_row(&mut self) -> Result<()> {
        if !self.produced() {
            return Err(Error::contract(format!(
                "advancing past row {} before it was produced",
                self.base_index
            )));
        }
        self.base_index += 1;
        self.values_written = 0;
        self.row_copied = false;
        Ok(())
    }

    /// Hand the block downstream, trimmed to the rows written.
    ///
    /// Returns `None` and frees the block when nothing was written.
    pub fn take_block(self, blocks: &mut BlockManager) -> Result<Option<BlockHandle>> {
        if self.values_written > 0 || self.row_copied {
            return Err(Error::contract(format!(
                "row {} of {} left half written",
                self.base_index, self.block
            )));
        }
        if self.base_index == 0 {
            blocks.release(self.block)?;
            return Ok(None);
        }
        if self.base_index < self.capacity {
            blocks.get_mut(self.block)?.shrink(self.base_index)?;
        }
        Ok(Some(self.block))
    }

    /// Drop the block without handing it on.
    pub fn discard(self, blocks: &mut BlockManager) -> Result<()> {
        blocks.release(self.block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BlockBuilder;
    use serde_json::json;

    fn infos() -> Arc<RegisterInfos> {
        Arc::new(
            RegisterInfos::new(
                2,
                3,
                RegisterSet::from([2]),
                vec![RegisterSet::from([0, 1]), RegisterSet::from([0])],
            )
            .unwrap(),
        )
    }

    #[test]
    fn set_value_copies_kept_registers() {
        let mut blocks = BlockManager::default();
        let input = BlockBuilder::new(2)
            .row([json!(1), json!("a")])
            .build(&mut blocks)
            .unwrap();
        let source = InputRow::new(input, 0);
        let mut out = OutputRow::allocate(&mut blocks, 2, infos()).unwrap();

        assert!(!out.produced());
        out.set_value(&mut blocks, RegisterId::new(2), &source, json!(true)).unwrap();
        assert!(out.produced());
        out.advance_row().unwrap();

        let handle = out.take_block(&mut blocks).unwrap().unwrap();
        let block = blocks.get(handle).unwrap();
        assert_eq!(block.num_rows(), 1);
        assert_eq!(block.value(0, RegisterId::new(0)).unwrap(), &json!(1));
        assert_eq!(block.value(0, RegisterId::new(1)).unwrap(), &json!("a"));
        assert_eq!(block.value(0, RegisterId::new(2)).unwrap(), &json!(true));
    }

    #[test]
    fn writing_a_foreign_register_is_rejected() {
        let mut blocks = BlockManager::default();
        let input = BlockBuilder::new(2).row([json!(1), json!(2)]).build(&mut blocks).unwrap();
        let mut out = OutputRow::allocate(&mut blocks, 1, infos()).unwrap();
        let err = out
            .set_value(&mut blocks, RegisterId::new(0), &InputRow::new(input, 0), json!(0))
            .unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
    }

    #[test]
    fn advancing_before_produced_is_rejected() {
        let mut blocks = BlockManager::default();
        let mut out = OutputRow::allocate(&mut blocks, 1, infos()).unwrap();
        assert!(out.advance_row().is_err());
    }

    #[test]
    fn shadow_rows_use_their_keep_level() {
        let mut blocks = BlockManager::default();
        let input = BlockBuilder::new(2)
            .shadow([json!("x"), json!("y")], 1)
            .shadow([json!("p"), json!("q")], 0)
            .build(&mut blocks)
            .unwrap();
        let mut out = OutputRow::allocate(&mut blocks, 2, infos()).unwrap();

        out.decrease_shadow_depth(&mut blocks, &ShadowRow::new(input, 0)).unwrap();
        out.advance_row().unwrap();
        out.consume_shadow_row(&mut blocks, RegisterId::new(2), &ShadowRow::new(input, 1), json!([]))
            .unwrap();
        out.advance_row().unwrap();

        let handle = out.take_block(&mut blocks).unwrap().unwrap();
        let block = blocks.get(handle).unwrap();
        assert_eq!(block.shadow_depth(0), Some(0));
        assert_eq!(block.value(0, RegisterId::new(0)).unwrap(), &json!("x"));
        assert_eq!(block.get(0, RegisterId::new(1)).unwrap(), None);
        assert!(!block.is_shadow_row(1));
        assert_eq!(block.value(1, RegisterId::new(0)).unwrap(), &json!("p"));
        assert_eq!(block.value(1, RegisterId::new(2)).unwrap(), &json!([]));
    }

    #[test]
    fn empty_output_releases_its_block() {
        let mut blocks = BlockManager::default();
        let out = OutputRow::allocate(&mut blocks, 4, infos()).unwrap();
        assert_eq!(blocks.live_blocks(), 1);
        assert_eq!(out.take_block(&mut blocks).unwrap(), None);
        assert_eq!(blocks.live_blocks(), 0);
    }

    #[test]
    fn pinned_rows_keep_blocks_alive() {
        let mut blocks = BlockManager::default();
        let input = BlockBuilder::new(1).row([json!(7)]).build(&mut blocks).unwrap();
        let pinned = PinnedRow::pin(&mut blocks, InputRow::new(input, 0)).unwrap();
        blocks.release(input).unwrap();
        assert_eq!(pinned.row().value(&blocks, RegisterId::new(0)).unwrap(), &json!(7));
        pinned.unpin(&mut blocks).unwrap();
        assert_eq!(blocks.live_blocks(), 0);
    }
}

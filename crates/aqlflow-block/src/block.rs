//! The columnar item block.

use std::mem::size_of;

use aqlflow_core::register::RegisterId;
use aqlflow_core::value::{self, AqlValue};
use aqlflow_core::{Error, Result};
use aqlflow_mem::{Reservation, ResourceMonitor};

/// Bytes reserved per cell regardless of content.
pub const CELL_BYTES: usize = size_of::<Option<AqlValue>>();
/// Bytes reserved per row for shadow-row metadata.
pub const ROW_META_BYTES: usize = size_of::<Option<u32>>();

static NULL_VALUE: AqlValue = AqlValue::Null;

/// A `rows × registers` grid of dynamically-typed values.
///
/// Cells are write-once: a written cell is never rewritten within the block.
/// Each row may be marked as a shadow row with a subquery depth
/// (0 = innermost boundary).
pub struct ItemBlock {
    rows: usize,
    registers: usize,
    cells: Vec<Option<AqlValue>>,
    shadow_depths: Vec<Option<u32>>,
    reservation: Reservation,
}

impl ItemBlock {
    /// Allocate an empty block, reserving its fixed footprint on `monitor`.
    pub fn new(monitor: &ResourceMonitor, rows: usize, registers: usize) -> Result<Self> {
        let bytes = Self::footprint(rows, registers);
        let reservation = monitor.reserve(bytes, "item_block")?;
        Ok(Self {
            rows,
            registers,
            cells: vec![None; rows * registers],
            shadow_depths: vec![None; rows],
            reservation,
        })
    }

    /// Fixed bytes a block of this shape reserves before any value is written.
    pub fn footprint(rows: usize, registers: usize) -> usize {
        rows * registers * CELL_BYTES + rows * ROW_META_BYTES
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_registers(&self) -> usize {
        self.registers
    }

    /// Bytes currently accounted for this block.
    pub fn memory_bytes(&self) -> usize {
        use aqlflow_core::budget::BudgetGuard;
        self.reservation.bytes()
    }

    fn offset(&self, row: usize, reg: RegisterId) -> Result<usize> {
        if row >= self.rows {
            return Err(Error::contract(format!(
                "row {row} out of range for block with {} rows",
                self.rows
            )));
        }
        if reg.index() >= self.registers {
            return Err(Error::contract(format!(
                "register {reg} out of range for block with {} registers",
                self.registers
            )));
        }
        Ok(row * self.registers + reg.index())
    }

    /// The cell content, `None` if never written.
    pub fn get(&self, row: usize, reg: RegisterId) -> Result<Option<&AqlValue>> {
        let off = self.offset(row, reg)?;
        Ok(self.cells[off].as_ref())
    }

    /// The cell content with unwritten cells reading as `null`.
    pub fn value(&self, row: usize, reg: RegisterId) -> Result<&AqlValue> {
        Ok(self.get(row, reg)?.unwrap_or(&NULL_VALUE))
    }

    /// Write a cell. Writing an already written cell is a contract violation.
    pub fn set_value(&mut self, row: usize, reg: RegisterId, value: AqlValue) -> Result<()> {
        let off = self.offset(row, reg)?;
        if self.cells[off].is_some() {
            return Err(Error::contract(format!(
                "register {reg} of row {row} written twice"
            )));
        }
        self.reservation.grow(value::memory_usage(&value))?;
        self.cells[off] = Some(value);
        Ok(())
    }

    /// Mark `row` as a shadow row of `depth`.
    pub fn set_shadow_depth(&mut self, row: usize, depth: u32) -> Result<()> {
        let slot = self
            .shadow_depths
            .get_mut(row)
            .ok_or_else(|| Error::contract(format!("shadow row {row} out of range")))?;
        if slot.is_some() {
            return Err(Error::contract(format!("row {row} marked as shadow row twice")));
        }
        *slot = Some(depth);
        Ok(())
    }

    pub fn is_shadow_row(&self, row: usize) -> bool {
        matches!(self.shadow_depths.get(row), Some(Some(_)))
    }

    pub fn shadow_depth(&self, row: usize) -> Option<u32> {
        self.shadow_depths.get(row).copied().flatten()
    }

    pub fn has_shadow_rows(&self) -> bool {
        self.shadow_depths.iter().any(Option::is_some)
    }

    /// Number of shadow rows in this block.
    pub fn count_shadow_rows(&self) -> usize {
        self.shadow_depths.iter().filter(|d| d.is_some()).count()
    }

    /// Drop all rows from `rows` on, giving their bytes back to the monitor.
    pub fn shrink(&mut self, rows: usize) -> Result<()> {
        if rows > self.rows {
            return Err(Error::contract(format!(
                "cannot grow block from {} to {rows} rows",
                self.rows
            )));
        }
        let mut freed = Self::footprint(self.rows, self.registers) - Self::footprint(rows, self.registers);
        for cell in self.cells.drain(rows * self.registers..) {
            if let Some(v) = cell {
                freed += value::memory_usage(&v);
            }
        }
        self.shadow_depths.truncate(rows);
        self.rows = rows;
        self.reservation.shrink(freed);
        Ok(())
    }

    /// Check that shadow-row depths describe a well-formed stack of subquery exits.
    ///
    /// A shadow row of depth `d > 0` that does not start the block must directly
    /// follow a shadow row of depth `>= d - 1`.
    pub fn validate_shadow_rows(&self) -> Result<()> {
        for row in 1..self.rows {
            let Some(depth) = self.shadow_depth(row) else {
                continue;
            };
            if depth == 0 {
                continue;
            }
            match self.shadow_depth(row - 1) {
                Some(prev) if prev + 1 >= depth => {}
                Some(prev) => {
                    return Err(Error::contract(format!(
                        "shadow row {row} of depth {depth} follows shadow row of depth {prev}"
                    )))
                }
                None => {
                    return Err(Error::contract(format!(
                        "shadow row {row} of depth {depth} follows a data row"
                    )))
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ItemBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemBlock")
            .field("rows", &self.rows)
            .field("registers", &self.registers)
            .field("shadow_rows", &self.count_shadow_rows())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_are_write_once() {
        let monitor = ResourceMonitor::unlimited();
        let mut block = ItemBlock::new(&monitor, 2, 2).unwrap();
        block.set_value(0, RegisterId::new(1), json!(1)).unwrap();
        let err = block.set_value(0, RegisterId::new(1), json!(2)).unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
        assert_eq!(block.value(0, RegisterId::new(1)).unwrap(), &json!(1));
        assert_eq!(block.value(1, RegisterId::new(0)).unwrap(), &json!(null));
    }

    #[test]
    fn reservation_tracks_values_and_shrink() {
        let monitor = ResourceMonitor::unlimited();
        let mut block = ItemBlock::new(&monitor, 4, 1).unwrap();
        let base = ItemBlock::footprint(4, 1);
        assert_eq!(monitor.used_bytes(), base);
        block
            .set_value(3, RegisterId::new(0), json!("a long enough string"))
            .unwrap();
        assert!(monitor.used_bytes() > base);
        block.shrink(1).unwrap();
        assert_eq!(monitor.used_bytes(), ItemBlock::footprint(1, 1));
        drop(block);
        assert_eq!(monitor.used_bytes(), 0);
    }

    #[test]
    fn allocation_beyond_limit_fails() {
        let monitor = ResourceMonitor::new(ItemBlock::footprint(10, 1));
        let _first = ItemBlock::new(&monitor, 10, 1).unwrap();
        let err = ItemBlock::new(&monitor, 1, 1).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
    }

    #[test]
    fn shadow_row_depth_validation() {
        let monitor = ResourceMonitor::unlimited();
        let mut ok = ItemBlock::new(&monitor, 4, 1).unwrap();
        ok.set_shadow_depth(1, 0).unwrap();
        ok.set_shadow_depth(2, 1).unwrap();
        ok.set_shadow_depth(3, 1).unwrap();
        ok.validate_shadow_rows().unwrap();

        let mut bad = ItemBlock::new(&monitor, 2, 1).unwrap();
        bad.set_shadow_depth(1, 1).unwrap();
        assert!(bad.validate_shadow_rows().is_err());
    }
}

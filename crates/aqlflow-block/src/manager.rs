//! Arena that owns every live item block of a pipeline.
//!
//! Stages never hold blocks directly. They hold a [`BlockHandle`] and go through
//! the manager, which hands out shared access via explicit reference counts.
//! A handle carries the generation of its slot, so a stale handle to a released
//! and reused slot is detected instead of aliasing the new block.

use std::fmt;

use aqlflow_core::{Error, Result};
use aqlflow_mem::ResourceMonitor;

use crate::block::ItemBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}.{}", self.index, self.generation)
    }
}

struct Entry {
    block: ItemBlock,
    refs: usize,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

pub struct BlockManager {
    monitor: ResourceMonitor,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    allocated_total: u64,
}

impl BlockManager {
    pub fn new(monitor: ResourceMonitor) -> Self {
        Self {
            monitor,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            allocated_total: 0,
        }
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    /// Allocate a fresh empty block with one reference held by the caller.
    pub fn allocate(&mut self, rows: usize, registers: usize) -> Result<BlockHandle> {
        if rows == 0 {
            return Err(Error::contract("cannot allocate a block without rows"));
        }
        let block = ItemBlock::new(&self.monitor, rows, registers)?;
        Ok(self.insert(block))
    }

    /// Take ownership of an already built block.
    pub fn insert(&mut self, block: ItemBlock) -> BlockHandle {
        let entry = Entry { block, refs: 1 };
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.entry = Some(entry);
        self.live += 1;
        self.allocated_total += 1;
        let handle = BlockHandle {
            index,
            generation: slot.generation,
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(block = %handle, live = self.live, "block allocated");
        handle
    }

    fn entry(&self, handle: BlockHandle) -> Result<&Entry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or_else(|| Error::contract(format!("stale or unknown {handle}")))
    }

    fn entry_mut(&mut self, handle: BlockHandle) -> Result<&mut Entry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or_else(|| Error::contract(format!("stale or unknown {handle}")))
    }

    pub fn get(&self, handle: BlockHandle) -> Result<&ItemBlock> {
        Ok(&self.entry(handle)?.block)
    }

    /// Mutable access. Only a block with a single holder may be written.
    pub fn get_mut(&mut self, handle: BlockHandle) -> Result<&mut ItemBlock> {
        let entry = self.entry_mut(handle)?;
        if entry.refs > 1 {
            return Err(Error::contract(format!(
                "{handle} is shared by {} holders and cannot be written",
                entry.refs
            )));
        }
        Ok(&mut entry.block)
    }

    /// Add a holder.
    pub fn retain(&mut self, handle: BlockHandle) -> Result<()> {
        self.entry_mut(handle)?.refs += 1;
        Ok(())
    }

    /// Drop a holder; the block is freed with its last holder.
    pub fn release(&mut self, handle: BlockHandle) -> Result<()> {
        let entry = self.entry_mut(handle)?;
        entry.refs -= 1;
        if entry.refs > 0 {
            return Ok(());
        }
        let slot = &mut self.slots[handle.index as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        #[cfg(feature = "tracing")]
        tracing::trace!(block = %handle, live = self.live, "block released");
        Ok(())
    }

    pub fn ref_count(&self, handle: BlockHandle) -> Result<usize> {
        Ok(self.entry(handle)?.refs)
    }

    /// Blocks currently alive.
    pub fn live_blocks(&self) -> usize {
        self.live
    }

    /// Blocks allocated over the manager's lifetime.
    pub fn allocated_total(&self) -> u64 {
        self.allocated_total
    }
}

impl Default for BlockManager {
    fn default() -> Self {
        Self::new(ResourceMonitor::unlimited())
    }
}

impl fmt::Debug for BlockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockManager")
            .field("live", &self.live)
            .field("allocated_total", &self.allocated_total)
            .field("used_bytes", &self.monitor.used_bytes())
            .finish()
    }
}

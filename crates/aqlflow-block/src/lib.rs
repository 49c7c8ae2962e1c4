#![forbid(unsafe_code)]
//! aqlflow-block: the row/block data model.
//!
//! - [`ItemBlock`]: a `rows × registers` grid of write-once cells plus shadow-row depths.
//! - [`BlockManager`]: the arena owning every live block; stages refer to blocks
//!   by [`BlockHandle`] and share them through explicit reference counts.
//! - [`InputRow`], [`ShadowRow`], [`OutputRow`]: cursors into arena blocks.
//! - [`RegisterInfos`]: which registers a stage writes and which it copies through.
//!
//! Every block reserves its bytes on the query's `ResourceMonitor`; the
//! reservation is released when the arena drops the block.

pub mod block;
pub mod builder;
pub mod context;
pub mod manager;
pub mod matrix;
pub mod registers;
pub mod rows;

pub use block::ItemBlock;
pub use builder::BlockBuilder;
pub use context::ExecContext;
pub use manager::{BlockHandle, BlockManager};
pub use matrix::ItemMatrix;
pub use registers::RegisterInfos;
pub use rows::{InputRow, OutputRow, PinnedRow, ShadowRow};

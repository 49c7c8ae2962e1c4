#![forbid(unsafe_code)]
//! aqlflow-core: the vocabulary shared by every stage of the execution pipeline.
//!
//! Values, register addressing, the tri-state execution protocol, per-stage
//! statistics, the typed query error, engine configuration, and the per-query
//! context (kill flag, warnings). No blocks, allocators or executors live here.

pub mod budget;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod query;
pub mod register;
pub mod state;
pub mod stats;
pub mod value;

pub use error::{Error, Result};

/// Engine version string recorded in query reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::id::StageId;
pub use crate::query::{QueryContext, QueryId, Warning};
pub use crate::register::{RegisterId, RegisterSet};
pub use crate::state::ExecutionState;
pub use crate::stats::ExecutionStats;
pub use crate::value::AqlValue;

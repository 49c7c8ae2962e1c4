//! Per-query context shared by every stage of one pipeline.
//!
//! Holds the cooperative kill flag, the warning list and the configuration.
//! Stages receive it behind an `Arc`; nothing here is global.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub Uuid);

impl QueryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-fatal problem recorded while the query keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: u32,
    pub message: String,
}

pub struct QueryContext {
    id: QueryId,
    config: EngineConfig,
    killed: AtomicBool,
    warnings: Mutex<Vec<Warning>>,
    warnings_seen: AtomicUsize,
}

impl QueryContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            id: QueryId::generate(),
            config,
            killed: AtomicBool::new(false),
            warnings: Mutex::new(Vec::new()),
            warnings_seen: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Request cooperative cancellation.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if the query was killed.
    pub fn check_killed(&self) -> Result<()> {
        if self.is_killed() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Record a warning. With `fail_on_warning` the warning is returned as an error instead.
    pub fn register_warning(&self, code: u32, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        if self.config.fail_on_warning {
            return Err(Error::BadParameter(message));
        }
        self.warnings_seen.fetch_add(1, Ordering::Relaxed);
        let mut warnings = self
            .warnings
            .lock()
            .map_err(|_| Error::contract("warning list poisoned"))?;
        if warnings.len() < self.config.max_warnings {
            warnings.push(Warning { code, message });
        }
        Ok(())
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// Warnings registered, including those beyond `max_warnings`.
    pub fn warnings_seen(&self) -> usize {
        self.warnings_seen.load(Ordering::Relaxed)
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

//! Engine configuration that downstream crates can serialize/deserialize.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ceiling for bytes reserved by item blocks and executor state. 0 disables the ceiling.
    pub memory_limit_bytes: usize,

    /// Rows per output block handed downstream.
    pub batch_size: usize,

    /// Depth used for traversals configured without an upper bound.
    pub max_traversal_depth: usize,

    /// Turn every registered query warning into a query failure.
    pub fail_on_warning: bool,

    /// Warnings kept per query; further warnings are counted but dropped.
    pub max_warnings: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 512 * 1024 * 1024, // 512 MiB default
            batch_size: 1000,
            max_traversal_depth: 100,
            fail_on_warning: false,
            max_warnings: 10,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults
    /// for unset ones. A set but unparsable value is a `BAD_PARAMETER` error.
    ///
    /// Environment variables:
    /// - `AQLFLOW_MEMORY_LIMIT_BYTES`: resource monitor ceiling in bytes
    /// - `AQLFLOW_BATCH_SIZE`: rows per output block
    /// - `AQLFLOW_MAX_TRAVERSAL_DEPTH`: cap for unbounded traversals
    /// - `AQLFLOW_FAIL_ON_WARNING`: `true`/`false`
    /// - `AQLFLOW_MAX_WARNINGS`: warnings kept per query
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        env_override("AQLFLOW_MEMORY_LIMIT_BYTES", &mut cfg.memory_limit_bytes)?;
        env_override("AQLFLOW_BATCH_SIZE", &mut cfg.batch_size)?;
        env_override("AQLFLOW_MAX_TRAVERSAL_DEPTH", &mut cfg.max_traversal_depth)?;
        env_override("AQLFLOW_FAIL_ON_WARNING", &mut cfg.fail_on_warning)?;
        env_override("AQLFLOW_MAX_WARNINGS", &mut cfg.max_warnings)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::BadParameter("batch_size must be > 0".into()));
        }
        if self.max_traversal_depth == 0 {
            return Err(Error::BadParameter("max_traversal_depth must be > 0".into()));
        }
        Ok(())
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }
}

fn env_override<T>(name: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(name) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|e| Error::BadParameter(format!("{name}={raw:?}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    // Each test owns the variables it sets; tests run in parallel.

    #[test]
    fn env_values_override_defaults() {
        std::env::set_var("AQLFLOW_TEST_OVERRIDE_ROWS", " 64 ");
        let mut rows = 1000usize;
        env_override("AQLFLOW_TEST_OVERRIDE_ROWS", &mut rows).unwrap();
        assert_eq!(rows, 64);

        let mut untouched = 7usize;
        env_override("AQLFLOW_TEST_OVERRIDE_UNSET", &mut untouched).unwrap();
        assert_eq!(untouched, 7);
    }

    #[test]
    fn unparsable_env_value_is_a_bad_parameter() {
        std::env::set_var("AQLFLOW_TEST_BAD_ROWS", "abc");
        let mut rows = 1000usize;
        let err = env_override("AQLFLOW_TEST_BAD_ROWS", &mut rows).unwrap_err();
        assert!(matches!(err, Error::BadParameter(ref m) if m.contains("AQLFLOW_TEST_BAD_ROWS")), "{err}");
        assert_eq!(err.code(), codes::BAD_PARAMETER);
        assert_eq!(rows, 1000);

        std::env::set_var("AQLFLOW_TEST_BAD_FLAG", "yes");
        let mut flag = false;
        assert!(env_override("AQLFLOW_TEST_BAD_FLAG", &mut flag).is_err());
    }

    #[test]
    fn zero_batch_or_depth_is_rejected() {
        assert!(EngineConfig::default().validate().is_ok());
        let err = EngineConfig::default().with_batch_size(0).validate().unwrap_err();
        assert_eq!(err.code(), codes::BAD_PARAMETER);
        let config = EngineConfig {
            max_traversal_depth: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::BadParameter(_))));
    }
}

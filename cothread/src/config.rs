//!
//! Runtime Configuration
//!
//! Defaults applied to every thread a runtime creates. Values can be set
//! programmatically or read from the environment:
//!
//! - `COTHREAD_STACK_SIZE` - default native stack size in bytes
//! - `COTHREAD_THREAD_PREFIX` - prefix for native thread names
//!

use crate::error::{Error, Result};

pub const ENV_STACK_SIZE: &str = "COTHREAD_STACK_SIZE";
pub const ENV_THREAD_PREFIX: &str = "COTHREAD_THREAD_PREFIX";

const DEFAULT_PREFIX: &str = "cothread";

/// Smallest stack size accepted from configuration.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub stack_size: Option<usize>,
    pub name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_size: None,
            name_prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl Config {
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(raw) = lookup(ENV_STACK_SIZE) {
            let bytes: usize = raw.trim().parse().map_err(|e| Error::InvalidConfig {
                key: ENV_STACK_SIZE,
                reason: format!("'{}': {}", raw, e),
            })?;
            if bytes < MIN_STACK_SIZE {
                return Err(Error::InvalidConfig {
                    key: ENV_STACK_SIZE,
                    reason: format!("{} is below the minimum of {}", bytes, MIN_STACK_SIZE),
                });
            }
            config.stack_size = Some(bytes);
        }

        if let Some(prefix) = lookup(ENV_THREAD_PREFIX) {
            if prefix.contains('\0') {
                return Err(Error::InvalidConfig {
                    key: ENV_THREAD_PREFIX,
                    reason: "contains a NUL byte".to_string(),
                });
            }
            config.name_prefix = prefix;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.name_prefix, "cothread");
        assert_eq!(config.stack_size, None);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_STACK_SIZE, "262144"),
            (ENV_THREAD_PREFIX, "worker"),
        ]))
        .unwrap();
        assert_eq!(config.stack_size, Some(262144));
        assert_eq!(config.name_prefix, "worker");
    }

    #[test]
    fn test_invalid_stack_size() {
        let err = Config::from_lookup(lookup_from(&[(ENV_STACK_SIZE, "lots")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { key: ENV_STACK_SIZE, .. }));

        let err = Config::from_lookup(lookup_from(&[(ENV_STACK_SIZE, "1024")])).unwrap_err();
        assert!(err.to_string().contains("below the minimum"));
    }

    #[test]
    fn test_builder() {
        let config = Config::default().stack_size(1 << 20).name_prefix("io");
        assert_eq!(config.stack_size, Some(1 << 20));
        assert_eq!(config.name_prefix, "io");
    }
}

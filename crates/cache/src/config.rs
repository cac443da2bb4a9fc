use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sizing and behaviour of a [`RenderCache`](crate::RenderCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held in process memory.
    pub memory_capacity: usize,
    /// Number of entries the durable tier settles back to after a cleanup pass.
    pub durable_capacity: u64,
    /// Write the access time back to the durable tier on every durable hit.
    ///
    /// Off by default: every read would become a write. Without it, durable
    /// eviction order drifts towards insertion order.
    pub refresh_on_read: bool,
    /// How long after a write the background cleanup pass starts, so that a
    /// burst of writes is followed by a single pass.
    pub cleanup_delay_ms: u64,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 100,
            durable_capacity: 1000,
            refresh_on_read: false,
            cleanup_delay_ms: 1000,
        }
    }
}
impl CacheConfig {
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_capacity == 0 {
            exn::bail!(ErrorKind::InvalidConfig("memory_capacity must be at least 1"));
        }
        if self.durable_capacity == 0 {
            exn::bail!(ErrorKind::InvalidConfig("durable_capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        CacheConfig::default().validate().unwrap();
        assert_eq!(CacheConfig::default().cleanup_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_capacity_is_invalid() {
        let config = CacheConfig { memory_capacity: 0, ..Default::default() };
        assert!(matches!(&*config.validate().unwrap_err(), ErrorKind::InvalidConfig(_)));
        let config = CacheConfig { durable_capacity: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"memory_capacity": 5}"#).unwrap();
        assert_eq!(config.memory_capacity, 5);
        assert_eq!(config.durable_capacity, 1000);
        assert!(!config.refresh_on_read);
    }
}

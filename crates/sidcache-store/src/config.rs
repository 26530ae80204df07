//! Configuration for the store
//!
//! Two presets cover the cases the cache daemon needs: a relaxed one where
//! losing the last few writes on power failure is acceptable (the data can
//! always be fetched from the directory again), and a durable one for
//! deployments that serve logons from the cache while disconnected.

use serde::Deserialize;

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum key size in bytes
    pub max_key_size: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
    /// fsync the journal after every write
    pub durable_writes: bool,
    /// Compact on open when dead journal space exceeds this ratio
    pub compaction_trigger_ratio: f64,
}

impl StoreConfig {
    /// Page-cache writes, compaction at 50% dead space.
    pub fn relaxed() -> Self {
        Self {
            max_key_size: 16 * 1024,
            max_value_size: 16 * 1024 * 1024,
            durable_writes: false,
            compaction_trigger_ratio: 0.5,
        }
    }

    /// fsync per write, compaction at 30% dead space.
    pub fn durable() -> Self {
        Self {
            max_key_size: 16 * 1024,
            max_value_size: 16 * 1024 * 1024,
            durable_writes: true,
            compaction_trigger_ratio: 0.3,
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_key_size == 0 || self.max_key_size > crate::format::MAX_KEY_SIZE {
            return Err(format!("max_key_size must be in [1, {}]", crate::format::MAX_KEY_SIZE));
        }
        if self.max_value_size == 0 || self.max_value_size > crate::format::MAX_VALUE_SIZE {
            return Err(format!("max_value_size must be in [1, {}]", crate::format::MAX_VALUE_SIZE));
        }
        if self.compaction_trigger_ratio <= 0.0 || self.compaction_trigger_ratio >= 1.0 {
            return Err("compaction_trigger_ratio must be in (0.0, 1.0)".into());
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self { Self::relaxed() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_valid() {
        assert!(StoreConfig::relaxed().validate().is_ok());
        assert!(StoreConfig::durable().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let mut config = StoreConfig::default();
        config.compaction_trigger_ratio = 1.0;
        assert!(config.validate().is_err());
        config.compaction_trigger_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_key_size() {
        let config = StoreConfig { max_key_size: 0, ..StoreConfig::default() };
        assert!(config.validate().is_err());
    }
}

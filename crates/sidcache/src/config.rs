//! Cache configuration, loadable from TOML.
//!
//! ```toml
//! path = "/var/lib/sidcache/cache.journal"
//! cache_time_secs = 300
//! offline_logon = true
//!
//! [store]
//! durable_writes = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use sidcache_store::StoreConfig;

use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Journal file of the cache store
    pub path: PathBuf,
    /// How long a domain's sequence number is trusted before asking again
    pub cache_time_secs: u64,
    /// Store size above which failure records are flushed
    pub max_store_bytes: u64,
    /// Upper bound on cached logon credentials
    pub max_cached_creds: usize,
    /// Serve logons from the cache while disconnected; also keeps the
    /// store across restarts
    pub offline_logon: bool,
    /// With caching off every lookup goes to the backend
    pub caching_enabled: bool,
    /// Lifetime of a recorded connection failure
    pub negative_conn_timeout_secs: u64,
    pub store: StoreConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sidcache.journal"),
            cache_time_secs: 300,
            max_store_bytes: 50 * 1024 * 1024,
            max_cached_creds: 10,
            offline_logon: false,
            caching_enabled: true,
            negative_conn_timeout_secs: 30,
            store: StoreConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Defaults with the journal at `path`.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    pub fn from_toml_str(text: &str) -> CacheResult<Self> {
        let config: CacheConfig = toml::from_str(text).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(CacheError::Config("path must not be empty".into()));
        }
        if self.max_cached_creds == 0 {
            return Err(CacheError::Config("max_cached_creds must be at least 1".into()));
        }
        if self.max_store_bytes == 0 {
            return Err(CacheError::Config("max_store_bytes must be positive".into()));
        }
        self.store.validate().map_err(CacheError::Config)
    }
}

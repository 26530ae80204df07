//! The cache handle.
//!
//! A [`Cache`] owns the store (while open), the configuration and the
//! collaborators every lookup consults. Query wrappers take `&self` plus the
//! domain being asked; maintenance that reopens or resets the store takes
//! `&mut self`.

use std::sync::Arc;

use sidcache_store::{OpenMode, Store, StoreMode};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::oracle::{ConnectivityOracle, LogonCache, LogonRecords, NegativeConnCache};

pub struct Cache {
    pub(crate) config: CacheConfig,
    pub(crate) store: Option<Store>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) connectivity: Arc<dyn ConnectivityOracle>,
    pub(crate) logons: Arc<dyn LogonCache>,
    pub(crate) globally_offline: bool,
    pub(crate) last_size_check: Option<u64>,
}

/// Collects collaborators before opening a [`Cache`].
pub struct CacheBuilder {
    config: CacheConfig,
    clock: Option<Arc<dyn Clock>>,
    connectivity: Option<Arc<dyn ConnectivityOracle>>,
    logons: Option<Arc<dyn LogonCache>>,
}

impl CacheBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn connectivity(mut self, oracle: Arc<dyn ConnectivityOracle>) -> Self {
        self.connectivity = Some(oracle);
        self
    }

    pub fn logons(mut self, logons: Arc<dyn LogonCache>) -> Self {
        self.logons = Some(logons);
        self
    }

    /// Validate the configuration and open the store.
    ///
    /// Without offline logons the first process to open the store empties
    /// it, and later openers join what is there; with them it keeps what the
    /// previous run cached.
    pub fn open(self) -> CacheResult<Cache> {
        self.config.validate()?;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let connectivity = self.connectivity.unwrap_or_else(|| {
            Arc::new(NegativeConnCache::new(self.config.negative_conn_timeout_secs, clock.clone()))
        });
        let logons = self.logons.unwrap_or_else(|| Arc::new(LogonRecords::new()));

        let mut cache = Cache {
            config: self.config,
            store: None,
            clock,
            connectivity,
            logons,
            globally_offline: false,
            last_size_check: None,
        };

        if cache.config.caching_enabled {
            let mode = if cache.config.offline_logon { OpenMode::Preserve } else { OpenMode::ClearIfFirst };
            cache.open_store(mode)?;
        }
        Ok(cache)
    }
}

impl Cache {
    pub fn builder(config: CacheConfig) -> CacheBuilder {
        CacheBuilder { config, clock: None, connectivity: None, logons: None }
    }

    /// Open with the system clock and in-memory oracles.
    pub fn open(config: CacheConfig) -> CacheResult<Cache> {
        Self::builder(config).open()
    }

    pub(crate) fn open_store(&mut self, mode: OpenMode) -> CacheResult<()> {
        let store = Store::open(&self.config.path, mode, self.config.store.clone())?;
        debug!(
            path = %self.config.path.display(),
            ?mode,
            entries = store.len().unwrap_or_default(),
            "cache store opened"
        );
        self.store = Some(store);
        Ok(())
    }

    /// Sync and drop the store. Lookups miss until it is reopened.
    pub fn close(&mut self) -> CacheResult<()> {
        if let Some(store) = self.store.take() {
            store.close()?;
        }
        Ok(())
    }

    /// The store, when caching is on and it is open.
    pub fn store(&self) -> Option<&Store> {
        if !self.config.caching_enabled {
            return None;
        }
        self.store.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn logons(&self) -> &dyn LogonCache {
        self.logons.as_ref()
    }

    /// Write one raw value, logging instead of failing when the store is
    /// closed or refuses it.
    pub(crate) fn put_raw(&self, key: &str, value: &[u8]) {
        let Some(store) = self.store() else {
            return;
        };
        if let Err(e) = store.store(key.as_bytes(), value, StoreMode::Replace) {
            warn!(key, error = %e, "failed to write cache entry");
        }
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to sync cache store on drop");
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("path", &self.config.path)
            .field("open", &self.store.is_some())
            .field("globally_offline", &self.globally_offline)
            .finish()
    }
}

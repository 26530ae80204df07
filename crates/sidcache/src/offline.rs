//! Process-wide offline state.
//!
//! An administrator (or the parent process) marks the cache offline by
//! writing the [`OFFLINE_SENTINEL`](crate::keys::OFFLINE_SENTINEL) key. While
//! offline with offline logons configured, every cached record is served
//! regardless of its sequence number.

use sidcache_store::StoreMode;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::error::{CacheError, CacheResult};
use crate::keys::OFFLINE_SENTINEL;

impl Cache {
    /// Write the offline marker. It takes effect on the next
    /// [`set_global_offline`](Cache::set_global_offline).
    pub fn write_offline_sentinel(&self) -> CacheResult<()> {
        let store = self.store().ok_or(CacheError::Closed)?;
        let stamp = (self.now() as u32).to_le_bytes();
        store.store(OFFLINE_SENTINEL.as_bytes(), &stamp, StoreMode::Replace)?;
        Ok(())
    }

    /// Enter the offline state. Only possible with offline logons
    /// configured and the marker present; returns whether it took effect.
    pub fn set_global_offline(&mut self) -> bool {
        if !self.config.offline_logon {
            debug!("offline requested but offline logons are not configured");
            return false;
        }
        let marked = match self.store().map(|s| s.contains(OFFLINE_SENTINEL.as_bytes())) {
            Some(Ok(marked)) => marked,
            Some(Err(e)) => {
                warn!(error = %e, "failed to read the offline marker");
                false
            }
            None => false,
        };
        if !marked {
            debug!("offline requested but the offline marker is not set");
            return false;
        }
        self.globally_offline = true;
        debug!("cache is globally offline");
        true
    }

    /// Leave the offline state and remove the marker.
    pub fn set_global_online(&mut self) -> CacheResult<()> {
        self.globally_offline = false;
        if let Some(store) = self.store() {
            store.delete(OFFLINE_SENTINEL.as_bytes())?;
        }
        debug!("cache is online");
        Ok(())
    }

    pub fn is_globally_offline(&self) -> bool {
        self.globally_offline
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::Query;
    use crate::config::CacheConfig;
    use crate::queries::testutil::*;
    use crate::status::Status;

    #[test]
    fn test_offline_needs_offline_logon() {
        let mut h = harness();
        h.cache.write_offline_sentinel().unwrap();
        assert!(!h.cache.set_global_offline());
        assert!(!h.cache.is_globally_offline());
    }

    #[test]
    fn test_offline_needs_sentinel() {
        let mut h = harness_with(|c| CacheConfig { offline_logon: true, ..c });
        assert!(!h.cache.set_global_offline());
        h.cache.write_offline_sentinel().unwrap();
        assert!(h.cache.set_global_offline());
        assert!(h.cache.is_globally_offline());
    }

    #[test]
    fn test_online_removes_sentinel() {
        let mut h = harness_with(|c| CacheConfig { offline_logon: true, ..c });
        h.cache.write_offline_sentinel().unwrap();
        assert!(h.cache.set_global_offline());
        h.cache.set_global_online().unwrap();
        assert!(!h.cache.is_globally_offline());
        assert!(!h.cache.store().unwrap().contains(b"WINBINDD_OFFLINE").unwrap());
        assert!(!h.cache.set_global_offline());
    }

    #[test]
    fn test_offline_serves_stale_records() {
        let mut h = harness_with(|c| CacheConfig { offline_logon: true, ..c });
        h.backend.add_user(user("alice", 1000));
        h.cache.query_user_list(&mut h.domain).unwrap();

        h.cache.write_offline_sentinel().unwrap();
        assert!(h.cache.set_global_offline());

        h.backend.set_sequence_number(8);
        h.clock.advance(301);
        let reply = h.cache.query_user_list(&mut h.domain).unwrap();
        assert_eq!(reply.status, Status::OK);
        assert_eq!(reply.data.len(), 1);
        assert_eq!(h.backend.calls(Query::UserList), 1);
    }
}

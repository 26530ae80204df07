//! Store upkeep: size-triggered flush, reset and list invalidation.

use sidcache_store::{OpenMode, Visit};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::domain::DomainState;
use crate::error::CacheResult;
use crate::keys::{self, KeyKind};
use crate::record::Record;
use crate::sid::Sid;

/// Minimum seconds between two size checks.
pub const SIZE_CHECK_INTERVAL: u64 = 60;

impl Cache {
    /// Flush the store if it grew past `max_store_bytes`. Checks at most once
    /// per [`SIZE_CHECK_INTERVAL`]; returns whether a flush ran.
    pub fn check_store_size(&mut self) -> CacheResult<bool> {
        let now = self.now();
        if let Some(last) = self.last_size_check {
            if now.saturating_sub(last) < SIZE_CHECK_INTERVAL {
                return Ok(false);
            }
        }
        self.last_size_check = Some(now);

        let Some(store) = self.store() else {
            warn!("cannot check cache size, store not open");
            return Ok(false);
        };
        let size = store.disk_size()?;
        if size <= self.config.max_store_bytes {
            return Ok(false);
        }
        debug!(size, max = self.config.max_store_bytes, "flushing cache due to size");
        self.flush()?;
        Ok(true)
    }

    /// Reopen the store and drop every cached failure, keeping successful
    /// answers, sequence numbers, credentials and the offline marker.
    /// Returns the number of records removed.
    pub fn flush(&mut self) -> CacheResult<usize> {
        self.close()?;
        if !self.config.caching_enabled {
            return Ok(0);
        }
        // a reopen, not a fresh start: never cleared, even when alone
        self.open_store(OpenMode::Preserve)?;
        let Some(store) = self.store() else {
            return Ok(0);
        };

        let mut removed = 0usize;
        let mut failure = None;
        store.traverse(|key, value| {
            if !KeyKind::of(key).is_header_framed() {
                return Visit::Continue;
            }
            let Some(record) = Record::parse(value.to_vec()) else {
                return Visit::Continue;
            };
            if record.status.is_ok() {
                return Visit::Continue;
            }
            match store.delete(key) {
                Ok(_) => {
                    removed += 1;
                    Visit::Continue
                }
                Err(e) => {
                    failure = Some(e);
                    Visit::Stop
                }
            }
        })?;
        if let Some(e) = failure {
            return Err(e.into());
        }

        let compaction = store.compact()?;
        debug!(removed, saved = compaction.bytes_saved(), "cache flushed");
        Ok(removed)
    }

    /// Drop everything: close, and reopen empty when caching is enabled.
    pub fn reset(&mut self) -> CacheResult<()> {
        self.close()?;
        self.globally_offline = false;
        if self.config.caching_enabled {
            self.open_store(OpenMode::Truncate)?;
        }
        debug!("cache reset");
        Ok(())
    }

    /// Delete the user and group listings of `domain_name`.
    pub fn invalidate_domain_lists(&self, domain_name: &str) -> CacheResult<usize> {
        let Some(store) = self.store() else {
            return Ok(0);
        };
        let mut removed = 0;
        for key in [
            keys::user_list(domain_name),
            keys::domain_groups(domain_name),
            keys::local_groups(domain_name),
        ] {
            if store.delete(key.as_bytes())? {
                removed += 1;
            }
        }
        debug!(domain = domain_name, removed, "invalidated domain lists");
        Ok(removed)
    }

    /// A fresh logon record for `user` exists: the listings of its domain
    /// may be missing the account. Returns the number of records removed.
    pub fn invalidate_for_logon<'a, I>(&self, user: &Sid, domains: I) -> CacheResult<usize>
    where
        I: IntoIterator<Item = &'a DomainState>,
    {
        let Some(user_domain) = user.domain() else {
            return Ok(0);
        };
        match domains.into_iter().find(|d| d.sid.as_ref() == Some(&user_domain)) {
            Some(domain) => self.invalidate_domain_lists(&domain.name),
            None => {
                debug!(%user, "no known domain for logon, nothing to invalidate");
                Ok(0)
            }
        }
    }

    /// Delete every user and group listing of every domain.
    pub fn invalidate_all_lists(&self) -> CacheResult<usize> {
        let Some(store) = self.store() else {
            return Ok(0);
        };
        let mut removed = 0;
        for prefix in [keys::USER_LIST_PREFIX, keys::GROUP_LIST_PREFIX] {
            for (key, _) in store.prefix_scan(prefix.as_bytes())? {
                if store.delete(&key)? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::Query;
    use crate::queries::testutil::*;
    use crate::status::Status;
    use crate::types::GroupEntry;

    #[test]
    fn test_flush_drops_failures_only() {
        let mut h = harness();
        h.backend.add_user(user("alice", 1000));
        h.cache.name_to_sid(&mut h.domain, "HOME", "alice").unwrap();
        h.cache.name_to_sid(&mut h.domain, "HOME", "ghost").unwrap();
        h.cache.save_creds(&user("alice", 1000).user_sid, &[1u8; 16]).unwrap();

        let removed = h.cache.flush().unwrap();
        assert_eq!(removed, 1);

        let store = h.cache.store().unwrap();
        assert!(store.contains(b"NS/HOME/ALICE").unwrap());
        assert!(store.contains(b"SN/S-1-5-21-1-2-3-1000").unwrap());
        assert!(!store.contains(b"NS/HOME/GHOST").unwrap());
        assert!(store.contains(b"SEQNUM/HOME").unwrap());
        assert!(store.contains(b"CRED/S-1-5-21-1-2-3-1000").unwrap());
    }

    #[test]
    fn test_size_check_rate_limited() {
        let mut h = harness_with(|c| crate::config::CacheConfig { max_store_bytes: 1, ..c });
        h.cache.name_to_sid(&mut h.domain, "HOME", "ghost").unwrap();

        assert!(h.cache.check_store_size().unwrap());
        h.cache.name_to_sid(&mut h.domain, "HOME", "ghost2").unwrap();
        h.clock.advance(59);
        assert!(!h.cache.check_store_size().unwrap());
        h.clock.advance(1);
        assert!(h.cache.check_store_size().unwrap());
        assert!(!h.cache.store().unwrap().contains(b"NS/HOME/GHOST2").unwrap());
    }

    #[test]
    fn test_size_under_limit_keeps_failures() {
        let mut h = harness();
        h.cache.name_to_sid(&mut h.domain, "HOME", "ghost").unwrap();
        assert!(!h.cache.check_store_size().unwrap());
        assert!(h.cache.store().unwrap().contains(b"NS/HOME/GHOST").unwrap());
    }

    #[test]
    fn test_reset_empties_store() {
        let mut h = harness();
        h.cache.enum_dom_groups(&mut h.domain).unwrap();
        h.cache.reset().unwrap();
        assert!(h.cache.store().unwrap().is_empty().unwrap());
    }

    #[test]
    fn test_invalidate_for_logon() {
        let mut h = harness();
        h.backend.set_domain_groups(vec![GroupEntry { name: "g".into(), description: None, rid: 512 }]);
        h.cache.query_user_list(&mut h.domain).unwrap();
        h.cache.enum_dom_groups(&mut h.domain).unwrap();
        h.cache.enum_local_groups(&mut h.domain).unwrap();
        h.cache.trusted_domains(&mut h.domain).unwrap();

        let alice = user("alice", 1000).user_sid;
        let removed = h.cache.invalidate_for_logon(&alice, [&h.domain.state]).unwrap();
        assert_eq!(removed, 3);
        assert!(h.cache.store().unwrap().contains(b"TRUSTDOMS/HOME").unwrap());

        h.cache.enum_dom_groups(&mut h.domain).unwrap();
        assert_eq!(h.backend.calls(Query::DomainGroups), 2);

        // a SID of another domain touches nothing
        let stranger = sid("S-1-5-21-9-9-9-1000");
        assert_eq!(h.cache.invalidate_for_logon(&stranger, [&h.domain.state]).unwrap(), 0);
    }

    #[test]
    fn test_invalidate_all_lists() {
        let mut h = harness();
        h.cache.query_user_list(&mut h.domain).unwrap();
        h.cache.enum_local_groups(&mut h.domain).unwrap();
        h.cache.lockout_policy(&mut h.domain).unwrap();
        assert_eq!(h.cache.invalidate_all_lists().unwrap(), 2);
        assert!(h.cache.store().unwrap().contains(b"LOC_POL/HOME").unwrap());
    }

    #[test]
    fn test_flush_with_caching_disabled() {
        let mut h = harness_with(|c| crate::config::CacheConfig { caching_enabled: false, ..c });
        assert_eq!(h.cache.flush().unwrap(), 0);
        assert!(h.cache.store().is_none());
        assert_eq!(h.cache.query_user_list(&mut h.domain).unwrap().status, Status::OK);
    }
}

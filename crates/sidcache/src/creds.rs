//! Cached logon credentials.
//!
//! `CRED/<sid>` holds the save time (u32) and the 16-byte verifier with its
//! length prefix. These entries have no status header and never expire
//! with the sequence number; the only bound is `max_cached_creds`, enforced
//! by evicting the oldest entry.

use sidcache_store::{Store, StoreMode};
use tracing::debug;

use crate::cache::Cache;
use crate::codec::{Cursor, RecordBuf, HASH16_LEN};
use crate::error::{CacheError, CacheResult};
use crate::keys;
use crate::sid::Sid;

/// A stored verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedCredential {
    pub saved_at: u64,
    pub hash: [u8; HASH16_LEN],
}

impl CachedCredential {
    fn encode(&self) -> Vec<u8> {
        let mut buf = RecordBuf::with_capacity(4 + 1 + HASH16_LEN);
        buf.put_time(self.saved_at);
        buf.put_hash16(&self.hash);
        buf.into_bytes()
    }

    fn decode(raw: &[u8]) -> CacheResult<Self> {
        let mut cur = Cursor::new(raw);
        let saved_at = cur.get_time()?;
        let hash = cur.get_hash16()?;
        Ok(CachedCredential { saved_at, hash })
    }
}

/// Only principal SIDs can carry credentials.
fn check_sid(sid: &Sid) -> CacheResult<()> {
    if sid.is_null() {
        return Err(CacheError::InvalidSid(format!("{} is the null SID", sid)));
    }
    match sid.rid() {
        Some(rid) if rid != 0 => Ok(()),
        _ => Err(CacheError::InvalidSid(format!("{} has no usable RID", sid))),
    }
}

impl Cache {
    fn cred_store(&self) -> CacheResult<&Store> {
        self.store().ok_or(CacheError::Closed)
    }

    pub fn creds_exist(&self, sid: &Sid) -> CacheResult<bool> {
        check_sid(sid)?;
        Ok(self.cred_store()?.contains(keys::credential(sid).as_bytes())?)
    }

    /// The stored verifier for `sid`, if any.
    pub fn get_creds(&self, sid: &Sid) -> CacheResult<Option<CachedCredential>> {
        check_sid(sid)?;
        let Some(raw) = self.cred_store()?.fetch(keys::credential(sid).as_bytes())? else {
            return Ok(None);
        };
        CachedCredential::decode(&raw).map(Some)
    }

    /// Store `hash` as the verifier for `sid`, stamped with the current time.
    pub fn save_creds(&self, sid: &Sid, hash: &[u8; HASH16_LEN]) -> CacheResult<()> {
        check_sid(sid)?;
        let store = self.cred_store()?;
        let max = self.config.max_cached_creds;

        while self.count_creds()? >= max {
            if !self.remove_oldest_creds(Some(sid))? {
                break;
            }
        }

        let cred = CachedCredential { saved_at: self.now(), hash: *hash };
        store.store(keys::credential(sid).as_bytes(), &cred.encode(), StoreMode::Replace)?;
        debug!(%sid, "cached credentials saved");
        Ok(())
    }

    pub fn count_creds(&self) -> CacheResult<usize> {
        Ok(self.cred_store()?.prefix_count(keys::CRED_PREFIX.as_bytes())?)
    }

    /// Make room for one credential: drop `sid`'s own entry if it has one,
    /// otherwise the entry saved longest ago. Returns whether anything was
    /// removed. An unreadable entry fails the call.
    pub fn remove_oldest_creds(&self, sid: Option<&Sid>) -> CacheResult<bool> {
        let store = self.cred_store()?;

        if let Some(sid) = sid {
            if store.delete(keys::credential(sid).as_bytes())? {
                debug!(%sid, "replacing cached credentials");
                return Ok(true);
            }
        }

        let mut oldest: Option<(u64, Vec<u8>)> = None;
        for (key, value) in store.prefix_scan(keys::CRED_PREFIX.as_bytes())? {
            let saved_at = CachedCredential::decode(&value)?.saved_at;
            if oldest.as_ref().map_or(true, |(t, _)| saved_at < *t) {
                oldest = Some((saved_at, key));
            }
        }

        let Some((saved_at, key)) = oldest else {
            return Ok(false);
        };
        debug!(key = %String::from_utf8_lossy(&key), saved_at, "evicting oldest cached credential");
        Ok(store.delete(&key)?)
    }
}

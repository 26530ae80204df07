//! External signals the cache consults but does not own.
//!
//! - [`ConnectivityOracle`]: was a controller of this domain recently found
//!   unreachable? Feeds the offline grace rule of the expiry policy.
//! - [`LogonCache`]: does a full logon record exist for this SID? Lets a
//!   cached `ACCESS_DENIED` for user lookups be bypassed.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::sid::Sid;
use crate::status::Status;

/// Default lifetime of a negative connectivity entry, in seconds.
pub const DEFAULT_NEGATIVE_CONN_TIMEOUT: u64 = 30;

pub trait ConnectivityOracle: Send + Sync {
    /// True if connecting to `domain` (through `controller`, when known)
    /// failed within the oracle's window.
    fn recent_failure(&self, domain: &str, controller: Option<&str>) -> bool;
}

/// Oracle that never reports failures.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReachable;

impl ConnectivityOracle for AlwaysReachable {
    fn recent_failure(&self, _domain: &str, _controller: Option<&str>) -> bool {
        false
    }
}

struct NegativeEntry {
    added: u64,
    status: Status,
}

/// Time-limited record of failed connection attempts, per domain and
/// controller.
pub struct NegativeConnCache {
    timeout: u64,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<(String, String), NegativeEntry>>,
}

impl NegativeConnCache {
    pub fn new(timeout_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self { timeout: timeout_secs, clock, entries: Mutex::new(HashMap::new()) }
    }

    fn key(domain: &str, controller: Option<&str>) -> (String, String) {
        (domain.to_uppercase(), controller.unwrap_or("").to_uppercase())
    }

    /// Remember that connecting failed with `status`.
    pub fn add(&self, domain: &str, controller: Option<&str>, status: Status) {
        if status.is_ok() {
            return;
        }
        debug!(domain, ?controller, %status, "negative connection entry added");
        self.entries
            .lock()
            .insert(Self::key(domain, controller), NegativeEntry { added: self.clock.now(), status });
    }

    pub fn remove(&self, domain: &str, controller: Option<&str>) {
        self.entries.lock().remove(&Self::key(domain, controller));
    }

    /// The failure still inside the window, if any. Expired entries are
    /// dropped on lookup.
    pub fn lookup(&self, domain: &str, controller: Option<&str>) -> Option<Status> {
        let key = Self::key(domain, controller);
        let mut entries = self.entries.lock();
        let entry = entries.get(&key)?;
        if self.clock.now().saturating_sub(entry.added) > self.timeout {
            entries.remove(&key);
            return None;
        }
        Some(entry.status)
    }

    pub fn flush(&self) {
        self.entries.lock().clear();
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }
}

impl ConnectivityOracle for NegativeConnCache {
    fn recent_failure(&self, domain: &str, controller: Option<&str>) -> bool {
        self.lookup(domain, controller).is_some()
    }
}

impl std::fmt::Debug for NegativeConnCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegativeConnCache")
            .field("timeout", &self.timeout)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

pub trait LogonCache: Send + Sync {
    fn has_logon(&self, sid: &Sid) -> bool;
}

/// In-memory set of SIDs with a full logon record.
#[derive(Debug, Default)]
pub struct LogonRecords {
    sids: Mutex<HashSet<Sid>>,
}

impl LogonRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sid: Sid) {
        self.sids.lock().insert(sid);
    }

    pub fn forget(&self, sid: &Sid) {
        self.sids.lock().remove(sid);
    }
}

impl LogonCache for LogonRecords {
    fn has_logon(&self, sid: &Sid) -> bool {
        self.sids.lock().contains(sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_negative_entry_expires() {
        let clock = Arc::new(ManualClock::new(100));
        let cache = NegativeConnCache::new(DEFAULT_NEGATIVE_CONN_TIMEOUT, clock.clone());

        cache.add("home", Some("dc1"), Status::DOMAIN_CONTROLLER_NOT_FOUND);
        assert!(cache.recent_failure("HOME", Some("DC1")));
        assert!(!cache.recent_failure("HOME", Some("dc2")));

        clock.advance(30);
        assert_eq!(cache.lookup("HOME", Some("dc1")), Some(Status::DOMAIN_CONTROLLER_NOT_FOUND));
        clock.advance(1);
        assert!(!cache.recent_failure("HOME", Some("dc1")));
    }

    #[test]
    fn test_success_is_not_recorded() {
        let cache = NegativeConnCache::new(30, Arc::new(ManualClock::new(0)));
        cache.add("HOME", None, Status::OK);
        assert!(!cache.recent_failure("HOME", None));
    }

    #[test]
    fn test_remove_and_flush() {
        let cache = NegativeConnCache::new(30, Arc::new(ManualClock::new(0)));
        cache.add("A", None, Status::UNSUCCESSFUL);
        cache.add("B", None, Status::UNSUCCESSFUL);
        cache.remove("A", None);
        assert!(!cache.recent_failure("A", None));
        cache.flush();
        assert!(!cache.recent_failure("B", None));
    }

    #[test]
    fn test_logon_records() {
        let records = LogonRecords::new();
        let sid: Sid = "S-1-5-21-1-2-3-1000".parse().unwrap();
        assert!(!records.has_logon(&sid));
        records.record(sid.clone());
        assert!(records.has_logon(&sid));
        records.forget(&sid);
        assert!(!records.has_logon(&sid));
    }
}

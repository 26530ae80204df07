//! sidcache - sequence-number validated cache of identity directory answers
//!
//! Resolving names, SIDs, group memberships and account policies against a
//! remote directory is slow and sometimes impossible. This crate keeps every
//! answer (failures included) in a journaled store and re-asks the directory
//! only when the domain's change counter moved.
//!
//! # Layout
//!
//! - [`Cache`]: store handle, configuration and collaborators
//! - query wrappers on `Cache` (`query_user_list`, `name_to_sid`, ...), one
//!   per query shape, each returning the same [`Reply`] whether cached or live
//! - [`Backend`]: the directory, consulted on a miss
//! - credential cache, maintenance (size-capped flush, invalidation, reset)
//!   and the global offline state, also on `Cache`
//!
//! # Validity
//!
//! A record is served while the sequence number it was written under
//! matches the domain's current one (see [`expiry`] for the full rules).
//! The current number is itself cached for `cache_time_secs`.

pub mod backend;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod creds;
pub mod domain;
pub mod error;
pub mod expiry;
pub mod keys;
pub mod maintenance;
pub mod offline;
pub mod oracle;
mod queries;
pub mod record;
pub mod seqnum;
pub mod sid;
pub mod status;
pub mod types;

pub use backend::{Backend, Reply, RetryOnce};
#[cfg(any(test, feature = "test-util"))]
pub use backend::DirectoryBackend;
pub use cache::{Cache, CacheBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use creds::CachedCredential;
pub use domain::{Domain, DomainState, SeqNum};
pub use error::{CacheError, CacheResult};
pub use oracle::{ConnectivityOracle, LogonCache, LogonRecords, NegativeConnCache};
pub use sid::{Sid, SidType};
pub use status::Status;
pub use types::{
    GroupEntry, GroupMember, LockoutPolicy, NameMapping, PasswordPolicy, SidMapping, TrustedDomain,
    UserInfo,
};

//! Directory backend interface.
//!
//! The cache calls a [`Backend`] on every miss. Each query answers with a
//! [`Reply`]: the status the directory returned plus the data, which is the
//! type's default when the status is a failure.

#[cfg(any(test, feature = "test-util"))]
mod memory;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{DirectoryBackend, Query};

use std::sync::Arc;

use tracing::debug;

use crate::domain::DomainState;
use crate::sid::Sid;
use crate::status::Status;
use crate::types::{
    GroupEntry, GroupMember, LockoutPolicy, NameMapping, PasswordPolicy, SidMapping, TrustedDomain,
    UserInfo,
};

/// Status plus payload, identical whether served from cache or live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub status: Status,
    pub data: T,
}

impl<T> Reply<T> {
    pub fn ok(data: T) -> Self {
        Reply { status: Status::OK, data }
    }

    pub fn new(status: Status, data: T) -> Self {
        Reply { status, data }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Reply<U> {
        Reply { status: self.status, data: f(self.data) }
    }
}

impl<T: Default> Reply<T> {
    /// A failure carrying no data.
    pub fn failed(status: Status) -> Self {
        Reply { status, data: T::default() }
    }
}

/// One method per cached query shape.
///
/// Methods take `&self`; implementations that pool connections keep that
/// state behind their own locks.
pub trait Backend: Send + Sync {
    /// Whether listings from this backend are complete and current enough
    /// to seed per-user records.
    fn consistent(&self) -> bool;

    /// Drop any pooled connection to `domain`'s controller.
    fn invalidate_connection(&self, domain: &DomainState);

    fn sequence_number(&self, domain: &DomainState) -> Reply<u32>;

    fn query_user_list(&self, domain: &DomainState) -> Reply<Vec<UserInfo>>;

    fn enum_dom_groups(&self, domain: &DomainState) -> Reply<Vec<GroupEntry>>;

    fn enum_local_groups(&self, domain: &DomainState) -> Reply<Vec<GroupEntry>>;

    fn name_to_sid(&self, domain: &DomainState, domain_name: &str, name: &str) -> Reply<NameMapping>;

    fn sid_to_name(&self, domain: &DomainState, sid: &Sid) -> Reply<SidMapping>;

    fn query_user(&self, domain: &DomainState, user: &Sid) -> Reply<UserInfo>;

    fn lookup_usergroups(&self, domain: &DomainState, user: &Sid) -> Reply<Vec<Sid>>;

    /// RIDs of the domain aliases any of `sids` belongs to.
    fn lookup_useraliases(&self, domain: &DomainState, sids: &[Sid]) -> Reply<Vec<u32>>;

    fn lookup_groupmem(&self, domain: &DomainState, group: &Sid) -> Reply<Vec<GroupMember>>;

    fn trusted_domains(&self, domain: &DomainState) -> Reply<Vec<TrustedDomain>>;

    fn lockout_policy(&self, domain: &DomainState) -> Reply<LockoutPolicy>;

    fn password_policy(&self, domain: &DomainState) -> Reply<PasswordPolicy>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn consistent(&self) -> bool {
        (**self).consistent()
    }

    fn invalidate_connection(&self, domain: &DomainState) {
        (**self).invalidate_connection(domain)
    }

    fn sequence_number(&self, domain: &DomainState) -> Reply<u32> {
        (**self).sequence_number(domain)
    }

    fn query_user_list(&self, domain: &DomainState) -> Reply<Vec<UserInfo>> {
        (**self).query_user_list(domain)
    }

    fn enum_dom_groups(&self, domain: &DomainState) -> Reply<Vec<GroupEntry>> {
        (**self).enum_dom_groups(domain)
    }

    fn enum_local_groups(&self, domain: &DomainState) -> Reply<Vec<GroupEntry>> {
        (**self).enum_local_groups(domain)
    }

    fn name_to_sid(&self, domain: &DomainState, domain_name: &str, name: &str) -> Reply<NameMapping> {
        (**self).name_to_sid(domain, domain_name, name)
    }

    fn sid_to_name(&self, domain: &DomainState, sid: &Sid) -> Reply<SidMapping> {
        (**self).sid_to_name(domain, sid)
    }

    fn query_user(&self, domain: &DomainState, user: &Sid) -> Reply<UserInfo> {
        (**self).query_user(domain, user)
    }

    fn lookup_usergroups(&self, domain: &DomainState, user: &Sid) -> Reply<Vec<Sid>> {
        (**self).lookup_usergroups(domain, user)
    }

    fn lookup_useraliases(&self, domain: &DomainState, sids: &[Sid]) -> Reply<Vec<u32>> {
        (**self).lookup_useraliases(domain, sids)
    }

    fn lookup_groupmem(&self, domain: &DomainState, group: &Sid) -> Reply<Vec<GroupMember>> {
        (**self).lookup_groupmem(domain, group)
    }

    fn trusted_domains(&self, domain: &DomainState) -> Reply<Vec<TrustedDomain>> {
        (**self).trusted_domains(domain)
    }

    fn lockout_policy(&self, domain: &DomainState) -> Reply<LockoutPolicy> {
        (**self).lockout_policy(domain)
    }

    fn password_policy(&self, domain: &DomainState) -> Reply<PasswordPolicy> {
        (**self).password_policy(domain)
    }
}

/// Retries a call once, on a fresh connection, when the first attempt
/// fails with `UNSUCCESSFUL`.
#[derive(Debug)]
pub struct RetryOnce<B> {
    inner: B,
}

impl<B: Backend> RetryOnce<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn call<T>(&self, domain: &DomainState, op: &str, f: impl Fn(&B) -> Reply<T>) -> Reply<T> {
        let reply = f(&self.inner);
        if reply.status != Status::UNSUCCESSFUL {
            return reply;
        }
        debug!(domain = %domain.name, op, "backend call failed, retrying on a new connection");
        self.inner.invalidate_connection(domain);
        f(&self.inner)
    }
}

impl<B: Backend> Backend for RetryOnce<B> {
    fn consistent(&self) -> bool {
        self.inner.consistent()
    }

    fn invalidate_connection(&self, domain: &DomainState) {
        self.inner.invalidate_connection(domain)
    }

    fn sequence_number(&self, domain: &DomainState) -> Reply<u32> {
        self.call(domain, "sequence_number", |b| b.sequence_number(domain))
    }

    fn query_user_list(&self, domain: &DomainState) -> Reply<Vec<UserInfo>> {
        self.call(domain, "query_user_list", |b| b.query_user_list(domain))
    }

    fn enum_dom_groups(&self, domain: &DomainState) -> Reply<Vec<GroupEntry>> {
        self.call(domain, "enum_dom_groups", |b| b.enum_dom_groups(domain))
    }

    fn enum_local_groups(&self, domain: &DomainState) -> Reply<Vec<GroupEntry>> {
        self.call(domain, "enum_local_groups", |b| b.enum_local_groups(domain))
    }

    fn name_to_sid(&self, domain: &DomainState, domain_name: &str, name: &str) -> Reply<NameMapping> {
        self.call(domain, "name_to_sid", |b| b.name_to_sid(domain, domain_name, name))
    }

    fn sid_to_name(&self, domain: &DomainState, sid: &Sid) -> Reply<SidMapping> {
        self.call(domain, "sid_to_name", |b| b.sid_to_name(domain, sid))
    }

    fn query_user(&self, domain: &DomainState, user: &Sid) -> Reply<UserInfo> {
        self.call(domain, "query_user", |b| b.query_user(domain, user))
    }

    fn lookup_usergroups(&self, domain: &DomainState, user: &Sid) -> Reply<Vec<Sid>> {
        self.call(domain, "lookup_usergroups", |b| b.lookup_usergroups(domain, user))
    }

    fn lookup_useraliases(&self, domain: &DomainState, sids: &[Sid]) -> Reply<Vec<u32>> {
        self.call(domain, "lookup_useraliases", |b| b.lookup_useraliases(domain, sids))
    }

    fn lookup_groupmem(&self, domain: &DomainState, group: &Sid) -> Reply<Vec<GroupMember>> {
        self.call(domain, "lookup_groupmem", |b| b.lookup_groupmem(domain, group))
    }

    fn trusted_domains(&self, domain: &DomainState) -> Reply<Vec<TrustedDomain>> {
        self.call(domain, "trusted_domains", |b| b.trusted_domains(domain))
    }

    fn lockout_policy(&self, domain: &DomainState) -> Reply<LockoutPolicy> {
        self.call(domain, "lockout_policy", |b| b.lockout_policy(domain))
    }

    fn password_policy(&self, domain: &DomainState) -> Reply<PasswordPolicy> {
        self.call(domain, "password_policy", |b| b.password_policy(domain))
    }
}

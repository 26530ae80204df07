//! In-memory directory.
//!
//! Answers every query from tables filled by the embedder, counts calls per
//! query and can be told to fail, which makes cache behaviour observable.

use hashbrown::HashMap;
use parking_lot::Mutex;

use super::{Backend, Reply};
use crate::domain::DomainState;
use crate::sid::{Sid, SidType};
use crate::status::Status;
use crate::types::{
    GroupEntry, GroupMember, LockoutPolicy, NameMapping, PasswordPolicy, SidMapping, TrustedDomain,
    UserInfo,
};

/// Query shapes, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    SequenceNumber,
    UserList,
    DomainGroups,
    LocalGroups,
    NameToSid,
    SidToName,
    QueryUser,
    UserGroups,
    UserAliases,
    GroupMembers,
    TrustedDomains,
    LockoutPolicy,
    PasswordPolicy,
}

#[derive(Default)]
struct Directory {
    sequence_number: u32,
    domain_name: String,
    users: Vec<UserInfo>,
    names: HashMap<String, NameMapping>,
    sids: HashMap<Sid, SidMapping>,
    user_groups: HashMap<Sid, Vec<Sid>>,
    alias_rids: HashMap<Sid, Vec<u32>>,
    group_members: HashMap<Sid, Vec<GroupMember>>,
    domain_groups: Vec<GroupEntry>,
    local_groups: Vec<GroupEntry>,
    trusts: Vec<TrustedDomain>,
    lockout: LockoutPolicy,
    password: PasswordPolicy,
    consistent: bool,
    calls: HashMap<Query, usize>,
    /// Pending injected failures: status and how many calls it applies to
    failures: HashMap<Query, (Status, usize)>,
    invalidations: usize,
}

/// Backend holding a whole directory in memory.
#[derive(Default)]
pub struct DirectoryBackend {
    dir: Mutex<Directory>,
}

impl DirectoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name reported as the domain part of SID translations.
    pub fn set_domain_name(&self, name: &str) {
        self.dir.lock().domain_name = name.to_string();
    }

    pub fn set_sequence_number(&self, seq: u32) {
        self.dir.lock().sequence_number = seq;
    }

    pub fn set_consistent(&self, consistent: bool) {
        self.dir.lock().consistent = consistent;
    }

    /// Register a user; it becomes visible to listings, detail queries and
    /// both translation directions.
    pub fn add_user(&self, user: UserInfo) {
        let mut dir = self.dir.lock();
        let domain_name = dir.domain_name.clone();
        dir.names.insert(
            user.acct_name.to_uppercase(),
            NameMapping { sid: user.user_sid.clone(), sid_type: SidType::User },
        );
        dir.sids.insert(
            user.user_sid.clone(),
            SidMapping { domain_name, name: user.acct_name.clone(), sid_type: SidType::User },
        );
        dir.users.retain(|u| u.user_sid != user.user_sid);
        dir.users.push(user);
    }

    /// Register a translatable name that is not a user.
    pub fn add_name(&self, name: &str, sid: Sid, sid_type: SidType) {
        let mut dir = self.dir.lock();
        let domain_name = dir.domain_name.clone();
        dir.names.insert(name.to_uppercase(), NameMapping { sid: sid.clone(), sid_type });
        dir.sids.insert(sid, SidMapping { domain_name, name: name.to_string(), sid_type });
    }

    pub fn set_user_groups(&self, user: Sid, groups: Vec<Sid>) {
        self.dir.lock().user_groups.insert(user, groups);
    }

    pub fn set_alias_rids(&self, member: Sid, rids: Vec<u32>) {
        self.dir.lock().alias_rids.insert(member, rids);
    }

    pub fn set_group_members(&self, group: Sid, members: Vec<GroupMember>) {
        self.dir.lock().group_members.insert(group, members);
    }

    pub fn set_domain_groups(&self, groups: Vec<GroupEntry>) {
        self.dir.lock().domain_groups = groups;
    }

    pub fn set_local_groups(&self, groups: Vec<GroupEntry>) {
        self.dir.lock().local_groups = groups;
    }

    pub fn set_trusts(&self, trusts: Vec<TrustedDomain>) {
        self.dir.lock().trusts = trusts;
    }

    pub fn set_lockout_policy(&self, policy: LockoutPolicy) {
        self.dir.lock().lockout = policy;
    }

    pub fn set_password_policy(&self, policy: PasswordPolicy) {
        self.dir.lock().password = policy;
    }

    /// Make the next `times` calls of `query` fail with `status`.
    pub fn fail_next(&self, query: Query, status: Status, times: usize) {
        let mut dir = self.dir.lock();
        if times == 0 {
            dir.failures.remove(&query);
        } else {
            dir.failures.insert(query, (status, times));
        }
    }

    /// Make every call of `query` fail with `status` until cleared.
    pub fn fail_always(&self, query: Query, status: Status) {
        self.fail_next(query, status, usize::MAX);
    }

    pub fn clear_failures(&self) {
        self.dir.lock().failures.clear();
    }

    pub fn calls(&self, query: Query) -> usize {
        self.dir.lock().calls.get(&query).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.dir.lock().calls.values().sum()
    }

    pub fn invalidations(&self) -> usize {
        self.dir.lock().invalidations
    }

    /// Count the call, then either consume an injected failure or answer.
    fn answer<T: Default>(&self, query: Query, f: impl FnOnce(&Directory) -> Reply<T>) -> Reply<T> {
        let mut dir = self.dir.lock();
        *dir.calls.entry(query).or_insert(0) += 1;

        let injected = dir.failures.get_mut(&query).map(|(status, remaining)| {
            *remaining -= 1;
            (*status, *remaining == 0)
        });
        match injected {
            Some((status, exhausted)) => {
                if exhausted {
                    dir.failures.remove(&query);
                }
                Reply::failed(status)
            }
            None => f(&dir),
        }
    }
}

impl Backend for DirectoryBackend {
    fn consistent(&self) -> bool {
        self.dir.lock().consistent
    }

    fn invalidate_connection(&self, _domain: &DomainState) {
        self.dir.lock().invalidations += 1;
    }

    fn sequence_number(&self, _domain: &DomainState) -> Reply<u32> {
        self.answer(Query::SequenceNumber, |d| Reply::ok(d.sequence_number))
    }

    fn query_user_list(&self, _domain: &DomainState) -> Reply<Vec<UserInfo>> {
        self.answer(Query::UserList, |d| Reply::ok(d.users.clone()))
    }

    fn enum_dom_groups(&self, _domain: &DomainState) -> Reply<Vec<GroupEntry>> {
        self.answer(Query::DomainGroups, |d| Reply::ok(d.domain_groups.clone()))
    }

    fn enum_local_groups(&self, _domain: &DomainState) -> Reply<Vec<GroupEntry>> {
        self.answer(Query::LocalGroups, |d| Reply::ok(d.local_groups.clone()))
    }

    fn name_to_sid(&self, _domain: &DomainState, _domain_name: &str, name: &str) -> Reply<NameMapping> {
        self.answer(Query::NameToSid, |d| match d.names.get(&name.to_uppercase()) {
            Some(mapping) => Reply::ok(mapping.clone()),
            None => Reply::failed(Status::NONE_MAPPED),
        })
    }

    fn sid_to_name(&self, _domain: &DomainState, sid: &Sid) -> Reply<SidMapping> {
        self.answer(Query::SidToName, |d| match d.sids.get(sid) {
            Some(mapping) => Reply::ok(mapping.clone()),
            None => Reply::failed(Status::NONE_MAPPED),
        })
    }

    fn query_user(&self, _domain: &DomainState, user: &Sid) -> Reply<UserInfo> {
        self.answer(Query::QueryUser, |d| match d.users.iter().find(|u| &u.user_sid == user) {
            Some(info) => Reply::ok(info.clone()),
            None => Reply::failed(Status::NO_SUCH_USER),
        })
    }

    fn lookup_usergroups(&self, _domain: &DomainState, user: &Sid) -> Reply<Vec<Sid>> {
        self.answer(Query::UserGroups, |d| match d.user_groups.get(user) {
            Some(groups) => Reply::ok(groups.clone()),
            None => Reply::failed(Status::NO_SUCH_USER),
        })
    }

    fn lookup_useraliases(&self, _domain: &DomainState, sids: &[Sid]) -> Reply<Vec<u32>> {
        self.answer(Query::UserAliases, |d| {
            let mut rids: Vec<u32> = sids
                .iter()
                .filter_map(|sid| d.alias_rids.get(sid))
                .flatten()
                .copied()
                .collect();
            rids.sort_unstable();
            rids.dedup();
            Reply::ok(rids)
        })
    }

    fn lookup_groupmem(&self, _domain: &DomainState, group: &Sid) -> Reply<Vec<GroupMember>> {
        self.answer(Query::GroupMembers, |d| match d.group_members.get(group) {
            Some(members) => Reply::ok(members.clone()),
            None => Reply::failed(Status::NO_SUCH_USER),
        })
    }

    fn trusted_domains(&self, _domain: &DomainState) -> Reply<Vec<TrustedDomain>> {
        self.answer(Query::TrustedDomains, |d| Reply::ok(d.trusts.clone()))
    }

    fn lockout_policy(&self, _domain: &DomainState) -> Reply<LockoutPolicy> {
        self.answer(Query::LockoutPolicy, |d| Reply::ok(d.lockout))
    }

    fn password_policy(&self, _domain: &DomainState) -> Reply<PasswordPolicy> {
        self.answer(Query::PasswordPolicy, |d| Reply::ok(d.password))
    }
}

impl std::fmt::Debug for DirectoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dir = self.dir.lock();
        f.debug_struct("DirectoryBackend")
            .field("domain_name", &dir.domain_name)
            .field("users", &dir.users.len())
            .field("sequence_number", &dir.sequence_number)
            .finish()
    }
}

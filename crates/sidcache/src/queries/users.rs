//! User listing, user details and memberships.

use tracing::debug;

use super::{decode_item_reply, decode_list_reply};
use crate::backend::Reply;
use crate::cache::Cache;
use crate::domain::Domain;
use crate::error::CacheResult;
use crate::keys;
use crate::record::Record;
use crate::sid::{Sid, SidType};
use crate::status::Status;
use crate::types::{NameMapping, SidMapping, UserInfo};

/// Extra attempts for a user listing that fails with `UNSUCCESSFUL`.
const USER_LIST_RETRIES: usize = 5;

impl Cache {
    /// Every user of the domain.
    pub fn query_user_list(&self, domain: &mut Domain) -> CacheResult<Reply<Vec<UserInfo>>> {
        let key = keys::user_list(&domain.state.name);
        if let Some(record) = self.fetch_record(domain, &key) {
            return decode_list_reply(&record);
        }
        if let Some(status) = domain.state.failing_status() {
            return Ok(Reply::failed(status));
        }

        let mut attempt = 0;
        let reply = loop {
            let reply = domain.backend().query_user_list(&domain.state);
            if reply.status != Status::UNSUCCESSFUL || attempt == USER_LIST_RETRIES {
                break reply;
            }
            attempt += 1;
            debug!(domain = %domain.state.name, attempt, "user listing unsuccessful, reconnecting");
            domain.backend().invalidate_connection(&domain.state);
        };

        self.save_list(domain, &key, &reply);
        if reply.is_ok() && domain.backend().consistent() {
            self.seed_user_records(domain, &reply.data);
        }
        Ok(reply)
    }

    /// Cache the name mappings and details of users from a complete listing.
    fn seed_user_records(&self, domain: &mut Domain, users: &[UserInfo]) {
        let domain_name = domain.state.name.clone();
        for user in users {
            self.save_name_to_sid(
                domain,
                &domain_name,
                &user.acct_name,
                &Reply::ok(NameMapping { sid: user.user_sid.clone(), sid_type: SidType::User }),
            );
            self.save_sid_to_name(
                domain,
                &user.user_sid,
                &Reply::ok(SidMapping {
                    domain_name: domain_name.clone(),
                    name: user.acct_name.clone(),
                    sid_type: SidType::User,
                }),
            );
            self.save_item(domain, &keys::user(&user.user_sid), &Reply::ok(user.clone()));
        }
        debug!(domain = %domain_name, users = users.len(), "seeded per-user records from listing");
    }

    /// Whether a cached `ACCESS_DENIED` for `user` should be ignored because
    /// a full logon record can answer instead. Resets the domain's status.
    fn bypass_access_denied(&self, domain: &mut Domain, record: Option<&Record>, user: &Sid) -> bool {
        let denied = record.is_some_and(|r| r.status == Status::ACCESS_DENIED)
            || domain.state.last_status == Some(Status::ACCESS_DENIED);
        if !denied || !self.logons.has_logon(user) {
            return false;
        }
        debug!(domain = %domain.state.name, %user, "cached access denied, re-querying for a logged-on user");
        domain.state.last_status = Some(Status::OK);
        true
    }

    /// Account details of one user.
    pub fn query_user(&self, domain: &mut Domain, user: &Sid) -> CacheResult<Reply<UserInfo>> {
        let key = keys::user(user);
        let record = self.fetch_record(domain, &key);
        if !self.bypass_access_denied(domain, record.as_ref(), user) {
            if let Some(record) = record {
                return decode_item_reply(&record);
            }
        }
        if let Some(status) = domain.state.failing_status() {
            return Ok(Reply::failed(status));
        }

        let reply = domain.backend().query_user(&domain.state, user);
        if !user.is_null() {
            self.save_item(domain, &key, &reply);
        }
        Ok(reply)
    }

    /// SIDs of the groups `user` belongs to.
    pub fn lookup_usergroups(&self, domain: &mut Domain, user: &Sid) -> CacheResult<Reply<Vec<Sid>>> {
        let key = keys::user_groups(user);
        let record = self.fetch_record(domain, &key);
        if !self.bypass_access_denied(domain, record.as_ref(), user) {
            if let Some(record) = record {
                return decode_list_reply(&record);
            }
        }
        if let Some(status) = domain.state.failing_status() {
            return Ok(Reply::failed(status));
        }

        let reply = domain.backend().lookup_usergroups(&domain.state, user);
        self.save_list(domain, &key, &reply);
        Ok(reply)
    }

    /// RIDs of the domain aliases any SID of the batch is a member of. The
    /// whole batch is one cache entry.
    pub fn lookup_useraliases(&self, domain: &mut Domain, sids: &[Sid]) -> CacheResult<Reply<Vec<u32>>> {
        if sids.is_empty() {
            return Ok(Reply::ok(Vec::new()));
        }
        let key = keys::user_aliases(sids);
        self.list_query(domain, &key, |backend, state| backend.lookup_useraliases(state, sids))
    }
}

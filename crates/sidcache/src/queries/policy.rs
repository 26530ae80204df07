//! Trusts and account policies.

use super::decode_list_reply;
use crate::backend::Reply;
use crate::cache::Cache;
use crate::domain::Domain;
use crate::error::CacheResult;
use crate::keys;
use crate::status::Status;
use crate::types::{LockoutPolicy, PasswordPolicy, TrustedDomain};

impl Cache {
    /// Domains trusted by `domain`.
    ///
    /// Having no trusts is reported by some controllers as a warning such as
    /// `NO_MORE_ENTRIES`; anything short of an error is cached as success.
    pub fn trusted_domains(&self, domain: &mut Domain) -> CacheResult<Reply<Vec<TrustedDomain>>> {
        let key = keys::trusted_domains(&domain.state.name);
        if let Some(record) = self.fetch_record(domain, &key) {
            return decode_list_reply(&record);
        }
        if let Some(status) = domain.state.failing_status() {
            return Ok(Reply::failed(status));
        }

        let mut reply = domain.backend().trusted_domains(&domain.state);
        if !reply.status.is_error() {
            reply.status = Status::OK;
        }
        self.save_list(domain, &key, &reply);
        Ok(reply)
    }

    pub fn lockout_policy(&self, domain: &mut Domain) -> CacheResult<Reply<LockoutPolicy>> {
        let key = keys::lockout_policy(&domain.state.name);
        self.item_query(domain, &key, |backend, state| backend.lockout_policy(state))
    }

    pub fn password_policy(&self, domain: &mut Domain) -> CacheResult<Reply<PasswordPolicy>> {
        let key = keys::password_policy(&domain.state.name);
        self.item_query(domain, &key, |backend, state| backend.password_policy(state))
    }
}

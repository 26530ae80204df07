//! Group listings and group membership.

use tracing::debug;

use super::decode_list_reply;
use crate::backend::Reply;
use crate::cache::Cache;
use crate::domain::Domain;
use crate::error::CacheResult;
use crate::keys;
use crate::sid::Sid;
use crate::status::Status;
use crate::types::{GroupEntry, GroupMember};

impl Cache {
    /// Global groups of the domain.
    pub fn enum_dom_groups(&self, domain: &mut Domain) -> CacheResult<Reply<Vec<GroupEntry>>> {
        let key = keys::domain_groups(&domain.state.name);
        self.list_query(domain, &key, |backend, state| backend.enum_dom_groups(state))
    }

    /// Domain-local groups (aliases).
    ///
    /// A cached listing served while the domain's sequence number is
    /// unreachable comes back as `MORE_PROCESSING_REQUIRED`: the rows are
    /// usable but may be stale.
    pub fn enum_local_groups(&self, domain: &mut Domain) -> CacheResult<Reply<Vec<GroupEntry>>> {
        let key = keys::local_groups(&domain.state.name);
        if let Some(record) = self.fetch_record(domain, &key) {
            let mut reply = decode_list_reply(&record)?;
            if domain.state.seqnum.is_unreachable() {
                debug!(domain = %domain.state.name, "serving local groups while the controller is down");
                reply.status = Status::MORE_PROCESSING_REQUIRED;
            }
            return Ok(reply);
        }
        if let Some(status) = domain.state.failing_status() {
            return Ok(Reply::failed(status));
        }

        let reply = domain.backend().enum_local_groups(&domain.state);
        self.save_list(domain, &key, &reply);
        Ok(reply)
    }

    /// Members of `group`.
    pub fn lookup_groupmem(&self, domain: &mut Domain, group: &Sid) -> CacheResult<Reply<Vec<GroupMember>>> {
        let key = keys::group_members(group);
        self.list_query(domain, &key, |backend, state| backend.lookup_groupmem(state, group))
    }
}

//! Name and SID translation.

use crate::backend::Reply;
use crate::cache::Cache;
use crate::domain::Domain;
use crate::error::CacheResult;
use crate::keys;
use crate::record::Record;
use crate::sid::{Sid, SidType};
use crate::status::Status;
use crate::types::{NameMapping, SidMapping};

/// A name-to-SID record keeps its type tag even when the lookup failed.
fn decode_name_mapping(record: &Record) -> CacheResult<Reply<NameMapping>> {
    let mut cur = record.payload();
    let sid_type = SidType::from_u32(cur.get_u32()?);
    let sid = if record.status.is_ok() { cur.get_sid()? } else { Sid::null() };
    Ok(Reply::new(record.status, NameMapping { sid, sid_type }))
}

fn decode_sid_mapping(record: &Record) -> CacheResult<Reply<SidMapping>> {
    if !record.status.is_ok() {
        return Ok(Reply::failed(record.status));
    }
    let mut cur = record.payload();
    let sid_type = SidType::from_u32(cur.get_u32()?);
    let domain_name = cur.get_string()?.unwrap_or_default();
    let name = cur.get_string()?.unwrap_or_default();
    Ok(Reply::new(record.status, SidMapping { domain_name, name, sid_type }))
}

impl Domain {
    /// Failing status that should stop a translation. Controllers restricted
    /// to authenticated callers still translate names anonymously, so
    /// `ACCESS_DENIED` does not count.
    fn translation_blocked(&self) -> Option<Status> {
        self.state.failing_status().filter(|s| *s != Status::ACCESS_DENIED)
    }
}

impl Cache {
    pub(crate) fn save_name_to_sid(
        &self,
        domain: &mut Domain,
        domain_name: &str,
        name: &str,
        reply: &Reply<NameMapping>,
    ) {
        self.refresh_sequence_number(domain, false);
        let mut buf = self.start_record(reply.status, &domain.state);
        buf.put_u32(reply.data.sid_type.as_u32());
        buf.put_sid(&reply.data.sid);
        self.commit_record(&keys::name_to_sid(domain_name, name), buf);
    }

    pub(crate) fn save_sid_to_name(&self, domain: &mut Domain, sid: &Sid, reply: &Reply<SidMapping>) {
        if sid.is_null() {
            return;
        }
        self.refresh_sequence_number(domain, false);
        let mut buf = self.start_record(reply.status, &domain.state);
        if reply.is_ok() {
            buf.put_u32(reply.data.sid_type.as_u32());
            buf.put_string(Some(&reply.data.domain_name));
            buf.put_string(Some(&reply.data.name));
        }
        self.commit_record(&keys::sid_to_name(sid), buf);
    }

    /// Translate `domain_name\name` to a SID.
    ///
    /// A successful answer also caches the reverse mapping.
    pub fn name_to_sid(&self, domain: &mut Domain, domain_name: &str, name: &str) -> CacheResult<Reply<NameMapping>> {
        if let Some(record) = self.fetch_record(domain, &keys::name_to_sid(domain_name, name)) {
            return decode_name_mapping(&record);
        }
        if let Some(status) = domain.translation_blocked() {
            return Ok(Reply::failed(status));
        }

        let reply = domain.backend().name_to_sid(&domain.state, domain_name, name);
        self.save_name_to_sid(domain, domain_name, name, &reply);
        if reply.is_ok() {
            let reverse = Reply::ok(SidMapping {
                domain_name: domain_name.to_uppercase(),
                name: name.to_lowercase(),
                sid_type: reply.data.sid_type,
            });
            self.save_sid_to_name(domain, &reply.data.sid, &reverse);
        }
        Ok(reply)
    }

    /// Translate a SID to its domain and account name.
    ///
    /// The answer is not cached in the name-to-SID direction: with SID
    /// history the name may now map to a different SID.
    pub fn sid_to_name(&self, domain: &mut Domain, sid: &Sid) -> CacheResult<Reply<SidMapping>> {
        if let Some(record) = self.fetch_record(domain, &keys::sid_to_name(sid)) {
            return decode_sid_mapping(&record);
        }
        if let Some(status) = domain.translation_blocked() {
            return Ok(Reply::failed(status));
        }

        let reply = domain.backend().sid_to_name(&domain.state, sid);
        self.save_sid_to_name(domain, sid, &reply);
        Ok(reply)
    }

    /// A successful cached SID translation, without asking the backend.
    pub fn lookup_cached_sid(&self, domain: &mut Domain, sid: &Sid) -> CacheResult<Option<SidMapping>> {
        let Some(record) = self.fetch_record(domain, &keys::sid_to_name(sid)) else {
            return Ok(None);
        };
        let reply = decode_sid_mapping(&record)?;
        Ok(reply.is_ok().then_some(reply.data))
    }

    /// A successful cached name translation, without asking the backend.
    pub fn lookup_cached_name(
        &self,
        domain: &mut Domain,
        domain_name: &str,
        name: &str,
    ) -> CacheResult<Option<NameMapping>> {
        let Some(record) = self.fetch_record(domain, &keys::name_to_sid(domain_name, name)) else {
            return Ok(None);
        };
        let reply = decode_name_mapping(&record)?;
        Ok(reply.is_ok().then_some(reply.data))
    }

    /// Record a name mapping learnt from an authoritative source outside the
    /// backend (a logon reply, for instance).
    pub fn cache_name_to_sid(&self, domain: &mut Domain, domain_name: &str, name: &str, sid: &Sid, sid_type: SidType) {
        let reply = Reply::ok(NameMapping { sid: sid.clone(), sid_type });
        self.save_name_to_sid(domain, domain_name, name, &reply);
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::Query;
    use crate::queries::testutil::*;
    use crate::sid::SidType;
    use crate::status::Status;

    #[test]
    fn test_name_to_sid_caches_both_directions() {
        let mut h = harness();
        h.backend.add_user(user("Alice", 1000));
        let alice_sid = user("Alice", 1000).user_sid;

        let reply = h.cache.name_to_sid(&mut h.domain, "home", "Alice").unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.data.sid, alice_sid);
        assert_eq!(reply.data.sid_type, SidType::User);

        let reverse = h.cache.sid_to_name(&mut h.domain, &alice_sid).unwrap();
        assert_eq!(reverse.data.domain_name, "HOME");
        assert_eq!(reverse.data.name, "alice");
        assert_eq!(h.backend.calls(Query::SidToName), 0);

        // name key is case-insensitive in the account part
        h.cache.name_to_sid(&mut h.domain, "home", "ALICE").unwrap();
        assert_eq!(h.backend.calls(Query::NameToSid), 1);
    }

    #[test]
    fn test_negative_name_lookup_is_cached() {
        let mut h = harness();
        let first = h.cache.name_to_sid(&mut h.domain, "HOME", "ghost").unwrap();
        assert_eq!(first.status, Status::NONE_MAPPED);

        let second = h.cache.name_to_sid(&mut h.domain, "HOME", "ghost").unwrap();
        assert_eq!(second.status, Status::NONE_MAPPED);
        assert!(second.data.sid.is_null());
        assert_eq!(h.backend.calls(Query::NameToSid), 1);
    }

    #[test]
    fn test_negative_sid_lookup_is_cached() {
        let mut h = harness();
        let unknown = sid("S-1-5-21-1-2-3-4242");
        assert_eq!(h.cache.sid_to_name(&mut h.domain, &unknown).unwrap().status, Status::NONE_MAPPED);
        assert_eq!(h.cache.sid_to_name(&mut h.domain, &unknown).unwrap().status, Status::NONE_MAPPED);
        assert_eq!(h.backend.calls(Query::SidToName), 1);
    }

    #[test]
    fn test_sid_to_name_does_not_seed_names() {
        let mut h = harness();
        h.backend.add_user(user("alice", 1000));
        h.cache.sid_to_name(&mut h.domain, &user("alice", 1000).user_sid).unwrap();
        assert!(h.cache.store().unwrap().fetch(b"NS/HOME/ALICE").unwrap().is_none());
    }

    #[test]
    fn test_translation_proceeds_on_access_denied() {
        let mut h = harness();
        h.backend.add_user(user("alice", 1000));
        h.cache.refresh_sequence_number(&mut h.domain, false);

        h.domain.state.last_status = Some(Status::ACCESS_DENIED);
        assert!(h.cache.name_to_sid(&mut h.domain, "HOME", "alice").unwrap().is_ok());

        h.domain.state.last_status = Some(Status::DOMAIN_CONTROLLER_NOT_FOUND);
        let blocked = h.cache.sid_to_name(&mut h.domain, &sid("S-1-5-21-1-2-3-1001")).unwrap();
        assert_eq!(blocked.status, Status::DOMAIN_CONTROLLER_NOT_FOUND);
        assert_eq!(h.backend.calls(Query::SidToName), 0);
    }

    #[test]
    fn test_cache_only_lookups() {
        let mut h = harness();
        let alice = sid("S-1-5-21-1-2-3-1000");
        assert_eq!(h.cache.lookup_cached_name(&mut h.domain, "HOME", "alice").unwrap(), None);

        h.cache.cache_name_to_sid(&mut h.domain, "HOME", "alice", &alice, SidType::User);
        let mapping = h.cache.lookup_cached_name(&mut h.domain, "HOME", "ALICE").unwrap().unwrap();
        assert_eq!(mapping.sid, alice);
        assert_eq!(h.cache.lookup_cached_sid(&mut h.domain, &alice).unwrap(), None);

        // failures are not reported as cached answers
        h.cache.name_to_sid(&mut h.domain, "HOME", "ghost").unwrap();
        assert_eq!(h.cache.lookup_cached_name(&mut h.domain, "HOME", "ghost").unwrap(), None);
        assert_eq!(h.backend.calls(Query::NameToSid), 1);
    }
}

//! Cached query wrappers.
//!
//! Every wrapper follows the same shape: serve a valid cached record if
//! there is one, otherwise give up early when the domain's last sequence
//! refresh failed, otherwise ask the backend and cache whatever it answered,
//! failures included.

mod groups;
mod names;
mod policy;
mod users;

use crate::backend::{Backend, Reply};
use crate::cache::Cache;
use crate::domain::{Domain, DomainState};
use crate::error::CacheResult;
use crate::record::Record;
use crate::types::{decode_list, encode_list, Wire};

/// Decode a hit: failures carry no rows.
fn decode_list_reply<T: Wire>(record: &Record) -> CacheResult<Reply<Vec<T>>> {
    if !record.status.is_ok() {
        return Ok(Reply::failed(record.status));
    }
    let rows = decode_list(&mut record.payload())?;
    Ok(Reply::new(record.status, rows))
}

fn decode_item_reply<T: Wire + Default>(record: &Record) -> CacheResult<Reply<T>> {
    if !record.status.is_ok() {
        return Ok(Reply::failed(record.status));
    }
    let item = T::decode(&mut record.payload())?;
    Ok(Reply::new(record.status, item))
}

impl Cache {
    /// Write a listing back after refreshing the sequence number.
    pub(crate) fn save_list<T: Wire>(&self, domain: &mut Domain, key: &str, reply: &Reply<Vec<T>>) {
        self.refresh_sequence_number(domain, false);
        let mut buf = self.start_record(reply.status, &domain.state);
        encode_list(&mut buf, &reply.data);
        self.commit_record(key, buf);
    }

    pub(crate) fn save_item<T: Wire>(&self, domain: &mut Domain, key: &str, reply: &Reply<T>) {
        self.refresh_sequence_number(domain, false);
        let mut buf = self.start_record(reply.status, &domain.state);
        reply.data.encode(&mut buf);
        self.commit_record(key, buf);
    }

    /// Cached-or-live listing with no query-specific twists.
    pub(crate) fn list_query<T, F>(&self, domain: &mut Domain, key: &str, query: F) -> CacheResult<Reply<Vec<T>>>
    where
        T: Wire,
        F: FnOnce(&dyn Backend, &DomainState) -> Reply<Vec<T>>,
    {
        if let Some(record) = self.fetch_record(domain, key) {
            return decode_list_reply(&record);
        }
        if let Some(status) = domain.state.failing_status() {
            return Ok(Reply::failed(status));
        }
        let reply = query(domain.backend(), &domain.state);
        self.save_list(domain, key, &reply);
        Ok(reply)
    }

    pub(crate) fn item_query<T, F>(&self, domain: &mut Domain, key: &str, query: F) -> CacheResult<Reply<T>>
    where
        T: Wire + Default,
        F: FnOnce(&dyn Backend, &DomainState) -> Reply<T>,
    {
        if let Some(record) = self.fetch_record(domain, key) {
            return decode_item_reply(&record);
        }
        if let Some(status) = domain.state.failing_status() {
            return Ok(Reply::failed(status));
        }
        let reply = query(domain.backend(), &domain.state);
        self.save_item(domain, key, &reply);
        Ok(reply)
    }
}

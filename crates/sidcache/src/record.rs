//! Header-framed records: fetch with expiry check, start and commit.
//!
//! Every query record starts with an 8-byte header, the status the backend
//! answered with and the domain sequence number at write time, followed by
//! the query's own fields.

use tracing::{debug, warn};

use crate::cache::Cache;
use crate::codec::{Cursor, RecordBuf};
use crate::domain::{Domain, DomainState, SeqNum};
use crate::expiry::{evaluate, ExpiryInput};
use crate::status::Status;

pub const HEADER_LEN: usize = 8;

/// A cached answer that passed the expiry check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub status: Status,
    pub seqnum: SeqNum,
    data: Vec<u8>,
}

impl Record {
    /// Split a stored value into header and payload; `None` when it is too
    /// short to hold the header.
    pub fn parse(raw: Vec<u8>) -> Option<Record> {
        if raw.len() < HEADER_LEN {
            return None;
        }
        let status = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let seqnum = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        Some(Record { status: Status(status), seqnum: SeqNum(seqnum), data: raw })
    }

    /// Reader positioned after the header.
    pub fn payload(&self) -> Cursor<'_> {
        Cursor::new(&self.data[HEADER_LEN..])
    }
}

impl Cache {
    pub(crate) fn is_expired(&self, state: &DomainState, key: &str, record_seqnum: SeqNum) -> bool {
        let input = ExpiryInput {
            offline_logon: self.config.offline_logon,
            globally_offline: self.globally_offline,
            domain_online: state.online,
            recent_conn_failure: self.connectivity.recent_failure(&state.name, state.controller.as_deref()),
            domain_seqnum: state.seqnum,
            record_seqnum,
        };
        let verdict = evaluate(&input);
        debug!(
            key,
            domain = %state.name,
            record_seqnum = %record_seqnum,
            domain_seqnum = %state.seqnum,
            ?verdict,
            "expiry check"
        );
        verdict.is_expired()
    }

    /// Fetch the record under `key` if it is still valid for `domain`.
    pub fn fetch_record(&self, domain: &mut Domain, key: &str) -> Option<Record> {
        let store = self.store()?;
        self.refresh_sequence_number(domain, false);

        let raw = match store.fetch(key.as_bytes()) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as a miss");
                return None;
            }
        };
        let Some(record) = Record::parse(raw) else {
            debug!(key, "cache entry shorter than its header");
            return None;
        };
        if self.is_expired(&domain.state, key, record.seqnum) {
            return None;
        }
        debug!(key, status = %record.status, "cache hit");
        Some(record)
    }

    /// Begin a record for `domain` with `status`; fields go after the header.
    pub fn start_record(&self, status: Status, domain: &DomainState) -> RecordBuf {
        let mut buf = RecordBuf::new();
        buf.put_u32(status.0);
        buf.put_u32(domain.seqnum.0);
        buf
    }

    /// Store a finished record. Skipped when the store is unavailable.
    pub fn commit_record(&self, key: &str, buf: RecordBuf) {
        debug!(key, len = buf.len(), "caching record");
        self.put_raw(key, buf.as_bytes());
    }
}

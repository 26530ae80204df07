//! Domain sequence numbers.
//!
//! Records are valid only while the domain's change counter matches the one
//! they were written under. The counter itself is cached twice: in the
//! [`DomainState`] and under `SEQNUM/<domain>` (8 raw bytes: seqnum then
//! check time), and both copies are trusted for `cache_time_secs`.

use tracing::{debug, warn};

use crate::cache::Cache;
use crate::domain::{Domain, DomainState, SeqNum};
use crate::keys;
use crate::status::Status;

/// Anything but exactly 8 bytes is not a stored pair.
fn decode_pair(raw: &[u8]) -> Option<(SeqNum, u64)> {
    let raw: &[u8; 8] = raw.try_into().ok()?;
    let seq = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let time = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
    Some((SeqNum(seq), time as u64))
}

fn encode_pair(seq: SeqNum, checked: u64) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&seq.0.to_le_bytes());
    out[4..].copy_from_slice(&(checked as u32).to_le_bytes());
    out
}

impl Cache {
    fn within_ttl(&self, checked: u64, now: u64) -> bool {
        now.saturating_sub(checked) <= self.config.cache_time_secs
    }

    /// Adopt the persisted counter if it is recent enough.
    fn load_seqnum(&self, state: &mut DomainState, now: u64) -> bool {
        let Some(store) = self.store() else {
            return false;
        };
        let raw = match store.fetch(keys::seqnum(&state.name).as_bytes()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(domain = %state.name, error = %e, "failed to read stored sequence number");
                return false;
            }
        };
        let Some((seq, checked)) = raw.as_deref().and_then(decode_pair) else {
            return false;
        };
        if !self.within_ttl(checked, now) {
            return false;
        }
        debug!(domain = %state.name, seqnum = %seq, "using stored sequence number");
        state.seqnum = seq;
        state.last_seq_check = Some(checked);
        true
    }

    fn save_seqnum(&self, state: &DomainState) {
        let checked = state.last_seq_check.unwrap_or(0);
        self.put_raw(&keys::seqnum(&state.name), &encode_pair(state.seqnum, checked));
    }

    /// Make sure `domain`'s sequence number is no older than the TTL,
    /// asking the backend when neither cached copy will do. `force` skips
    /// both cached copies.
    pub fn refresh_sequence_number(&self, domain: &mut Domain, force: bool) {
        let now = self.now();

        if !force {
            if let Some(checked) = domain.state.last_seq_check {
                if self.within_ttl(checked, now) {
                    return;
                }
            }
            if self.load_seqnum(&mut domain.state, now) {
                return;
            }
        }

        let reply = domain.backend().sequence_number(&domain.state);
        let state = &mut domain.state;
        if reply.is_ok() {
            state.seqnum = SeqNum(reply.data);
            state.last_status = Some(Status::OK);
        } else {
            debug!(domain = %state.name, status = %reply.status, "sequence number unavailable");
            state.seqnum = SeqNum::UNREACHABLE;
            state.last_status = Some(reply.status);
        }
        state.last_seq_check = Some(now);
        self.save_seqnum(state);

        debug!(domain = %state.name, seqnum = %state.seqnum, force, "sequence number refreshed");
    }

    /// The domain's sequence number after a refresh.
    ///
    /// Always OK: an unreachable backend shows up as
    /// [`SeqNum::UNREACHABLE`], and the backend's own status stays in
    /// `DomainState::last_status`.
    pub fn sequence_number(&self, domain: &mut Domain) -> (Status, SeqNum) {
        self.refresh_sequence_number(domain, false);
        (Status::OK, domain.state.seqnum)
    }
}

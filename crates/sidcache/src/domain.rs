//! Per-domain state the cache validates records against.

use std::fmt;

use crate::backend::Backend;
use crate::sid::Sid;
use crate::status::Status;

/// A domain's change counter as seen by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqNum(pub u32);

impl SeqNum {
    /// Written when the backend could not be asked.
    pub const UNREACHABLE: SeqNum = SeqNum(0xFFFF_FFFF);

    pub fn is_unreachable(self) -> bool {
        self == SeqNum::UNREACHABLE
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unreachable() {
            f.write_str("unreachable")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainState {
    pub name: String,
    pub sid: Option<Sid>,
    /// Controller currently used, for negative-connectivity lookups
    pub controller: Option<String>,
    pub seqnum: SeqNum,
    /// When `seqnum` was last refreshed, in clock seconds; `None` until the
    /// first refresh
    pub last_seq_check: Option<u64>,
    pub online: bool,
    /// Outcome of the last backend call; `None` until one was made
    pub last_status: Option<Status>,
}

impl DomainState {
    pub fn new(name: impl Into<String>, sid: Option<Sid>) -> Self {
        Self {
            name: name.into(),
            sid,
            controller: None,
            seqnum: SeqNum::UNREACHABLE,
            last_seq_check: None,
            online: true,
            last_status: None,
        }
    }

    /// The last backend status if it was a failure.
    pub fn failing_status(&self) -> Option<Status> {
        self.last_status.filter(|s| !s.is_ok())
    }
}

/// A domain and the backend that answers for it.
pub struct Domain {
    pub state: DomainState,
    backend: Box<dyn Backend>,
}

impl Domain {
    pub fn new(state: DomainState, backend: Box<dyn Backend>) -> Self {
        Self { state, backend }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain").field("state", &self.state).finish_non_exhaustive()
    }
}

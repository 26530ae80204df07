//! Store key builders
//!
//! One builder per record template. Keys are plain text so that a dump of
//! the journal is readable.

use crate::sid::Sid;

/// Presence-only key marking the whole process as offline.
pub const OFFLINE_SENTINEL: &str = "WINBINDD_OFFLINE";

pub const SEQNUM_PREFIX: &str = "SEQNUM/";
pub const CRED_PREFIX: &str = "CRED/";
pub const USER_LIST_PREFIX: &str = "UL/";
pub const GROUP_LIST_PREFIX: &str = "GL/";

pub fn seqnum(domain: &str) -> String {
    format!("SEQNUM/{}", domain)
}

/// Name to SID; the account name is upper-cased.
pub fn name_to_sid(domain: &str, name: &str) -> String {
    format!("NS/{}/{}", domain, name.to_uppercase())
}

pub fn sid_to_name(sid: &Sid) -> String {
    format!("SN/{}", sid)
}

pub fn user(sid: &Sid) -> String {
    format!("U/{}", sid)
}

pub fn user_groups(sid: &Sid) -> String {
    format!("UG/{}", sid)
}

/// Alias membership of a SID batch: `UA/<sid1>/<sid2>/...`.
pub fn user_aliases(sids: &[Sid]) -> String {
    let mut key = String::from("UA");
    for sid in sids {
        key.push('/');
        key.push_str(&sid.to_string());
    }
    key
}

pub fn group_members(group: &Sid) -> String {
    format!("GM/{}", group)
}

pub fn domain_groups(domain: &str) -> String {
    format!("GL/{}/domain", domain)
}

pub fn local_groups(domain: &str) -> String {
    format!("GL/{}/local", domain)
}

pub fn user_list(domain: &str) -> String {
    format!("UL/{}", domain)
}

pub fn trusted_domains(domain: &str) -> String {
    format!("TRUSTDOMS/{}", domain)
}

pub fn lockout_policy(domain: &str) -> String {
    format!("LOC_POL/{}", domain)
}

pub fn password_policy(domain: &str) -> String {
    format!("PWD_POL/{}", domain)
}

pub fn credential(sid: &Sid) -> String {
    format!("CRED/{}", sid)
}

/// Namespace a stored key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// `SEQNUM/`: raw seqnum + check time
    SeqNum,
    /// `CRED/`: raw save time + hash
    Credential,
    /// The offline sentinel
    Offline,
    /// A header-framed query record
    Query,
    /// Anything else
    Unknown,
}

const QUERY_PREFIXES: &[&str] = &[
    "NS/", "SN/", "U/", "UG/", "UA/", "GM/", "GL/", "UL/", "TRUSTDOMS/", "LOC_POL/", "PWD_POL/",
];

impl KeyKind {
    pub fn of(key: &[u8]) -> KeyKind {
        if key.starts_with(SEQNUM_PREFIX.as_bytes()) {
            KeyKind::SeqNum
        } else if key.starts_with(CRED_PREFIX.as_bytes()) {
            KeyKind::Credential
        } else if key == OFFLINE_SENTINEL.as_bytes() {
            KeyKind::Offline
        } else if QUERY_PREFIXES.iter().any(|p| key.starts_with(p.as_bytes())) {
            KeyKind::Query
        } else {
            KeyKind::Unknown
        }
    }

    /// Whether values under this kind start with the status/seqnum header.
    pub fn is_header_framed(self) -> bool {
        self == KeyKind::Query
    }
}

//! Security identifiers.
//!
//! A SID is written `S-<revision>-<authority>-<sub1>-...-<subN>`; the last
//! sub-authority of a principal's SID is its RID. Cache keys and records
//! always use this canonical text form.

use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Upper bound on sub-authorities a SID may carry.
pub const MAX_SUB_AUTHORITIES: usize = 15;

/// Identifier authorities are 48-bit.
const MAX_AUTHORITY: u64 = (1 << 48) - 1;

/// A parsed security identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid {
    revision: u8,
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    /// Build a SID from its parts.
    pub fn new(revision: u8, authority: u64, sub_authorities: &[u32]) -> Result<Self, CacheError> {
        if authority > MAX_AUTHORITY {
            return Err(CacheError::InvalidSid(format!("authority {} exceeds 48 bits", authority)));
        }
        if sub_authorities.len() > MAX_SUB_AUTHORITIES {
            return Err(CacheError::InvalidSid(format!(
                "{} sub-authorities, at most {} allowed",
                sub_authorities.len(),
                MAX_SUB_AUTHORITIES
            )));
        }
        Ok(Self { revision, authority, sub_authorities: sub_authorities.to_vec() })
    }

    /// `S-1-0-0`, the SID of nobody.
    pub fn null() -> Self {
        Self { revision: 1, authority: 0, sub_authorities: vec![0] }
    }

    /// True for the null SID and for any SID with no authority and only zero
    /// sub-authorities.
    pub fn is_null(&self) -> bool {
        self.authority == 0 && self.sub_authorities.iter().all(|&s| s == 0)
    }

    /// The trailing relative identifier, if the SID has sub-authorities.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities.last().copied()
    }

    /// The SID with its RID removed.
    pub fn domain(&self) -> Option<Sid> {
        let (_, prefix) = self.sub_authorities.split_last()?;
        Some(Sid { revision: self.revision, authority: self.authority, sub_authorities: prefix.to_vec() })
    }

    /// Append `rid` to a domain SID.
    pub fn with_rid(&self, rid: u32) -> Result<Sid, CacheError> {
        let mut subs = self.sub_authorities.clone();
        subs.push(rid);
        Sid::new(self.revision, self.authority, &subs)
    }

    /// Whether `self` is `domain` plus exactly one RID.
    pub fn is_in_domain(&self, domain: &Sid) -> bool {
        self.domain().as_ref() == Some(domain)
    }

    pub fn sub_authorities(&self) -> &[u32] {
        &self.sub_authorities
    }
}

impl Default for Sid {
    fn default() -> Self {
        Sid::null()
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-", self.revision)?;
        if self.authority >= 1 << 32 {
            write!(f, "0x{:012X}", self.authority)?;
        } else {
            write!(f, "{}", self.authority)?;
        }
        for sub in &self.sub_authorities {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}

impl FromStr for Sid {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CacheError::InvalidSid(s.to_string());

        let rest = s
            .strip_prefix("S-")
            .or_else(|| s.strip_prefix("s-"))
            .ok_or_else(invalid)?;
        let mut parts = rest.split('-');

        let revision: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let authority_text = parts.next().ok_or_else(invalid)?;
        let authority = match authority_text
            .strip_prefix("0x")
            .or_else(|| authority_text.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid())?,
            None => authority_text.parse::<u64>().map_err(|_| invalid())?,
        };

        let subs = parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<u32>, CacheError>>()?;

        Sid::new(revision, authority, &subs)
    }
}

/// Kind of principal a name or SID resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SidType {
    User = 1,
    DomainGroup = 2,
    Domain = 3,
    Alias = 4,
    WellKnownGroup = 5,
    Deleted = 6,
    Invalid = 7,
    #[default]
    Unknown = 8,
    Computer = 9,
}

impl SidType {
    /// Decode a stored type tag; unrecognised values read as `Unknown`.
    pub fn from_u32(v: u32) -> SidType {
        match v {
            1 => SidType::User,
            2 => SidType::DomainGroup,
            3 => SidType::Domain,
            4 => SidType::Alias,
            5 => SidType::WellKnownGroup,
            6 => SidType::Deleted,
            7 => SidType::Invalid,
            9 => SidType::Computer,
            _ => SidType::Unknown,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

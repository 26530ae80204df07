//! Answers the directory gives, and how each is laid out in a record.

use crate::codec::{Cursor, NtTime, RecordBuf};
use crate::error::{CacheError, CacheResult};
use crate::sid::{Sid, SidType};

/// A row type with a fixed record layout.
pub trait Wire: Sized {
    fn encode(&self, buf: &mut RecordBuf);
    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self>;
}

/// Write `u32 count` then each row.
pub fn encode_list<T: Wire>(buf: &mut RecordBuf, rows: &[T]) {
    buf.put_u32(rows.len() as u32);
    for row in rows {
        row.encode(buf);
    }
}

/// Read `u32 count` then that many rows.
pub fn decode_list<T: Wire>(cur: &mut Cursor<'_>) -> CacheResult<Vec<T>> {
    let count = cur.get_u32()? as usize;
    // every row takes at least one byte, so a count past the remaining
    // length is corrupt and must not drive the allocation
    if count > cur.remaining() {
        return Err(CacheError::Corrupt { field: "list", needed: count, available: cur.remaining() });
    }
    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        rows.push(T::decode(cur)?);
    }
    Ok(rows)
}

fn required(cur: &mut Cursor<'_>, field: &str) -> CacheResult<String> {
    cur.get_string()?
        .ok_or_else(|| CacheError::Malformed(format!("null {}", field)))
}

impl Wire for Sid {
    fn encode(&self, buf: &mut RecordBuf) {
        buf.put_sid(self);
    }

    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self> {
        cur.get_sid()
    }
}

/// Alias memberships are cached as bare RIDs.
impl Wire for u32 {
    fn encode(&self, buf: &mut RecordBuf) {
        buf.put_u32(*self);
    }

    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self> {
        cur.get_u32()
    }
}

/// Account details, as returned for a single user or a user listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    pub acct_name: String,
    pub full_name: Option<String>,
    pub homedir: Option<String>,
    pub shell: Option<String>,
    pub user_sid: Sid,
    pub group_sid: Sid,
}

impl Wire for UserInfo {
    fn encode(&self, buf: &mut RecordBuf) {
        buf.put_string(Some(&self.acct_name));
        buf.put_string(self.full_name.as_deref());
        buf.put_string(self.homedir.as_deref());
        buf.put_string(self.shell.as_deref());
        buf.put_sid(&self.user_sid);
        buf.put_sid(&self.group_sid);
    }

    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self> {
        Ok(UserInfo {
            acct_name: required(cur, "account name")?,
            full_name: cur.get_string()?,
            homedir: cur.get_string()?,
            shell: cur.get_string()?,
            user_sid: cur.get_sid()?,
            group_sid: cur.get_sid()?,
        })
    }
}

/// One row of a domain or local group listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupEntry {
    pub name: String,
    pub description: Option<String>,
    pub rid: u32,
}

impl Wire for GroupEntry {
    fn encode(&self, buf: &mut RecordBuf) {
        buf.put_string(Some(&self.name));
        buf.put_string(self.description.as_deref());
        buf.put_u32(self.rid);
    }

    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self> {
        Ok(GroupEntry {
            name: required(cur, "group name")?,
            description: cur.get_string()?,
            rid: cur.get_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupMember {
    pub sid: Sid,
    pub name: Option<String>,
    pub sid_type: SidType,
}

impl Wire for GroupMember {
    fn encode(&self, buf: &mut RecordBuf) {
        buf.put_sid(&self.sid);
        buf.put_string(self.name.as_deref());
        buf.put_u32(self.sid_type.as_u32());
    }

    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self> {
        Ok(GroupMember {
            sid: cur.get_sid()?,
            name: cur.get_string()?,
            sid_type: SidType::from_u32(cur.get_u32()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrustedDomain {
    pub name: String,
    pub alt_name: Option<String>,
    pub sid: Sid,
}

impl Wire for TrustedDomain {
    fn encode(&self, buf: &mut RecordBuf) {
        buf.put_string(Some(&self.name));
        buf.put_string(self.alt_name.as_deref());
        buf.put_sid(&self.sid);
    }

    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self> {
        Ok(TrustedDomain {
            name: required(cur, "trusted domain name")?,
            alt_name: cur.get_string()?,
            sid: cur.get_sid()?,
        })
    }
}

/// Result of translating a name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameMapping {
    pub sid: Sid,
    pub sid_type: SidType,
}

/// Result of translating a SID.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SidMapping {
    pub domain_name: String,
    pub name: String,
    pub sid_type: SidType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutPolicy {
    pub duration: NtTime,
    pub reset_count: NtTime,
    pub bad_attempt_lockout: u16,
}

impl Wire for LockoutPolicy {
    fn encode(&self, buf: &mut RecordBuf) {
        buf.put_nttime(self.duration);
        buf.put_nttime(self.reset_count);
        buf.put_u16(self.bad_attempt_lockout);
    }

    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self> {
        Ok(LockoutPolicy {
            duration: cur.get_nttime()?,
            reset_count: cur.get_nttime()?,
            bad_attempt_lockout: cur.get_u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasswordPolicy {
    pub min_length: u16,
    pub history_length: u16,
    pub properties: u32,
    pub expire: NtTime,
    pub min_age: NtTime,
}

impl Wire for PasswordPolicy {
    fn encode(&self, buf: &mut RecordBuf) {
        buf.put_u16(self.min_length);
        buf.put_u16(self.history_length);
        buf.put_u32(self.properties);
        buf.put_nttime(self.expire);
        buf.put_nttime(self.min_age);
    }

    fn decode(cur: &mut Cursor<'_>) -> CacheResult<Self> {
        Ok(PasswordPolicy {
            min_length: cur.get_u16()?,
            history_length: cur.get_u16()?,
            properties: cur.get_u32()?,
            expire: cur.get_nttime()?,
            min_age: cur.get_nttime()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> Sid {
        s.parse().unwrap()
    }

    #[test]
    fn test_user_row_layout() {
        let user = UserInfo {
            acct_name: "alice".into(),
            full_name: None,
            homedir: Some("/home/alice".into()),
            shell: Some("/bin/sh".into()),
            user_sid: sid("S-1-5-21-1-2-3-1000"),
            group_sid: sid("S-1-5-21-1-2-3-513"),
        };
        let mut buf = RecordBuf::new();
        user.encode(&mut buf);
        // acct name: length byte then body
        assert_eq!(&buf.as_bytes()[..6], b"\x05alice");
        // null full name
        assert_eq!(buf.as_bytes()[6], 0xFF);

        let mut cur = Cursor::new(buf.as_bytes());
        assert_eq!(UserInfo::decode(&mut cur).unwrap(), user);
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn test_list_count_prefix() {
        let rids = vec![512u32, 513, 520];
        let mut buf = RecordBuf::new();
        encode_list(&mut buf, &rids);
        assert_eq!(&buf.as_bytes()[..4], &3u32.to_le_bytes());
        assert_eq!(decode_list::<u32>(&mut Cursor::new(buf.as_bytes())).unwrap(), rids);
    }

    #[test]
    fn test_list_count_past_end_is_corrupt() {
        let mut buf = RecordBuf::new();
        buf.put_u32(1_000_000);
        buf.put_u32(1);
        let err = decode_list::<u32>(&mut Cursor::new(buf.as_bytes())).unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { field: "list", .. }));
    }

    #[test]
    fn test_truncated_row_is_corrupt() {
        let mut buf = RecordBuf::new();
        buf.put_u32(2);
        GroupEntry { name: "admins".into(), description: None, rid: 512 }.encode(&mut buf);
        buf.put_string(Some("users"));
        assert!(decode_list::<GroupEntry>(&mut Cursor::new(buf.as_bytes())).is_err());
    }

    #[test]
    fn test_password_policy_layout() {
        let policy = PasswordPolicy {
            min_length: 7,
            history_length: 24,
            properties: 1,
            expire: NtTime(u64::MAX),
            min_age: NtTime(0),
        };
        let mut buf = RecordBuf::new();
        policy.encode(&mut buf);
        assert_eq!(buf.len(), 2 + 2 + 4 + 8 + 8);
        assert_eq!(PasswordPolicy::decode(&mut Cursor::new(buf.as_bytes())).unwrap(), policy);
    }
}

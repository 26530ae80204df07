//! Record field codec
//!
//! Every cached answer is a flat little-endian byte string. [`RecordBuf`]
//! appends fields, [`Cursor`] extracts them in the same order. Extraction
//! checks the remaining length before every read and fails with
//! [`CacheError::Corrupt`] instead of inventing a value.
//!
//! Field encodings:
//! - integers: little-endian u8 / u16 / u32
//! - NT time: low u32 then high u32
//! - POSIX time: u32 seconds
//! - string: u8 length then bytes; length 0xFF marks a null string,
//!   anything longer than 254 bytes is cut at a character boundary
//! - hash16: u8 length (always 16) then 16 bytes
//! - SID: its canonical text through the string encoding

use crate::error::{CacheError, CacheResult};
use crate::sid::Sid;

/// Initial writer capacity.
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Longest string body the codec writes.
pub const MAX_STRING_LEN: usize = 254;

/// Length byte of a null string.
const NULL_STRING: u8 = 0xFF;

/// Length of a stored verifier hash.
pub const HASH16_LEN: usize = 16;

/// A 64-bit NT timestamp or interval, stored split in two u32 halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NtTime(pub u64);

impl NtTime {
    pub fn from_parts(low: u32, high: u32) -> Self {
        NtTime(((high as u64) << 32) | low as u64)
    }

    pub fn low(self) -> u32 {
        self.0 as u32
    }

    pub fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

/// Growable writer for one record.
///
/// Capacity doubles (as many times as needed) whenever an append would not
/// fit.
#[derive(Debug, Clone)]
pub struct RecordBuf {
    buf: Vec<u8>,
    capacity: usize,
}

impl Default for RecordBuf {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RecordBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { buf: Vec::with_capacity(capacity), capacity }
    }

    fn ensure(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        if needed <= self.capacity {
            return;
        }
        while self.capacity < needed {
            self.capacity *= 2;
        }
        self.buf.reserve_exact(self.capacity - self.buf.len());
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.put_bytes(&[v]);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn put_nttime(&mut self, t: NtTime) {
        self.put_u32(t.low());
        self.put_u32(t.high());
    }

    /// POSIX seconds, truncated to 32 bits.
    pub fn put_time(&mut self, secs: u64) {
        self.put_u32(secs as u32);
    }

    /// Append a string, or the null marker for `None`.
    pub fn put_string(&mut self, s: Option<&str>) {
        let Some(s) = s else {
            self.put_u8(NULL_STRING);
            return;
        };
        let mut end = s.len().min(MAX_STRING_LEN);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.put_u8(end as u8);
        self.put_bytes(&s.as_bytes()[..end]);
    }

    pub fn put_hash16(&mut self, hash: &[u8; HASH16_LEN]) {
        self.put_u8(HASH16_LEN as u8);
        self.put_bytes(hash);
    }

    pub fn put_sid(&mut self, sid: &Sid) {
        self.put_string(Some(&sid.to_string()));
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current logical capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Checked reader over one record.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize, field: &'static str) -> CacheResult<&'a [u8]> {
        let available = self.remaining();
        if n > available {
            return Err(CacheError::Corrupt { field, needed: n, available });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self, field: &'static str) -> CacheResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> CacheResult<u8> {
        Ok(self.take_array::<1>("u8")?[0])
    }

    pub fn get_u16(&mut self) -> CacheResult<u16> {
        Ok(u16::from_le_bytes(self.take_array("u16")?))
    }

    pub fn get_u32(&mut self) -> CacheResult<u32> {
        Ok(u32::from_le_bytes(self.take_array("u32")?))
    }

    pub fn get_nttime(&mut self) -> CacheResult<NtTime> {
        let low = self.get_u32()?;
        let high = self.get_u32()?;
        Ok(NtTime::from_parts(low, high))
    }

    pub fn get_time(&mut self) -> CacheResult<u64> {
        Ok(self.get_u32()? as u64)
    }

    /// Read a string; `None` for the null marker.
    pub fn get_string(&mut self) -> CacheResult<Option<String>> {
        let len = self.get_u8()?;
        if len == NULL_STRING {
            return Ok(None);
        }
        let bytes = self.take(len as usize, "string")?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| CacheError::Malformed(format!("string is not UTF-8: {}", e)))
    }

    pub fn get_hash16(&mut self) -> CacheResult<[u8; HASH16_LEN]> {
        let len = self.get_u8()?;
        if len as usize != HASH16_LEN {
            return Err(CacheError::Malformed(format!("hash length {} (expected {})", len, HASH16_LEN)));
        }
        self.take_array("hash16")
    }

    pub fn get_sid(&mut self) -> CacheResult<Sid> {
        match self.get_string()? {
            Some(text) => text.parse(),
            None => Err(CacheError::Malformed("null string where a SID was expected".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_in_order() {
        let sid: Sid = "S-1-5-21-1-2-3-1000".parse().unwrap();
        let mut buf = RecordBuf::new();
        buf.put_u8(7);
        buf.put_u16(0xBEEF);
        buf.put_u32(0xDEAD_BEEF);
        buf.put_nttime(NtTime(0x0102_0304_0506_0708));
        buf.put_time(1_700_000_000);
        buf.put_string(Some("alice"));
        buf.put_string(None);
        buf.put_hash16(&[9u8; 16]);
        buf.put_sid(&sid);

        let mut cur = Cursor::new(buf.as_bytes());
        assert_eq!(cur.get_u8().unwrap(), 7);
        assert_eq!(cur.get_u16().unwrap(), 0xBEEF);
        assert_eq!(cur.get_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(cur.get_nttime().unwrap(), NtTime(0x0102_0304_0506_0708));
        assert_eq!(cur.get_time().unwrap(), 1_700_000_000);
        assert_eq!(cur.get_string().unwrap().as_deref(), Some("alice"));
        assert_eq!(cur.get_string().unwrap(), None);
        assert_eq!(cur.get_hash16().unwrap(), [9u8; 16]);
        assert_eq!(cur.get_sid().unwrap(), sid);
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn test_nttime_layout_is_low_then_high() {
        let mut buf = RecordBuf::new();
        buf.put_nttime(NtTime::from_parts(1, 2));
        assert_eq!(buf.as_bytes(), &[1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_long_string_truncated() {
        let mut buf = RecordBuf::new();
        buf.put_string(Some(&"x".repeat(300)));
        assert_eq!(buf.as_bytes()[0], 254);
        assert_eq!(buf.len(), 255);

        let s = Cursor::new(buf.as_bytes()).get_string().unwrap().unwrap();
        assert_eq!(s.len(), 254);
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // 253 ASCII bytes then a 2-byte character straddling the limit
        let text = format!("{}é", "a".repeat(253));
        let mut buf = RecordBuf::new();
        buf.put_string(Some(&text));
        assert_eq!(buf.as_bytes()[0], 253);
    }

    #[test]
    fn test_short_reads_are_corrupt() {
        let mut cur = Cursor::new(&[1, 2]);
        assert!(matches!(
            cur.get_u32(),
            Err(CacheError::Corrupt { field: "u32", needed: 4, available: 2 })
        ));

        // declared string length past the end
        let mut cur = Cursor::new(&[10, b'a', b'b']);
        assert!(matches!(cur.get_string(), Err(CacheError::Corrupt { field: "string", .. })));
    }

    #[test]
    fn test_hash_length_prefix_checked() {
        let mut data = vec![15u8];
        data.extend_from_slice(&[0u8; 16]);
        assert!(matches!(Cursor::new(&data).get_hash16(), Err(CacheError::Malformed(_))));
    }

    #[test]
    fn test_invalid_utf8_string_is_malformed() {
        let mut cur = Cursor::new(&[3, b'a', 0xFF, b'b']);
        assert!(matches!(cur.get_string(), Err(CacheError::Malformed(_))));
    }

    #[test]
    fn test_null_sid_string_rejected() {
        assert!(Cursor::new(&[0xFF]).get_sid().is_err());
    }

    #[test]
    fn test_capacity_doubles_until_it_fits() {
        let mut buf = RecordBuf::with_capacity(4);
        buf.put_u32(1);
        assert_eq!(buf.capacity(), 4);
        buf.put_u8(2);
        assert_eq!(buf.capacity(), 8);
        buf.put_string(Some(&"y".repeat(40)));
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(RecordBuf::new().capacity(), DEFAULT_CAPACITY);
    }
}

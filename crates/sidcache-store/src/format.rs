//! Binary format of journal entries
//!
//! Every journal entry is an `EntryHeader` (16 bytes) followed by the payload:
//! key_len(u16) + value_len(u32) + key_bytes + value_bytes

use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying journal entries: "SIDC"
pub const MAGIC: [u8; 4] = *b"SIDC";

/// Largest key the format can carry (u16 length field)
pub const MAX_KEY_SIZE: usize = u16::MAX as usize;

/// Largest value the store accepts (64MB)
pub const MAX_VALUE_SIZE: usize = 64 * 1024 * 1024;

/// Header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Fixed payload prefix: key_len(2) + value_len(4)
const PAYLOAD_PREFIX: usize = 6;

/// Journal operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    /// Insert or replace a key
    Put = 1,
    /// Remove a key
    Delete = 2,
}

impl Operation {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Operation::Put),
            2 => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// Fixed-size header for each journal entry
///
/// Layout:
///   [0..4]   magic:     "SIDC"
///   [4..8]   length:    u32 LE - payload length in bytes
///   [8..12]  checksum:  u32 LE - CRC32C of payload bytes
///   [12]     operation: u8
///   [13..16] reserved, zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub magic: [u8; 4],
    pub length: u32,
    pub checksum: u32,
    pub operation: u8,
}

impl EntryHeader {
    pub fn new(length: u32, checksum: u32, op: Operation) -> Self {
        Self { magic: MAGIC, length, checksum, operation: op as u8 }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12] = self.operation;
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            operation: bytes[12],
        }
    }
}

/// A decoded journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub operation: Operation,
}

/// Bytes an entry occupies in the journal.
pub fn encoded_len(key_len: usize, value_len: usize) -> u64 {
    (HEADER_SIZE + PAYLOAD_PREFIX + key_len + value_len) as u64
}

/// Serialize one journal entry.
pub fn encode_entry(key: &[u8], value: &[u8], op: Operation) -> StoreResult<Vec<u8>> {
    // Size checks come before any allocation
    if key.len() > MAX_KEY_SIZE {
        return Err(StoreError::OversizedEntry {
            entry_size: key.len() as u64,
            max_size: MAX_KEY_SIZE as u64,
            component: "key",
        });
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(StoreError::OversizedEntry {
            entry_size: value.len() as u64,
            max_size: MAX_VALUE_SIZE as u64,
            component: "value",
        });
    }

    let payload_len = PAYLOAD_PREFIX + key.len() + value.len();
    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload_len);
    buffer.extend_from_slice(&[0u8; HEADER_SIZE]);
    buffer.extend_from_slice(&(key.len() as u16).to_le_bytes());
    buffer.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buffer.extend_from_slice(key);
    buffer.extend_from_slice(value);

    let checksum = crc32c::crc32c(&buffer[HEADER_SIZE..]);
    let header = EntryHeader::new(payload_len as u32, checksum, op);
    buffer[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

    Ok(buffer)
}

/// Decode the entry at the start of `data`.
///
/// `path` and `base` only feed error context. Returns the entry and the
/// number of bytes it occupied.
pub fn decode_entry(data: &[u8], path: &Path, base: u64) -> StoreResult<(JournalEntry, usize)> {
    if data.len() < HEADER_SIZE {
        return Err(StoreError::TornWrite {
            path: path.to_path_buf(),
            expected_size: HEADER_SIZE as u32,
            available_bytes: data.len() as u64,
            offset: base,
        });
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&data[..HEADER_SIZE]);
    let header = EntryHeader::from_bytes(&header_bytes);

    if header.magic != MAGIC {
        return Err(StoreError::NoMagicFound {
            path: path.to_path_buf(),
            offset: base,
            found_bytes: header.magic,
        });
    }

    let payload_end = HEADER_SIZE + header.length as usize;
    if data.len() < payload_end {
        return Err(StoreError::TornWrite {
            path: path.to_path_buf(),
            expected_size: header.length,
            available_bytes: (data.len() - HEADER_SIZE) as u64,
            offset: base + HEADER_SIZE as u64,
        });
    }

    let payload = &data[HEADER_SIZE..payload_end];
    let computed = crc32c::crc32c(payload);
    if computed != header.checksum {
        return Err(StoreError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum,
            actual: computed,
            offset: base + HEADER_SIZE as u64,
        });
    }

    let operation = Operation::from_u8(header.operation).ok_or_else(|| StoreError::JournalCorrupted {
        path: path.to_path_buf(),
        offset: base + 12,
        reason: format!("invalid operation type: {}", header.operation),
    })?;

    if payload.len() < PAYLOAD_PREFIX {
        return Err(StoreError::JournalCorrupted {
            path: path.to_path_buf(),
            offset: base + HEADER_SIZE as u64,
            reason: "payload too short for length fields".to_string(),
        });
    }

    let key_len = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    let value_len = u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]) as usize;
    let key_end = PAYLOAD_PREFIX + key_len;
    let value_end = key_end + value_len;

    if payload.len() != value_end {
        return Err(StoreError::JournalCorrupted {
            path: path.to_path_buf(),
            offset: base + HEADER_SIZE as u64,
            reason: format!(
                "payload is {} bytes but key({}) + value({}) need {}",
                payload.len(), key_len, value_len, value_end
            ),
        });
    }

    let entry = JournalEntry {
        key: payload[PAYLOAD_PREFIX..key_end].to_vec(),
        value: payload[key_end..value_end].to_vec(),
        operation,
    };
    Ok((entry, payload_end))
}

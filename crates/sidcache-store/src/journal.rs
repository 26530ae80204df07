//! Append-only journal backing the store
//!
//! The store keeps its working set in RAM and appends every mutation to a
//! single journal file. Opening the store replays the journal; compaction
//! rewrites it with only the live entries.
//!
//! Write ordering: the journal append happens BEFORE the RAM update, so a
//! change that is visible to readers has always reached the file (and, in
//! durable mode, stable storage).
//!
//! Several handles may append to the same file. Each one remembers how far
//! it has replayed and reads only the tail past that point.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::format::{decode_entry, encode_entry, JournalEntry, Operation, HEADER_SIZE, MAGIC};
use crate::platform::sync_data;

/// Appends entries to the journal file.
pub struct JournalWriter {
    file: File,
    path: PathBuf,
    /// Current file size, tracked to avoid stat calls
    size: u64,
}

impl JournalWriter {
    /// Open the journal for appending, creating it if missing.
    /// `truncate` discards any existing content.
    pub fn open(path: &Path, truncate: bool) -> StoreResult<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options
            .open(path)
            .map_err(|e| StoreError::io(path, e, "failed to open journal"))?;

        let size = file
            .metadata()
            .map_err(|e| StoreError::io(path, e, "failed to stat journal"))?
            .len();

        Ok(Self { file, path: path.to_path_buf(), size })
    }

    /// Append one entry. With `durable`, the call returns only after the
    /// bytes reached stable storage.
    pub fn append(&mut self, key: &[u8], value: &[u8], op: Operation, durable: bool) -> StoreResult<()> {
        let entry = encode_entry(key, value, op)?;

        self.file
            .write_all(&entry)
            .map_err(|e| StoreError::io(&self.path, e, "journal write failed"))?;

        if durable {
            sync_data(&self.file).map_err(|e| StoreError::io(&self.path, e, "journal sync failed"))?;
        }

        self.size += entry.len() as u64;
        Ok(())
    }

    /// Flush everything appended so far to stable storage.
    pub fn sync(&self) -> StoreResult<()> {
        sync_data(&self.file).map_err(|e| StoreError::io(&self.path, e, "journal sync failed"))
    }

    /// Pick up appends made through other handles.
    pub fn refresh_size(&mut self) -> StoreResult<u64> {
        self.size = self
            .file
            .metadata()
            .map_err(|e| StoreError::io(&self.path, e, "failed to stat journal"))?
            .len();
        Ok(self.size)
    }

    /// Cut the file back to `len`, dropping a torn tail left by a crashed writer.
    pub fn truncate_to(&mut self, len: u64) -> StoreResult<()> {
        // the append handle may lack plain write access on some platforms
        OpenOptions::new()
            .write(true)
            .open(&self.path)
            .and_then(|file| file.set_len(len))
            .map_err(|e| StoreError::io(&self.path, e, "failed to truncate journal"))?;
        self.size = len;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the journal file.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Replays a journal file.
pub struct JournalReader {
    path: PathBuf,
}

/// Entries read from one replay and where decoding stopped.
#[derive(Debug, Default)]
pub struct Replay {
    pub entries: Vec<JournalEntry>,
    /// Offset just past the last complete entry; a torn tail starts here
    pub end: u64,
}

impl JournalReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Read every recoverable entry in file order.
    pub fn recover_entries(&self) -> StoreResult<Vec<JournalEntry>> {
        Ok(self.recover_from(0)?.entries)
    }

    /// Read the entries that start at or after byte `start`.
    ///
    /// - bad magic or checksum: skip forward to the next magic
    /// - incomplete entry at the end of the file: stop, this is the crash point
    /// - missing file: empty journal
    pub fn recover_from(&self, start: u64) -> StoreResult<Replay> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Replay { entries: Vec::new(), end: start })
            }
            Err(e) => return Err(StoreError::io(&self.path, e, "failed to open journal for recovery")),
        };

        let mut buffer = Vec::new();
        file.seek(SeekFrom::Start(start))
            .and_then(|_| file.read_to_end(&mut buffer))
            .map_err(|e| StoreError::io(&self.path, e, "failed to read journal"))?;

        let mut entries = Vec::new();
        let mut offset = 0;

        while offset + HEADER_SIZE <= buffer.len() {
            let at = start + offset as u64;
            match decode_entry(&buffer[offset..], &self.path, at) {
                Ok((entry, used)) => {
                    entries.push(entry);
                    offset += used;
                }
                Err(StoreError::TornWrite { expected_size, available_bytes, .. }) => {
                    warn!(
                        path = %self.path.display(),
                        offset = at,
                        expected_size,
                        available_bytes,
                        "torn write at journal tail, stopping recovery"
                    );
                    break;
                }
                Err(e) => {
                    warn!(path = %self.path.display(), offset = at, error = %e, "corrupt journal entry, resyncing");
                    match find_next_magic(&buffer, offset + 1) {
                        Some(next) => offset = next,
                        None => break,
                    }
                }
            }
        }

        Ok(Replay { entries, end: start + offset as u64 })
    }
}

/// Position of the next entry magic at or after `start`.
fn find_next_magic(buffer: &[u8], start: usize) -> Option<usize> {
    if buffer.len() < MAGIC.len() {
        return None;
    }
    (start..=buffer.len() - MAGIC.len()).find(|&i| buffer[i..i + MAGIC.len()] == MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal_path(dir: &TempDir) -> PathBuf {
        dir.path().join("cache.journal")
    }

    #[test]
    fn test_write_then_recover() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);

        let mut writer = JournalWriter::open(&path, false).unwrap();
        writer.append(b"NS/HOME/ALICE", b"v1", Operation::Put, true).unwrap();
        writer.append(b"NS/HOME/BOB", b"v2", Operation::Put, false).unwrap();
        writer.append(b"NS/HOME/ALICE", b"", Operation::Delete, false).unwrap();
        writer.sync().unwrap();
        drop(writer);

        let entries = JournalReader::new(&path).recover_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, b"NS/HOME/ALICE");
        assert_eq!(entries[1].value, b"v2");
        assert_eq!(entries[2].operation, Operation::Delete);
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);

        let mut writer = JournalWriter::open(&path, false).unwrap();
        writer.append(b"good1", b"val1", Operation::Put, false).unwrap();
        let first_len = writer.size() as usize;
        writer.append(b"good2", b"val2", Operation::Put, false).unwrap();
        writer.append(b"good3", b"val3", Operation::Put, false).unwrap();
        drop(writer);

        // flip a payload byte of the second entry
        let mut data = std::fs::read(&path).unwrap();
        data[first_len + HEADER_SIZE + 8] ^= 0xFF;
        std::fs::write(&path, data).unwrap();

        let entries = JournalReader::new(&path).recover_entries().unwrap();
        let keys: Vec<&[u8]> = entries.iter().map(|e| e.key.as_slice()).collect();
        assert_eq!(keys, vec![&b"good1"[..], &b"good3"[..]]);
    }

    #[test]
    fn test_torn_tail_stops_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);

        let mut writer = JournalWriter::open(&path, false).unwrap();
        writer.append(b"complete", b"entry", Operation::Put, false).unwrap();
        drop(writer);

        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&MAGIC);
        data.extend_from_slice(&[0xFF, 0x00, 0x00, 0x00]);
        data.extend_from_slice(&[0u8; 8]);
        std::fs::write(&path, data).unwrap();

        let entries = JournalReader::new(&path).recover_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, b"complete");
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let dir = TempDir::new().unwrap();
        let entries = JournalReader::new(journal_path(&dir)).recover_entries().unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_recover_from_reads_only_the_tail() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);

        let mut writer = JournalWriter::open(&path, false).unwrap();
        writer.append(b"UL/HOME", b"old", Operation::Put, false).unwrap();
        let first_end = writer.size();
        writer.append(b"GL/HOME/domain", b"new", Operation::Put, false).unwrap();
        drop(writer);

        let replay = JournalReader::new(&path).recover_from(first_end).unwrap();
        assert_eq!(replay.entries.len(), 1);
        assert_eq!(replay.entries[0].key, b"GL/HOME/domain");
        assert_eq!(replay.end, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_replay_end_stops_before_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);

        let mut writer = JournalWriter::open(&path, false).unwrap();
        writer.append(b"complete", b"entry", Operation::Put, false).unwrap();
        let good_end = writer.size();
        drop(writer);

        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&MAGIC);
        data.extend_from_slice(&[0x40, 0x00, 0x00, 0x00]);
        std::fs::write(&path, data).unwrap();

        let replay = JournalReader::new(&path).recover_from(0).unwrap();
        assert_eq!(replay.end, good_end);

        let mut writer = JournalWriter::open(&path, false).unwrap();
        writer.truncate_to(replay.end).unwrap();
        writer.append(b"after", b"crash", Operation::Put, false).unwrap();
        drop(writer);

        let keys: Vec<Vec<u8>> =
            JournalReader::new(&path).recover_entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![b"complete".to_vec(), b"after".to_vec()]);
    }

    #[test]
    fn test_missing_journal_replays_nothing_from_offset() {
        let dir = TempDir::new().unwrap();
        let replay = JournalReader::new(journal_path(&dir)).recover_from(64).unwrap();
        assert!(replay.entries.is_empty());
        assert_eq!(replay.end, 64);
    }

    #[test]
    fn test_truncate_discards_content() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);

        let mut writer = JournalWriter::open(&path, false).unwrap();
        writer.append(b"k", b"v", Operation::Put, false).unwrap();
        drop(writer);

        let writer = JournalWriter::open(&path, true).unwrap();
        assert_eq!(writer.size(), 0);
        assert!(JournalReader::new(&path).recover_entries().unwrap().is_empty());
    }
}

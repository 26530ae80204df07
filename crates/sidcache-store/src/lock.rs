//! Cross-process locking around the journal
//!
//! Every process that opens the same journal also opens two sibling files:
//!
//! - `<journal>.lock`: held shared by readers and exclusive by writers for
//!   the length of one operation. Its first 8 bytes hold the journal
//!   generation, bumped whenever the journal is replaced or emptied, so
//!   other handles know to replay from the start.
//! - `<journal>.open`: held shared for as long as a handle is open. Whoever
//!   can take it exclusively is the only opener.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

/// An advisory lock on one file.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e, "failed to open lock file"))?;
        Ok(Self { file, path: path.to_path_buf() })
    }

    /// Block until the lock is held.
    pub fn lock(&self, kind: LockKind) -> StoreResult<()> {
        platform::lock(&self.file, kind == LockKind::Exclusive, true)
            .map(|_| ())
            .map_err(|e| StoreError::io(&self.path, e, "failed to take lock"))
    }

    /// Take the lock if nobody holds a conflicting one.
    pub fn try_lock(&self, kind: LockKind) -> StoreResult<bool> {
        platform::lock(&self.file, kind == LockKind::Exclusive, false)
            .map_err(|e| StoreError::io(&self.path, e, "failed to take lock"))
    }

    pub fn unlock(&self) -> StoreResult<()> {
        platform::unlock(&self.file).map_err(|e| StoreError::io(&self.path, e, "failed to release lock"))
    }

    /// Lock until the guard drops.
    pub fn guard(&self, kind: LockKind) -> StoreResult<LockGuard<'_>> {
        self.lock(kind)?;
        Ok(LockGuard { lock: self })
    }

    /// Generation counter; a new lock file reads as 0.
    pub fn read_counter(&self) -> StoreResult<u64> {
        let mut buf = [0u8; 8];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| StoreError::io(&self.path, e, "failed to seek lock file"))?;
        match file.read_exact(&mut buf) {
            Ok(()) => Ok(u64::from_le_bytes(buf)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(StoreError::io(&self.path, e, "failed to read generation")),
        }
    }

    /// Caller must hold the lock exclusively.
    pub fn write_counter(&self, value: u64) -> StoreResult<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&value.to_le_bytes()))
            .map_err(|e| StoreError::io(&self.path, e, "failed to write generation"))
    }
}

/// Releases its lock on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a FileLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            warn!(path = %self.lock.path.display(), error = %e, "failed to release journal lock");
        }
    }
}

/// `<path><suffix>`, next to the journal.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

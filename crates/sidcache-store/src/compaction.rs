//! Journal compaction
//!
//! Overwrites and deletes leave dead entries in the journal. Compaction
//! writes the live set to a fresh file and swaps it in with the atomic
//! rename pattern:
//! 1. Write live entries to `<journal>.compact`
//! 2. Sync the new file
//! 3. Rename it over the journal (atomic on POSIX)
//! 4. Sync the parent directory
//!
//! A crash before the rename leaves the old journal intact and an orphaned
//! temp file, which the next compaction truncates.
//!
//! Callers hold the journal lock exclusively and bump the generation
//! afterwards; handles in other processes still point at the replaced file
//! until they see the new generation.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::format::{encode_entry, Operation};
use crate::lock::sibling_path;
use crate::platform::{sync_data, sync_dir};

/// Outcome of one compaction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    pub journal_path: PathBuf,
    /// Entries written to the new journal
    pub live_entries: usize,
    pub original_bytes: u64,
    pub compacted_bytes: u64,
}

impl CompactionResult {
    /// Space saved in bytes.
    pub fn bytes_saved(&self) -> u64 {
        self.original_bytes.saturating_sub(self.compacted_bytes)
    }
}

/// Fraction of the journal occupied by dead entries.
pub fn dead_space_ratio(live_bytes: u64, journal_bytes: u64) -> f64 {
    if journal_bytes == 0 {
        return 0.0;
    }
    1.0 - (live_bytes.min(journal_bytes) as f64 / journal_bytes as f64)
}

/// Rewrite `journal_path` so it holds exactly `live`.
pub fn compact_journal<'a, I>(journal_path: &Path, live: I) -> StoreResult<CompactionResult>
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let original_bytes = match fs::metadata(journal_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => return Err(StoreError::io(journal_path, e, "failed to stat journal for compaction")),
    };

    let compact_path = compact_path_for(journal_path);
    let mut live_entries = 0usize;
    let mut compacted_bytes = 0u64;

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&compact_path)
            .map_err(|e| StoreError::io(&compact_path, e, "failed to create compact file"))?;

        for (key, value) in live {
            let entry = encode_entry(key, value, Operation::Put)?;
            file.write_all(&entry)
                .map_err(|e| StoreError::io(&compact_path, e, "compact write failed"))?;
            live_entries += 1;
            compacted_bytes += entry.len() as u64;
        }

        sync_data(&file).map_err(|e| StoreError::io(&compact_path, e, "compact sync failed"))?;
    }

    fs::rename(&compact_path, journal_path)
        .map_err(|e| StoreError::io(journal_path, e, "failed to rename compacted journal"))?;

    if let Some(parent) = journal_path.parent() {
        sync_dir(parent).map_err(|e| StoreError::io(parent, e, "failed to sync journal directory"))?;
    }

    Ok(CompactionResult {
        journal_path: journal_path.to_path_buf(),
        live_entries,
        original_bytes,
        compacted_bytes,
    })
}

fn compact_path_for(journal_path: &Path) -> PathBuf {
    sibling_path(journal_path, ".compact")
}

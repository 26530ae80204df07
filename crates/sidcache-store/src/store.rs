//! The store: RAM hash table in front of a journal file.
//!
//! **Read path**: shared journal lock, replay the journal tail, read RAM
//! **Write path**: exclusive journal lock, replay the tail, journal append, RAM
//! **Open**: replay the journal (or empty it), compact when mostly dead
//!
//! The journal lock and the generation counter live in `lock.rs`. A handle
//! whose generation is stale drops its RAM table and replays from offset 0.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::compaction::{compact_journal, dead_space_ratio, CompactionResult};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::format::{encoded_len, JournalEntry, Operation};
use crate::journal::{JournalReader, JournalWriter};
use crate::lock::{sibling_path, FileLock, LockKind};

/// What to do with an existing journal on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Replay it; the store comes back with its previous content
    Preserve,
    /// Discard it unless another handle has it open
    ClearIfFirst,
    /// Discard it; the store starts empty, for every open handle
    Truncate,
}

/// Behaviour of `Store::store` when the key is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// Overwrite the existing value
    #[default]
    Replace,
    /// Fail with `StoreError::KeyExists`
    Insert,
}

/// Returned by a traversal callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// What this handle knows about the journal file.
struct JournalState {
    writer: JournalWriter,
    /// Offset up to which the RAM table reflects the journal
    replayed_to: u64,
    /// Generation the RAM table was built from
    generation: u64,
}

/// Key/value store with a single journal file.
///
/// All methods take `&self`. Within a handle, operations serialize on the
/// journal mutex; across handles and processes, on `<journal>.lock`.
pub struct Store {
    /// RAM working set
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    journal: Mutex<JournalState>,
    /// Journal bytes that the live entries would occupy after compaction
    live_bytes: AtomicU64,
    lock: FileLock,
    /// Held shared while this handle is open
    presence: FileLock,
    path: PathBuf,
    config: StoreConfig,
}

impl Store {
    /// Open or create the store whose journal lives at `path`.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode, config: StoreConfig) -> StoreResult<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(parent, e, "failed to create store directory"))?;
        }

        let lock = FileLock::open(&sibling_path(&path, ".lock"))?;
        let presence = FileLock::open(&sibling_path(&path, ".open"))?;
        let writer = JournalWriter::open(&path, false)?;

        let store = Self {
            data: RwLock::new(HashMap::new()),
            journal: Mutex::new(JournalState { writer, replayed_to: 0, generation: 0 }),
            live_bytes: AtomicU64::new(0),
            lock,
            presence,
            path,
            config,
        };
        store.initialize(mode)?;
        Ok(store)
    }

    fn initialize(&self, mode: OpenMode) -> StoreResult<()> {
        let mut state = self.journal.lock();
        let _guard = self.lock.guard(LockKind::Exclusive)?;

        let first = self.presence.try_lock(LockKind::Exclusive)?;
        if first {
            self.presence.unlock()?;
        }
        self.presence.lock(LockKind::Shared)?;

        let clear = match mode {
            OpenMode::Preserve => false,
            OpenMode::ClearIfFirst => first,
            OpenMode::Truncate => true,
        };

        state.generation = self.lock.read_counter()?;
        if clear {
            state.writer = JournalWriter::open(&self.path, true)?;
            self.bump_generation(&mut state)?;
        }
        self.catch_up(&mut state)?;

        debug!(
            path = %self.path.display(),
            ?mode,
            first,
            cleared = clear,
            entries = self.data.read().len(),
            journal_bytes = state.writer.size(),
            "store opened"
        );

        if !clear && dead_space_ratio(self.live_bytes.load(Ordering::Relaxed), state.writer.size())
            > self.config.compaction_trigger_ratio
        {
            let result = self.compact_locked(&mut state)?;
            debug!(saved = result.bytes_saved(), live = result.live_entries, "journal compacted on open");
        }
        Ok(())
    }

    /// Record that the journal was replaced or emptied.
    fn bump_generation(&self, state: &mut JournalState) -> StoreResult<()> {
        state.generation = state.generation.wrapping_add(1);
        self.lock.write_counter(state.generation)?;
        state.replayed_to = 0;
        Ok(())
    }

    /// Bring the RAM table up to date with what other handles wrote.
    /// Caller holds the journal lock.
    fn catch_up(&self, state: &mut JournalState) -> StoreResult<()> {
        let generation = self.lock.read_counter()?;
        if generation != state.generation {
            debug!(path = %self.path.display(), from = state.generation, to = generation, "journal replaced, replaying");
            state.writer = JournalWriter::open(&self.path, false)?;
            state.generation = generation;
            state.replayed_to = 0;
            self.data.write().clear();
            self.live_bytes.store(0, Ordering::Relaxed);
        }

        let replay = JournalReader::new(&self.path).recover_from(state.replayed_to)?;
        if !replay.entries.is_empty() {
            let mut data = self.data.write();
            for entry in replay.entries {
                self.apply(&mut data, entry);
            }
        }
        state.replayed_to = replay.end;
        state.writer.refresh_size()?;
        Ok(())
    }

    fn apply(&self, data: &mut HashMap<Vec<u8>, Vec<u8>>, entry: JournalEntry) {
        let old = match entry.operation {
            Operation::Put => {
                self.live_bytes.fetch_add(encoded_len(entry.key.len(), entry.value.len()), Ordering::Relaxed);
                data.insert(entry.key.clone(), entry.value)
            }
            Operation::Delete => data.remove(&entry.key),
        };
        if let Some(old) = old {
            self.live_bytes.fetch_sub(encoded_len(entry.key.len(), old.len()), Ordering::Relaxed);
        }
    }

    /// Run `f` under the journal lock after catching up.
    fn locked<R>(&self, kind: LockKind, f: impl FnOnce(&mut JournalState) -> StoreResult<R>) -> StoreResult<R> {
        let mut state = self.journal.lock();
        let _guard = self.lock.guard(kind)?;
        self.catch_up(&mut state)?;
        f(&mut *state)
    }

    /// Append one entry and apply it. Caller holds the lock exclusively.
    fn write_entry(&self, state: &mut JournalState, entry: JournalEntry) -> StoreResult<()> {
        if state.writer.size() > state.replayed_to {
            warn!(
                path = %self.path.display(),
                offset = state.replayed_to,
                bytes = state.writer.size() - state.replayed_to,
                "dropping torn journal tail"
            );
            state.writer.truncate_to(state.replayed_to)?;
        }

        state
            .writer
            .append(&entry.key, &entry.value, entry.operation, self.config.durable_writes)?;
        state.replayed_to = state.writer.size();
        self.apply(&mut self.data.write(), entry);
        Ok(())
    }

    fn check_limits(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        if key.len() > self.config.max_key_size {
            return Err(StoreError::OversizedEntry {
                entry_size: key.len() as u64,
                max_size: self.config.max_key_size as u64,
                component: "key",
            });
        }
        if value.len() > self.config.max_value_size {
            return Err(StoreError::OversizedEntry {
                entry_size: value.len() as u64,
                max_size: self.config.max_value_size as u64,
                component: "value",
            });
        }
        Ok(())
    }

    /// Value stored under `key`.
    pub fn fetch(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.locked(LockKind::Shared, |_| Ok(self.data.read().get(key).cloned()))
    }

    /// Presence check without copying the value.
    pub fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        self.locked(LockKind::Shared, |_| Ok(self.data.read().contains_key(key)))
    }

    /// Write `value` under `key`. If the journal append fails, RAM is not touched.
    pub fn store(&self, key: &[u8], value: &[u8], mode: StoreMode) -> StoreResult<()> {
        self.check_limits(key, value)?;

        self.locked(LockKind::Exclusive, |state| {
            if mode == StoreMode::Insert && self.data.read().contains_key(key) {
                return Err(StoreError::KeyExists { key_len: key.len() });
            }
            let entry = JournalEntry { key: key.to_vec(), value: value.to_vec(), operation: Operation::Put };
            self.write_entry(state, entry)
        })
    }

    /// Remove `key`. Returns whether it was present; absent keys are not journaled.
    pub fn delete(&self, key: &[u8]) -> StoreResult<bool> {
        self.locked(LockKind::Exclusive, |state| {
            if !self.data.read().contains_key(key) {
                return Ok(false);
            }
            let entry = JournalEntry { key: key.to_vec(), value: Vec::new(), operation: Operation::Delete };
            self.write_entry(state, entry)?;
            Ok(true)
        })
    }

    /// Visit every entry in key order until the callback returns `Visit::Stop`.
    ///
    /// The callback sees a snapshot taken before the first visit, with no
    /// lock held, so it may call `delete` (or `store`) on this store,
    /// including for the key it is currently visiting. Returns the number of
    /// entries visited.
    pub fn traverse<F>(&self, mut visit: F) -> StoreResult<usize>
    where
        F: FnMut(&[u8], &[u8]) -> Visit,
    {
        let mut snapshot: Vec<(Vec<u8>, Vec<u8>)> = self.locked(LockKind::Shared, |_| {
            Ok(self.data.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        })?;
        snapshot.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut visited = 0;
        for (key, value) in &snapshot {
            visited += 1;
            if visit(key, value) == Visit::Stop {
                break;
            }
        }
        Ok(visited)
    }

    /// All entries whose key starts with `prefix`, sorted by key.
    pub fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut results: Vec<(Vec<u8>, Vec<u8>)> = self.locked(LockKind::Shared, |_| {
            Ok(self
                .data
                .read()
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })?;
        results.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(results)
    }

    /// Count entries whose key starts with `prefix`.
    pub fn prefix_count(&self, prefix: &[u8]) -> StoreResult<usize> {
        self.locked(LockKind::Shared, |_| {
            Ok(self.data.read().keys().filter(|k| k.starts_with(prefix)).count())
        })
    }

    /// Number of live keys.
    pub fn len(&self) -> StoreResult<usize> {
        self.locked(LockKind::Shared, |_| Ok(self.data.read().len()))
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the journal file on disk.
    pub fn disk_size(&self) -> StoreResult<u64> {
        std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| StoreError::io(&self.path, e, "failed to stat journal"))
    }

    /// Fraction of the journal that compaction would reclaim, as of the last
    /// operation on this handle.
    pub fn dead_space_ratio(&self) -> f64 {
        let journal_bytes = self.journal.lock().writer.size();
        dead_space_ratio(self.live_bytes.load(Ordering::Relaxed), journal_bytes)
    }

    /// Flush journal appends to stable storage.
    pub fn sync(&self) -> StoreResult<()> {
        self.journal.lock().writer.sync()
    }

    /// Rewrite the journal with only the live entries.
    pub fn compact(&self) -> StoreResult<CompactionResult> {
        self.locked(LockKind::Exclusive, |state| self.compact_locked(state))
    }

    /// Caller holds the lock exclusively and has caught up.
    fn compact_locked(&self, state: &mut JournalState) -> StoreResult<CompactionResult> {
        let result = {
            let data = self.data.read();
            compact_journal(&self.path, data.iter().map(|(k, v)| (k.as_slice(), v.as_slice())))?
        };
        state.writer = JournalWriter::open(&self.path, false)?;
        self.bump_generation(state)?;
        state.replayed_to = state.writer.size();
        self.live_bytes.store(result.compacted_bytes, Ordering::Relaxed);
        Ok(result)
    }

    /// Sync and release the store.
    pub fn close(self) -> StoreResult<()> {
        self.sync()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("entries", &self.data.read().len())
            .finish()
    }
}

//! sidcache-store - journaled key/value store for the identity cache
//!
//! A small embedded key-value store: the working set lives in a RAM hash
//! table, every mutation is appended to one checksummed journal file, and
//! opening the store replays that journal.
//!
//! # Guarantees
//!
//! - Per-key atomic `store`/`delete`; no multi-key transactions
//! - Torn tail writes and corrupt entries are skipped on replay
//! - `OpenMode::Preserve` survives restarts, `OpenMode::Truncate` starts empty
//! - `traverse` works on a snapshot, so callbacks may delete while iterating
//! - Several handles, in one process or many, may share one journal; every
//!   operation replays what the others appended first
//! - `OpenMode::ClearIfFirst` empties the journal only for the first opener

pub mod compaction;
pub mod config;
pub mod error;
pub mod format;
pub mod journal;
pub mod lock;
pub mod platform;
pub mod store;

pub use compaction::CompactionResult;
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use store::{OpenMode, Store, StoreMode, Visit};

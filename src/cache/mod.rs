//! Persistent compile cache
//!
//! Provides content-addressed caching of compiled artifacts keyed by
//! structural graph fingerprints. Entries are immutable once published.
//!
//! # Entry States
//!
//! | State | Readable | Description |
//! |-------|----------|-------------|
//! | Building | no | Slot being written, or left by a crashed writer |
//! | Complete | yes | Published by rename, immutable |

pub mod compile;
pub mod entry;
pub mod service;

pub use compile::{CacheStats, CompileCache, CorruptEntryPolicy};
pub use entry::{format_bytes, CacheEntry, EntryMeta, EntrySlot, EntryState};
pub use service::{CacheService, DirCacheService, Lookup};

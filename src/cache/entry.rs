//! Cache entry state and metadata
//!
//! Tracks entry state (building, complete) and the `meta.json`
//! record written next to every persisted artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// File names inside an entry directory
pub mod files {
    /// Serialized compiled artifact
    pub const COMPUTE: &str = "compute.json";
    /// Full fingerprint the entry was stored under
    pub const KEY: &str = "key.json";
    /// Entry metadata
    pub const META: &str = "meta.json";
}

/// State of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Staging slot being written, or left behind by a crashed writer
    Building,
    /// Published and immutable
    Complete,
}

impl EntryState {
    /// Whether the entry may be served as a cache hit
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Metadata persisted as `meta.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Fingerprint digest
    pub digest: String,
    /// State at the time the record was written
    pub state: EntryState,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// Size of the serialized artifact in bytes (once known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Backend that produced the artifact (once known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

impl EntryMeta {
    /// Metadata for a freshly created staging slot
    pub fn building(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            state: EntryState::Building,
            created_at: Utc::now(),
            size_bytes: None,
            backend: None,
        }
    }

    /// Mark complete with the final artifact size
    pub fn complete(mut self, size_bytes: u64, backend: &str) -> Self {
        self.state = EntryState::Complete;
        self.size_bytes = Some(size_bytes);
        self.backend = Some(backend.to_string());
        self
    }
}

/// A cache entry location for one fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Fingerprint digest
    pub digest: String,
    /// Entry directory
    pub dir: PathBuf,
    /// Current state
    pub state: EntryState,
}

impl CacheEntry {
    pub fn new(digest: impl Into<String>, dir: PathBuf, state: EntryState) -> Self {
        Self {
            digest: digest.into(),
            dir,
            state,
        }
    }

    pub fn compute_path(&self) -> PathBuf {
        self.dir.join(files::COMPUTE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(files::KEY)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(files::META)
    }
}

/// Writable staging location handed out on a miss
///
/// Unique per request; becomes visible to readers only once committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySlot {
    /// Fingerprint digest
    pub digest: String,
    /// Private directory the artifact is written into
    pub staging: PathBuf,
    /// Where the entry is published
    pub target: PathBuf,
}

impl EntrySlot {
    pub fn compute_path(&self) -> PathBuf {
        self.staging.join(files::COMPUTE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.staging.join(files::KEY)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.staging.join(files::META)
    }
}

//! Cache service: maps fingerprints to storage locations
//!
//! `DirCacheService` lays entries out on the local filesystem:
//!
//! ```text
//! {root}/entries/{digest[..2]}/{digest}/compute.json
//!                                      /key.json
//!                                      /meta.json
//! {root}/staging/{digest}-{uuid}/...
//! ```
//!
//! A miss writes into a private staging directory which is published with a
//! single rename. Readers only ever see complete entries.

use crate::cache::entry::{files, CacheEntry, EntryMeta, EntrySlot, EntryState};
use crate::error::{ClientError, ClientResult};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

const ENTRIES_DIR: &str = "entries";
const STAGING_DIR: &str = "staging";

/// Result of a get-or-create lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A complete entry exists
    Hit(CacheEntry),
    /// No entry; a fresh slot was created for the caller to fill
    Miss(EntrySlot),
}

/// Storage backing the compile cache
///
/// Implementations must be safe to call concurrently. Two misses on the same
/// key must get distinct slots.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Return the complete entry for `key`, or a fresh writable slot
    async fn get_or_create(&self, key: &Fingerprint) -> ClientResult<Lookup>;

    /// Publish a filled slot; first writer wins
    async fn commit(&self, slot: EntrySlot, meta: EntryMeta) -> ClientResult<CacheEntry>;

    /// Drop an unfilled slot
    async fn abandon(&self, slot: EntrySlot) -> ClientResult<()>;

    /// Remove a complete entry so it can be rebuilt
    async fn invalidate(&self, entry: &CacheEntry) -> ClientResult<()>;
}

/// Directory-backed cache service
#[derive(Debug, Clone)]
pub struct DirCacheService {
    root: PathBuf,
}

impl DirCacheService {
    /// Open (creating if needed) a cache rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> ClientResult<Self> {
        let root = root.into();
        for dir in [root.join(ENTRIES_DIR), root.join(STAGING_DIR)] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| ClientError::cache_io(&dir, e))?;
        }
        debug!("Opened compile cache at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, digest: &str) -> PathBuf {
        let shard = &digest[..digest.len().min(2)];
        self.root.join(ENTRIES_DIR).join(shard).join(digest)
    }

    /// List complete entries and staging slots with their metadata
    pub async fn list(&self) -> ClientResult<Vec<(CacheEntry, EntryMeta)>> {
        let mut found = Vec::new();

        for shard in read_dirs(&self.root.join(ENTRIES_DIR)).await? {
            for dir in read_dirs(&shard).await? {
                let digest = file_name(&dir);
                let meta = read_meta(&dir.join(files::META), &digest, EntryState::Complete).await;
                found.push((CacheEntry::new(digest, dir, EntryState::Complete), meta));
            }
        }

        for dir in read_dirs(&self.root.join(STAGING_DIR)).await? {
            let name = file_name(&dir);
            let digest = name
                .split_once('-')
                .map(|(digest, _)| digest.to_string())
                .unwrap_or(name);
            let meta = read_meta(&dir.join(files::META), &digest, EntryState::Building).await;
            found.push((CacheEntry::new(digest, dir, EntryState::Building), meta));
        }

        found.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at));
        Ok(found)
    }

    /// Find complete entries whose digest starts with `prefix`
    pub async fn find(&self, prefix: &str) -> ClientResult<Vec<(CacheEntry, EntryMeta)>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|(entry, _)| entry.state.is_readable() && entry.digest.starts_with(prefix))
            .collect())
    }

    /// Remove every entry and staging slot, returning how many were removed
    pub async fn clear(&self) -> ClientResult<usize> {
        let entries = self.list().await?;
        for (entry, _) in &entries {
            fs::remove_dir_all(&entry.dir)
                .await
                .map_err(|e| ClientError::cache_io(&entry.dir, e))?;
        }
        info!("Removed {} cache entries", entries.len());
        Ok(entries.len())
    }
}

#[async_trait]
impl CacheService for DirCacheService {
    async fn get_or_create(&self, key: &Fingerprint) -> ClientResult<Lookup> {
        let digest = key.digest();
        let target = self.entry_dir(&digest);

        // Targets only appear by renaming a filled slot, so a published
        // directory is a hit even if its files have since gone missing.
        if fs::try_exists(&target)
            .await
            .map_err(|e| ClientError::cache_io(&target, e))?
        {
            return Ok(Lookup::Hit(CacheEntry::new(digest, target, EntryState::Complete)));
        }

        let staging = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}-{}", digest, Uuid::new_v4()));
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| ClientError::cache_io(&staging, e))?;

        let slot = EntrySlot {
            staging,
            target,
            digest,
        };
        write_meta(&slot.meta_path(), &EntryMeta::building(&slot.digest)).await?;
        debug!("Created staging slot {}", slot.staging.display());
        Ok(Lookup::Miss(slot))
    }

    async fn commit(&self, slot: EntrySlot, meta: EntryMeta) -> ClientResult<CacheEntry> {
        write_meta(&slot.meta_path(), &meta).await?;

        if let Some(parent) = slot.target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::cache_io(parent, e))?;
        }

        let published = if fs::try_exists(&slot.target).await.unwrap_or(false) {
            false
        } else {
            match fs::rename(&slot.staging, &slot.target).await {
                Ok(()) => true,
                // Renaming onto a populated directory fails; the other
                // writer got there first.
                Err(_) if fs::try_exists(&slot.target).await.unwrap_or(false) => false,
                Err(e) => return Err(ClientError::cache_io(&slot.target, e)),
            }
        };

        if published {
            debug!("Published cache entry {}", slot.target.display());
        } else {
            debug!(
                "Cache entry {} already published, discarding staging slot",
                slot.digest
            );
            remove_dir_if_exists(&slot.staging).await?;
        }

        Ok(CacheEntry::new(slot.digest, slot.target, EntryState::Complete))
    }

    async fn abandon(&self, slot: EntrySlot) -> ClientResult<()> {
        debug!("Abandoning staging slot {}", slot.staging.display());
        remove_dir_if_exists(&slot.staging).await
    }

    async fn invalidate(&self, entry: &CacheEntry) -> ClientResult<()> {
        info!("Invalidating cache entry {}", entry.digest);
        remove_dir_if_exists(&entry.dir).await
    }
}

async fn write_meta(path: &Path, meta: &EntryMeta) -> ClientResult<()> {
    let content = serde_json::to_string_pretty(meta)?;
    fs::write(path, content)
        .await
        .map_err(|e| ClientError::cache_io(path, e))
}

/// Read `meta.json`, synthesizing a record when it is missing or unreadable
async fn read_meta(path: &Path, digest: &str, state: EntryState) -> EntryMeta {
    let parsed = match fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str::<EntryMeta>(&content).ok(),
        Err(_) => None,
    };
    parsed.unwrap_or_else(|| {
        debug!("No readable metadata at {}", path.display());
        let mut meta = EntryMeta::building(digest);
        meta.state = state;
        meta
    })
}

async fn remove_dir_if_exists(dir: &Path) -> ClientResult<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ClientError::cache_io(dir, e)),
    }
}

/// Subdirectories of `dir`; empty when `dir` does not exist
async fn read_dirs(dir: &Path) -> ClientResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ClientError::cache_io(dir, e)),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ClientError::cache_io(dir, e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if is_dir {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

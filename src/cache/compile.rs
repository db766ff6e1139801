//! Compile cache orchestration
//!
//! Per instance: fingerprint, ask the cache service, then either load the
//! persisted artifact (hit) or compile and persist it (miss).

use crate::backend::{Backend, ComputationPtr};
use crate::cache::entry::{CacheEntry, EntryMeta, EntrySlot};
use crate::cache::service::{CacheService, Lookup};
use crate::error::{ClientError, ClientResult};
use crate::fingerprint::Fingerprint;
use crate::instance::CompileInstance;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

/// What to do when a cached artifact cannot be read back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptEntryPolicy {
    /// Propagate the error
    #[default]
    Fail,
    /// Invalidate the entry, recompile and store again
    Recompile,
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Compiles done with caching disabled
    pub bypassed: u64,
    /// Corrupt entries rebuilt under `CorruptEntryPolicy::Recompile`
    pub recompiled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypassed: AtomicU64,
    recompiled: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            recompiled: self.recompiled.load(Ordering::Relaxed),
        }
    }
}

/// Content-addressed compile cache in front of a backend
pub struct CompileCache {
    backend: Arc<dyn Backend>,
    service: Arc<dyn CacheService>,
    policy: CorruptEntryPolicy,
    counters: Counters,
}

impl CompileCache {
    pub fn new(backend: Arc<dyn Backend>, service: Arc<dyn CacheService>) -> Self {
        Self {
            backend,
            service,
            policy: CorruptEntryPolicy::default(),
            counters: Counters::default(),
        }
    }

    pub fn with_policy(mut self, policy: CorruptEntryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Compile a batch, preserving order
    ///
    /// With `cache_enabled` false every instance goes straight to the
    /// backend without fingerprinting or cache I/O.
    pub async fn compile_batch(
        &self,
        instances: &[CompileInstance],
        cache_enabled: bool,
    ) -> ClientResult<Vec<ComputationPtr>> {
        let mut results = Vec::with_capacity(instances.len());

        for instance in instances {
            let computation = if cache_enabled {
                self.compile_cached(instance).await?
            } else {
                Counters::bump(&self.counters.bypassed);
                self.backend.compile(instance).await?
            };
            results.push(computation);
        }

        debug!(
            "Compiled batch of {} on {}: {:?}",
            instances.len(),
            self.backend.backend_name(),
            self.stats()
        );
        Ok(results)
    }

    async fn compile_cached(&self, instance: &CompileInstance) -> ClientResult<ComputationPtr> {
        let key = Fingerprint::of(instance)?;

        let entry = match self.service.get_or_create(&key).await? {
            Lookup::Miss(slot) => return self.compile_and_store(instance, &key, slot).await,
            Lookup::Hit(entry) => entry,
        };

        match self.load(&entry, &key).await {
            Ok(computation) => {
                Counters::bump(&self.counters.hits);
                debug!("Cache hit for {}", key);
                Ok(computation)
            }
            Err(e) if self.policy == CorruptEntryPolicy::Recompile => {
                warn!("Unreadable cache entry {}, recompiling: {}", entry.digest, e);
                Counters::bump(&self.counters.recompiled);
                self.service.invalidate(&entry).await?;
                match self.service.get_or_create(&key).await? {
                    Lookup::Miss(slot) => self.compile_and_store(instance, &key, slot).await,
                    Lookup::Hit(entry) => self.load(&entry, &key).await,
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Read and deserialize a persisted artifact
    async fn load(&self, entry: &CacheEntry, key: &Fingerprint) -> ClientResult<ComputationPtr> {
        let key_path = entry.key_path();
        let stored = fs::read_to_string(&key_path)
            .await
            .map_err(|e| ClientError::cache_io(&key_path, e))?;
        let stored: Fingerprint =
            serde_json::from_str(&stored).map_err(|e| ClientError::cache_io(&key_path, e))?;
        if &stored != key {
            return Err(ClientError::cache_io(
                &key_path,
                "stored fingerprint does not match the requested one",
            ));
        }

        let compute_path = entry.compute_path();
        let text = fs::read_to_string(&compute_path)
            .await
            .map_err(|e| ClientError::cache_io(&compute_path, e))?;
        self.backend
            .deserialize(&text)
            .map_err(|e| ClientError::cache_io(&compute_path, e))
    }

    async fn compile_and_store(
        &self,
        instance: &CompileInstance,
        key: &Fingerprint,
        slot: EntrySlot,
    ) -> ClientResult<ComputationPtr> {
        Counters::bump(&self.counters.misses);
        debug!("Cache miss for {}", key);

        let computation = match self.backend.compile(instance).await {
            Ok(computation) => computation,
            Err(e) => {
                self.abandon(slot).await;
                return Err(e);
            }
        };

        if let Err(e) = self.persist(key, &slot, &computation).await {
            self.abandon(slot).await;
            return Err(e);
        }

        Ok(computation)
    }

    /// Drop a slot after a failure; the original error is what the caller sees
    async fn abandon(&self, slot: EntrySlot) {
        let staging = slot.staging.clone();
        if let Err(e) = self.service.abandon(slot).await {
            warn!("Failed to remove staging slot {}: {}", staging.display(), e);
        }
    }

    async fn persist(
        &self,
        key: &Fingerprint,
        slot: &EntrySlot,
        computation: &ComputationPtr,
    ) -> ClientResult<()> {
        let text = self.backend.serialize(computation)?;
        let compute_path = slot.compute_path();
        fs::write(&compute_path, &text)
            .await
            .map_err(|e| ClientError::cache_io(&compute_path, e))?;

        let key_path = slot.key_path();
        fs::write(&key_path, serde_json::to_string(key)?)
            .await
            .map_err(|e| ClientError::cache_io(&key_path, e))?;

        let meta = EntryMeta::building(&slot.digest)
            .complete(text.len() as u64, self.backend.backend_name());
        self.service.commit(slot.clone(), meta).await?;
        Ok(())
    }
}

//! Computation client
//!
//! The outward contract used by the lazy-tensor frontend: device queries,
//! replication policy, lifecycle and batch compilation through the compile
//! cache.

use crate::backend::{Backend, ComputationPtr};
use crate::cache::{CacheService, CacheStats, CompileCache, CorruptEntryPolicy, DirCacheService};
use crate::config::Config;
use crate::device::{Device, DeviceResolver, NativeDeviceNames, ResolvedDevices};
use crate::error::{ClientError, ClientResult};
use crate::instance::CompileInstance;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Compilation client for one process
///
/// Owned explicitly by the caller; share it with `Arc` where needed.
pub struct ComputationClient {
    devices: ResolvedDevices,
    cache: CompileCache,
    cache_enabled: bool,
    replication: RwLock<Option<Vec<Device>>>,
    exiting: AtomicBool,
}

impl ComputationClient {
    /// Start building a client from configuration
    pub fn builder(config: &Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn default_device(&self) -> Device {
        self.devices.default_device()
    }

    /// Local devices in preference order
    pub fn local_devices(&self) -> Vec<Device> {
        self.devices.devices().to_vec()
    }

    /// Every device with a native mapping
    pub fn all_devices(&self) -> Vec<Device> {
        self.devices.native_map().keys().copied().collect()
    }

    /// Backend-native name of a logical device
    pub fn native_device(&self, device: &Device) -> Option<&str> {
        self.devices.native_name(device)
    }

    /// Configure replication devices
    ///
    /// Replication is unsupported: anything other than exactly one device
    /// is rejected.
    pub fn set_replication_devices(&self, devices: Vec<Device>) -> ClientResult<()> {
        if devices.len() != 1 {
            return Err(ClientError::UnsupportedOperation(format!(
                "replication across {} devices is not supported",
                devices.len()
            )));
        }

        debug!("Replication device set to {}", devices[0]);
        *self
            .replication
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(devices);
        Ok(())
    }

    /// Most recently configured replication devices, if any
    pub fn replication_devices(&self) -> Option<Vec<Device>> {
        self.replication
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resource domain of a device; partitioning is not implemented
    pub fn resource_domain(&self, _device: &Device) -> String {
        String::new()
    }

    /// Shutdown hook; safe to call more than once
    pub fn prepare_to_exit(&self) {
        if self.exiting.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Computation client shutting down: {:?}", self.cache.stats());
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::SeqCst)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Compile a batch of instances, one result per instance in order
    pub async fn compile(&self, instances: &[CompileInstance]) -> ClientResult<Vec<ComputationPtr>> {
        if self.is_exiting() {
            return Err(ClientError::UnsupportedOperation(
                "client is shutting down".to_string(),
            ));
        }
        self.cache.compile_batch(instances, self.cache_enabled).await
    }
}

/// Factory for `ComputationClient`
pub struct ClientBuilder {
    config: Config,
    backend: Option<Arc<dyn Backend>>,
    service: Option<Arc<dyn CacheService>>,
    resolver: DeviceResolver,
}

impl ClientBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            backend: None,
            service: None,
            resolver: DeviceResolver::new(),
        }
    }

    /// Backend compiler to use (required)
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Cache service to use instead of the directory cache
    pub fn cache_service(mut self, service: Arc<dyn CacheService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Native device naming for the backend
    pub fn native_names(mut self, names: impl NativeDeviceNames + 'static) -> Self {
        self.resolver = DeviceResolver::with_names(names);
        self
    }

    /// Resolve devices, open the cache and assemble the client
    pub async fn build(self) -> ClientResult<ComputationClient> {
        let backend = self.backend.ok_or_else(|| {
            ClientError::NotImplemented("no backend wired into the computation client".to_string())
        })?;

        let devices = self
            .resolver
            .resolve_from_env(&self.config.device.default_kind)?;

        let service: Arc<dyn CacheService> = match self.service {
            Some(service) => service,
            None => Arc::new(DirCacheService::open(self.config.cache.root()).await?),
        };

        let policy = if self.config.cache.recompile_on_corrupt {
            CorruptEntryPolicy::Recompile
        } else {
            CorruptEntryPolicy::Fail
        };

        info!(
            "Computation client ready: backend {}, default device {}, cache {}",
            backend.backend_name(),
            devices.default_device(),
            if self.config.cache.enabled { "on" } else { "off" }
        );

        Ok(ComputationClient {
            devices,
            cache: CompileCache::new(backend, service).with_policy(policy),
            cache_enabled: self.config.cache.enabled,
            replication: RwLock::new(None),
            exiting: AtomicBool::new(false),
        })
    }
}

//! Device resolution
//!
//! Derives the logical device set, the default device and the backend-native
//! device names from a single configured device kind. Resolution runs once
//! when a client is built; the result is immutable afterward.

use crate::env;
use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Device kinds known to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// CUDA-capable accelerator
    #[serde(rename = "GPU")]
    Gpu,
    /// Host CPU
    #[serde(rename = "CPU")]
    Cpu,
}

impl DeviceKind {
    /// All kinds in preference order (GPU preferred)
    pub fn preference_order() -> &'static [Self] {
        &[Self::Gpu, Self::Cpu]
    }

    /// Match a configured kind string, ignoring case and whitespace
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::preference_order()
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpu => "GPU",
            Self::Cpu => "CPU",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logical device identifier, displayed as `KIND:ordinal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Device {
    pub kind: DeviceKind,
    pub ordinal: u32,
}

impl Device {
    pub fn new(kind: DeviceKind, ordinal: u32) -> Self {
        Self { kind, ordinal }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.ordinal)
    }
}

impl FromStr for Device {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientError::Configuration(format!("invalid device identifier: {s:?}"));
        let (kind, ordinal) = s.split_once(':').ok_or_else(invalid)?;
        let kind = DeviceKind::parse(kind).ok_or_else(invalid)?;
        let ordinal = ordinal.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(kind, ordinal))
    }
}

/// Translates logical devices to the backend's native device names
pub trait NativeDeviceNames: Send + Sync {
    fn native_name(&self, device: &Device) -> String;
}

/// Native naming used by the default backend: `cuda(n)` and `cpu(n)`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNativeNames;

impl NativeDeviceNames for DefaultNativeNames {
    fn native_name(&self, device: &Device) -> String {
        match device.kind {
            DeviceKind::Gpu => format!("cuda({})", device.ordinal),
            DeviceKind::Cpu => format!("cpu({})", device.ordinal),
        }
    }
}

/// Outcome of device resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevices {
    default: Device,
    /// Devices in preference order
    devices: Vec<Device>,
    native: BTreeMap<Device, String>,
}

impl ResolvedDevices {
    pub fn default_device(&self) -> Device {
        self.default
    }

    /// Local devices in preference order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Logical to native device map
    pub fn native_map(&self) -> &BTreeMap<Device, String> {
        &self.native
    }

    pub fn native_name(&self, device: &Device) -> Option<&str> {
        self.native.get(device).map(String::as_str)
    }

    pub fn contains(&self, device: &Device) -> bool {
        self.devices.contains(device)
    }
}

/// Resolves the device set from a configured default kind
pub struct DeviceResolver {
    names: Box<dyn NativeDeviceNames>,
}

impl DeviceResolver {
    /// Ordinal used for every kind; one device per kind
    const ORDINAL: u32 = 0;

    pub fn new() -> Self {
        Self::with_names(DefaultNativeNames)
    }

    /// Use a custom native-name translator
    pub fn with_names(names: impl NativeDeviceNames + 'static) -> Self {
        Self {
            names: Box::new(names),
        }
    }

    /// Resolve devices for the given default kind
    ///
    /// Kinds are visited in preference order. Kinds before the configured
    /// one are skipped; the configured kind and every kind after it are
    /// included. An unknown kind is a configuration error.
    pub fn resolve(&self, default_kind: &str) -> ClientResult<ResolvedDevices> {
        let wanted = DeviceKind::parse(default_kind);
        let mut default = None;
        let mut devices = Vec::new();
        let mut native = BTreeMap::new();

        for &kind in DeviceKind::preference_order() {
            let device = Device::new(kind, Self::ORDINAL);
            if Some(kind) == wanted {
                default = Some(device);
            }
            if default.is_none() {
                continue;
            }
            native.insert(device, self.names.native_name(&device));
            devices.push(device);
        }

        let default = default.ok_or_else(|| {
            ClientError::Configuration(format!(
                "default device kind {:?} matches none of: {}",
                default_kind,
                DeviceKind::preference_order()
                    .iter()
                    .map(DeviceKind::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        debug!(
            "Resolved default device {} with {} local device(s)",
            default,
            devices.len()
        );

        Ok(ResolvedDevices {
            default,
            devices,
            native,
        })
    }

    /// Resolve from `LTC_DEFAULT_DEVICE`
    ///
    /// Falls back to `configured` when the variable is unset, then to CPU
    /// when `configured` is blank.
    pub fn resolve_from_env(&self, configured: &str) -> ClientResult<ResolvedDevices> {
        let kind = match env::var(env::DEFAULT_DEVICE) {
            Some(kind) => kind,
            None if configured.trim().is_empty() => env::FALLBACK_DEVICE_KIND.to_string(),
            None => configured.to_string(),
        };
        self.resolve(&kind)
    }
}

impl Default for DeviceResolver {
    fn default() -> Self {
        Self::new()
    }
}

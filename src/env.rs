//! Environment variables read by the client

use std::env;

/// Default device kind ("GPU" or "CPU")
pub const DEFAULT_DEVICE: &str = "LTC_DEFAULT_DEVICE";

/// Enables or disables the persistent compile cache
pub const COMPILE_CACHE: &str = "LTC_COMPILE_CACHE";

/// Overrides the compile cache root directory
pub const CACHE_DIR: &str = "LTC_CACHE_DIR";

/// Config file path used by the CLI
pub const CONFIG: &str = "LTC_CONFIG";

/// Device kind used when nothing is configured
pub const FALLBACK_DEVICE_KIND: &str = "CPU";

pub(crate) fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Read a variable, treating empty values as unset
pub(crate) fn var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// Read a boolean flag, `None` when unset
pub(crate) fn flag(name: &str) -> Option<bool> {
    var(name).map(|value| parse_bool(&value))
}

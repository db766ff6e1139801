//! Error types for ltc-client
//!
//! All modules use `ClientResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// All errors that can occur in the compilation client
#[derive(Error, Debug)]
pub enum ClientError {
    // Configuration errors
    #[error("Device configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Contract errors
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Malformed compile instance: {0}")]
    MalformedInstance(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    // Backend errors
    #[error("Backend compilation failed: {0}")]
    Backend(String),

    // Cache errors
    #[error("Cache I/O error at {path}: {reason}")]
    CacheIo { path: PathBuf, reason: String },

    #[error("Cache entry not found: {0}")]
    CacheEntryNotFound(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a cache I/O error for a path
    pub fn cache_io(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CacheIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if error is retryable
    ///
    /// Contract violations and configuration errors never are. Cache I/O may
    /// succeed on a later attempt (disk freed, permissions fixed).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CacheIo { .. } | Self::Io { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Configuration(_) => Some("Set LTC_DEFAULT_DEVICE to one of: GPU, CPU"),
            Self::NotImplemented(_) => Some("Wire a backend with ClientBuilder::backend"),
            Self::CacheIo { .. } => Some("Run: ltc cache clear --yes"),
            Self::ConfigInvalid { .. } => Some("Run: ltc config init --force"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ClientError::UnsupportedOperation("replication".to_string());
        assert!(err.to_string().contains("Unsupported operation"));
    }

    #[test]
    fn error_hint() {
        let err = ClientError::Configuration("no kind".to_string());
        assert_eq!(err.hint(), Some("Set LTC_DEFAULT_DEVICE to one of: GPU, CPU"));
        assert_eq!(ClientError::Internal("x".to_string()).hint(), None);
    }

    #[test]
    fn error_retryable() {
        assert!(ClientError::cache_io("/tmp/x", "disk full").is_retryable());
        assert!(!ClientError::MalformedInstance("global".to_string()).is_retryable());
        assert!(!ClientError::UnsupportedOperation("replication".to_string()).is_retryable());
    }
}

//! Backend compiler abstraction
//!
//! The client never compiles anything itself; it hands compile instances to
//! a `Backend` and persists whatever the backend produces.

use crate::error::{ClientError, ClientResult};
use crate::instance::CompileInstance;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Backend-ready compiled artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executable {
    /// Backend that produced the artifact
    pub backend: String,
    /// Device the artifact was compiled for
    pub device: String,
    /// Devices the artifact runs on
    pub devices: Vec<String>,
    /// Opaque program payload
    pub program: String,
}

/// Shared, immutable handle to a compiled artifact
pub type ComputationPtr = Arc<Executable>;

/// Compiler and artifact codec for one backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Compile one instance
    async fn compile(&self, instance: &CompileInstance) -> ClientResult<ComputationPtr>;

    /// Serialize a compiled artifact for persistence
    fn serialize(&self, computation: &ComputationPtr) -> ClientResult<String> {
        Ok(serde_json::to_string(computation.as_ref())?)
    }

    /// Restore a compiled artifact from its serialized form
    fn deserialize(&self, text: &str) -> ClientResult<ComputationPtr> {
        let executable: Executable = serde_json::from_str(text).map_err(|e| {
            ClientError::Backend(format!("artifact does not deserialize: {e}"))
        })?;
        Ok(Arc::new(executable))
    }

    /// Get the human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

//! ltc-client - compilation cache and device resolution for lazy-tensor backends
//!
//! Sits between a lazy-tensor frontend and a backend compiler. Resolves the
//! default device from the environment, and memoizes compiled artifacts in
//! a persistent content-addressed cache keyed by a structural fingerprint
//! of each computation.

pub mod backend;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod device;
pub mod env;
pub mod error;
pub mod fingerprint;
pub mod instance;
pub mod ir;

pub use backend::{Backend, ComputationPtr, Executable};
pub use client::{ClientBuilder, ComputationClient};
pub use device::{Device, DeviceKind, DeviceResolver};
pub use error::{ClientError, ClientResult};
pub use fingerprint::Fingerprint;
pub use instance::{CompileInstance, Computation, LoweredComputation};

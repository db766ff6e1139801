//! CLI command implementations

pub mod cache;
pub mod config;
pub mod devices;

pub use cache::execute as cache;
pub use config::execute as config;
pub use devices::execute as devices;

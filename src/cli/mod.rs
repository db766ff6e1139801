//! Operator CLI for inspecting device resolution and the compile cache

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

//! Shared utilities

pub mod config;
pub mod fs;
pub mod hash;
pub mod process;
pub mod scoped;

pub use config::Config;
pub use process::ProcessBuilder;
pub use scoped::{ScopedCurrentDir, ScopedEnvVars};

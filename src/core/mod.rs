//! Core data structures for build-clang.
//!
//! This module contains the foundational types used throughout the crate:
//! - LLVM versions and host platform facts
//! - The run-wide build configuration and its deferred identity
//! - Stage descriptors
//! - The error taxonomy

pub mod build_conf;
pub mod error;
pub mod identity;
pub mod platform;
pub mod stage;
pub mod version;

pub use build_conf::{BuildConf, BuildConfOptions, BuildFlags};
pub use error::{ConfigError, IdentityError, InvariantError};
pub use identity::BuildIdentity;
pub use platform::{Os, Platform};
pub use stage::{PredecessorLink, Stage, StageRole};
pub use version::LlvmVersion;

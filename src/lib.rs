//! build-clang - multi-stage bootstrap builder for Clang/LLVM
//!
//! This crate provides the library behind the `build-clang` binary: the
//! stage graph, the per-stage configuration matrix, the stage executor and
//! the packaging and release steps.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

pub use builder::{BuildTools, StageExecutor, StageGraph};
pub use core::{BuildConf, BuildConfOptions, BuildFlags, LlvmVersion, Platform, Stage, StageRole};

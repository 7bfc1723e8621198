//! High-level operations.
//!
//! This module contains the steps of a build-clang run.

pub mod build_clang;
pub mod package;
pub mod plan;
pub mod release;
pub mod remote;
pub mod source;

pub use build_clang::{prepare, run, PreparedRun, RunOptions, RunSummary};
pub use package::{package, PackageOptions, PackagedRelease};
pub use plan::{build_plan, render_plan, BuildPlan};
pub use release::{publish, ReleaseOptions};
pub use remote::{build_remotely, remote_build_requested, RemoteTarget};
pub use source::{checkout_source, head_revision, write_revision_log};

//! Error taxonomy.
//!
//! Configuration errors are raised before any external work starts. Identity
//! errors come from the one-time build directory rename. Invariant errors are
//! raised when the filesystem does not have the shape a later step relies on.
//! External tool failures are plain `anyhow` errors from the process runner.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid input detected before any external work begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid LLVM version `{version}`: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("LLVM version `{version}` is not supported, major version must be at least {minimum}")]
    UnsupportedVersion { version: String, minimum: u64 },

    #[error("PGO build requires LTO enabled")]
    PgoWithoutLto,

    #[error("--min_stage value too low: {min_stage}")]
    MinStageTooLow { min_stage: usize },

    #[error(
        "--max_stage value too high: {max_stage}, must be {num_stages} or lower. \
         LTO is {lto}. PGO is {pgo}"
    )]
    MaxStageTooHigh {
        max_stage: usize,
        num_stages: usize,
        lto: &'static str,
        pgo: &'static str,
    },

    #[error("--min_stage value ({min_stage}) is greater than --max_stage value ({max_stage})")]
    InvertedStageRange { min_stage: usize, max_stage: usize },

    #[error(
        "target architecture is ambiguous: --target_arch is {from_arg:?}, \
         YB_TARGET_ARCH is {from_env:?}, host architecture is {host}"
    )]
    AmbiguousTargetArch {
        from_arg: Option<String>,
        from_env: Option<String>,
        host: String,
    },

    #[error("invalid existing build directory basename: '{basename}', {reason}")]
    InvalidExistingBuildDir { basename: String, reason: String },

    #[error(
        "build directory mismatch: specified {specified}, computed {computed}"
    )]
    BuildDirMismatch { specified: PathBuf, computed: PathBuf },

    #[error("`{tool}` not found; install it or set its path in build-clang.toml")]
    ToolNotFound { tool: &'static str },

    #[error("no bootstrap C/C++ compiler found (looked for gcc and g++)")]
    NoBootstrapCompiler,

    #[error("could not find an acceptable devtoolset under /opt/rh")]
    NoDevtoolset,

    #[error("remote build misconfigured: {0}")]
    RemoteBuild(String),
}

/// Errors from resolving the build identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("source revision already resolved to {existing}")]
    AlreadyResolved { existing: String },

    #[error("source revision `{revision}` is shorter than {required} characters")]
    RevisionTooShort { revision: String, required: usize },

    #[error("cannot rename {from} to {to}: destination already exists")]
    DestinationExists { from: PathBuf, to: PathBuf },

    #[error("cannot rename {from}: directory does not exist")]
    SourceMissing { from: PathBuf },
}

/// The filesystem does not have the shape a pipeline step relies on.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("none of these directories exist: {}", display_paths(.candidates))]
    NoRuntimeLibDir { candidates: Vec<PathBuf> },

    #[error("multiple runtime library directories exist: {}", display_paths(.found))]
    MultipleRuntimeLibDirs { found: Vec<PathBuf> },

    #[error("directory does not exist: {0}, cannot create symlinks to files in this directory")]
    MissingPerArchDir(PathBuf),

    #[error("file does not exist: {0}")]
    MissingBinary(PathBuf),

    #[error("incorrect object file architecture generated for {path} ({expected} expected): {file_type}")]
    WrongArchitecture {
        path: PathBuf,
        expected: String,
        file_type: String,
    },

    #[error("install directory name `{0}` does not carry the archive name prefix")]
    UnexpectedInstallDirName(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

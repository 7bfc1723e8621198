//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use build_clang::core::version::DEFAULT_LLVM_VERSION;

/// Build a multi-stage Clang/LLVM toolchain and publish it as a release
#[derive(Parser, Debug)]
#[command(name = "build-clang")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// LLVM version to build; major versions map to pinned releases
    #[arg(long = "llvm_version", default_value = DEFAULT_LLVM_VERSION)]
    pub llvm_version: String,

    /// Parent directory of the build and install directories
    #[arg(long = "install_parent_dir")]
    pub install_parent_dir: Option<PathBuf>,

    /// Extra component appended to the build name
    #[arg(long = "top_dir_suffix")]
    pub top_dir_suffix: Option<String>,

    /// Name the build exactly `v<version>`
    #[arg(long = "skip_auto_suffix")]
    pub skip_auto_suffix: bool,

    /// Resume in an existing build directory (implies --skip_auto_suffix)
    #[arg(long = "existing_build_dir")]
    pub existing_build_dir: Option<PathBuf>,

    /// First stage to build
    #[arg(long = "min_stage", default_value_t = 1)]
    pub min_stage: usize,

    /// Last stage to build (defaults to the last stage)
    #[arg(long = "max_stage")]
    pub max_stage: Option<usize>,

    /// Add the link-time optimized stage (default)
    #[arg(long = "lto", overrides_with = "no_lto")]
    pub lto: bool,

    /// Do not add the link-time optimized stage
    #[arg(long = "no_lto", overrides_with = "lto")]
    pub no_lto: bool,

    /// Add the profile-guided optimization stages (default: same as LTO)
    #[arg(long = "pgo", overrides_with = "no_pgo")]
    pub pgo: bool,

    /// Do not add the profile-guided optimization stages
    #[arg(long = "no_pgo", overrides_with = "pgo")]
    pub no_pgo: bool,

    /// Use compiler-rt as the runtime library (default)
    #[arg(long = "use_compiler_rt", overrides_with = "no_compiler_rt")]
    pub use_compiler_rt: bool,

    /// Do not use compiler-rt as the runtime library
    #[arg(long = "no_compiler_rt", overrides_with = "use_compiler_rt")]
    pub no_compiler_rt: bool,

    /// Build OpenMP in the final stage
    #[arg(
        long = "with_openmp",
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub with_openmp: bool,

    /// Target CPU architecture; must match the host
    #[arg(long = "target_arch")]
    pub target_arch: Option<String>,

    /// Parallelism passed to ninja
    #[arg(long = "parallelism", short = 'j')]
    pub parallelism: Option<usize>,

    /// Do not check out or build anything
    #[arg(long = "skip_build")]
    pub skip_build: bool,

    /// Package but do not publish the release
    #[arg(long = "skip_upload")]
    pub skip_upload: bool,

    /// Delete each stage's build directory first
    #[arg(long = "clean")]
    pub clean: bool,

    /// Record every compiler invocation
    #[arg(long = "use_compiler_wrapper")]
    pub use_compiler_wrapper: bool,

    /// Build on this host even if BUILD_CLANG_REMOTELY is set
    #[arg(long = "local_build")]
    pub local_build: bool,

    /// Remote build host
    #[arg(long = "remote_server", env = "BUILD_CLANG_REMOTE_SERVER")]
    pub remote_server: Option<String>,

    /// Absolute directory on the remote host to copy this project to
    #[arg(
        long = "remote_build_scripts_path",
        env = "BUILD_CLANG_REMOTE_BUILD_SCRIPTS_PATH"
    )]
    pub remote_build_scripts_path: Option<String>,

    /// Package and publish this existing install directory instead of building
    #[arg(long = "upload_earlier_build")]
    pub upload_earlier_build: Option<PathBuf>,

    /// Reuse an existing archive instead of recreating it
    #[arg(long = "reuse_tarball")]
    pub reuse_tarball: bool,

    /// GitHub organization hosting the llvm-project fork
    #[arg(long = "github_org")]
    pub github_org: Option<String>,

    /// Repository receiving the release (owner/name)
    #[arg(long = "release_repo")]
    pub release_repo: Option<String>,

    /// Print the stage plan as JSON and exit
    #[arg(long = "print_plan")]
    pub print_plan: bool,
}

impl Cli {
    pub fn lto_enabled(&self) -> bool {
        !self.no_lto
    }

    /// PGO follows LTO unless given explicitly.
    pub fn pgo_enabled(&self) -> bool {
        if self.pgo {
            true
        } else if self.no_pgo {
            false
        } else {
            self.lto_enabled()
        }
    }

    pub fn compiler_rt_enabled(&self) -> bool {
        !self.no_compiler_rt
    }
}

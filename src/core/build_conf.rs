//! Run-wide build configuration.
//!
//! One [`BuildConf`] exists per run. Stages borrow it read-only; the only
//! mutation after construction is [`BuildConf::resolve_revision`].

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::core::error::{ConfigError, IdentityError};
use crate::core::identity::{BuildIdentity, TagComponents};
use crate::core::platform::Platform;
use crate::core::version::LlvmVersion;

/// Default parent directory for build and install directories.
pub const DEFAULT_INSTALL_PARENT_DIR: &str = "/opt/yb-build/llvm";

/// Default GitHub organization hosting the llvm-project fork.
pub const DEFAULT_GITHUB_ORG: &str = "yugabyte";

/// Source checkout location relative to the build parent directory.
pub const LLVM_PROJECT_CLONE_REL_PATH: &str = "src/llvm-project";

/// Build metadata directory relative to the final install directory.
pub const BUILD_INFO_REL_PATH: &str = "etc/yb-llvm-build-info";

/// Boolean switches of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildFlags {
    /// Delete each stage's build directory before configuring
    pub clean: bool,
    /// Route compiler invocations through the recording wrapper
    pub use_compiler_wrapper: bool,
    /// Use compiler-rt as the runtime library from stage 3 on
    pub use_compiler_rt: bool,
    /// Append the LTO stage
    pub lto: bool,
    /// Append the PGO stages (requires `lto`)
    pub pgo: bool,
    /// Build OpenMP at the final ordinary stage
    pub openmp: bool,
}

impl Default for BuildFlags {
    fn default() -> Self {
        BuildFlags {
            clean: false,
            use_compiler_wrapper: false,
            use_compiler_rt: true,
            lto: true,
            pgo: false,
            openmp: true,
        }
    }
}

/// Inputs for [`BuildConf::new`].
#[derive(Debug, Clone)]
pub struct BuildConfOptions {
    pub install_parent_dir: PathBuf,
    pub version: LlvmVersion,
    pub user_suffix: Option<String>,
    pub skip_auto_suffix: bool,
    pub existing_build_dir: Option<PathBuf>,
    pub flags: BuildFlags,
    pub target_arch: String,
    pub parallelism: Option<usize>,
    pub github_org: String,
}

/// Global, mostly immutable parameters of a run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildConf {
    version: LlvmVersion,
    install_parent_dir: PathBuf,
    flags: BuildFlags,
    target_arch: String,
    parallelism: Option<usize>,
    existing_build_dir: Option<PathBuf>,
    github_org: String,
    build_start_timestamp: String,
    identity: BuildIdentity,
}

impl BuildConf {
    /// Create the configuration for a run.
    ///
    /// With an existing build directory the tag is parsed back out of that
    /// directory's name; otherwise it is composed from the run's inputs.
    pub fn new(options: BuildConfOptions, platform: &Platform) -> Result<Self, ConfigError> {
        let timestamp = unix_timestamp();
        let version_str = options.version.as_str().to_string();

        let identity = if let Some(ref existing) = options.existing_build_dir {
            BuildIdentity::from_existing_build_dir(version_str, existing)?
        } else if options.skip_auto_suffix {
            BuildIdentity::plain(version_str)
        } else {
            BuildIdentity::auto(
                version_str,
                TagComponents {
                    unix_timestamp: timestamp.clone(),
                    use_compiler_rt: options.flags.use_compiler_rt,
                    user_suffix: options.user_suffix.clone(),
                    short_os_name_and_version: platform.short_os_name_and_version.clone(),
                    arch: options.target_arch.clone(),
                },
            )
        };

        Ok(BuildConf {
            version: options.version,
            install_parent_dir: options.install_parent_dir,
            flags: options.flags,
            target_arch: options.target_arch,
            parallelism: options.parallelism,
            existing_build_dir: options.existing_build_dir,
            github_org: options.github_org,
            build_start_timestamp: timestamp,
            identity,
        })
    }

    /// The LLVM version being built.
    pub fn version(&self) -> &LlvmVersion {
        &self.version
    }

    /// LLVM major version, at least 7.
    pub fn major_version(&self) -> u64 {
        self.version.major()
    }

    /// Boolean switches.
    pub fn flags(&self) -> &BuildFlags {
        &self.flags
    }

    /// Target architecture, e.g. `x86_64`.
    pub fn target_arch(&self) -> &str {
        &self.target_arch
    }

    /// Parallelism passed through to ninja.
    pub fn parallelism(&self) -> Option<usize> {
        self.parallelism
    }

    /// GitHub organization for the llvm-project clone URL.
    pub fn github_org(&self) -> &str {
        &self.github_org
    }

    /// Directory given with `--existing_build_dir`.
    pub fn existing_build_dir(&self) -> Option<&Path> {
        self.existing_build_dir.as_deref()
    }

    /// Seconds since the epoch when this configuration was created.
    pub fn build_start_timestamp(&self) -> &str {
        &self.build_start_timestamp
    }

    /// The naming identity.
    pub fn identity(&self) -> &BuildIdentity {
        &self.identity
    }

    /// Current tag.
    pub fn tag(&self) -> String {
        self.identity.tag()
    }

    /// Parent of the build and install directories.
    pub fn install_parent_dir(&self) -> &Path {
        &self.install_parent_dir
    }

    /// `<install_parent>/<name>-build`, holding stages and the source checkout.
    pub fn build_parent_dir(&self) -> PathBuf {
        self.install_parent_dir
            .join(self.identity.build_dir_basename())
    }

    /// `<install_parent>/<name>`, the installed toolchain.
    pub fn final_install_dir(&self) -> PathBuf {
        self.install_parent_dir
            .join(self.identity.install_dir_basename())
    }

    /// Where build metadata is snapshotted for downstream inspection.
    pub fn build_info_dir(&self) -> PathBuf {
        self.final_install_dir().join(BUILD_INFO_REL_PATH)
    }

    /// Where llvm-project is checked out.
    pub fn llvm_project_clone_dir(&self) -> PathBuf {
        self.build_parent_dir().join(LLVM_PROJECT_CLONE_REL_PATH)
    }

    /// Fail if `--existing_build_dir` does not match the computed build directory.
    pub fn check_existing_build_dir(&self) -> Result<(), ConfigError> {
        if let Some(ref specified) = self.existing_build_dir {
            let computed = self.build_parent_dir();
            if *specified != computed {
                return Err(ConfigError::BuildDirMismatch {
                    specified: specified.clone(),
                    computed,
                });
            }
        }
        Ok(())
    }

    /// Bind the source revision and rename the placeholder-named build
    /// directory to its final name.
    ///
    /// The identity only changes if the rename succeeds. An existing
    /// destination is an error; nothing is merged or overwritten.
    pub fn resolve_revision(&mut self, revision: &str) -> anyhow::Result<()> {
        let from = self.build_parent_dir();
        let mut resolved = self.identity.clone();
        resolved.resolve(revision)?;
        let to = self.install_parent_dir.join(resolved.build_dir_basename());

        tracing::info!("Source revision: {}", revision);
        if from != to {
            if to.exists() {
                return Err(IdentityError::DestinationExists { from, to }.into());
            }
            if !from.exists() {
                return Err(IdentityError::SourceMissing { from }.into());
            }
            tracing::info!("Renaming {} -> {}", from.display(), to.display());
            std::fs::rename(&from, &to).map_err(|e| {
                anyhow::anyhow!("failed to rename {} to {}: {}", from.display(), to.display(), e)
            })?;
        }

        self.identity = resolved;
        Ok(())
    }
}

/// Pick the target architecture, requiring every source that names one to agree.
pub fn resolve_target_arch(
    from_arg: Option<&str>,
    from_env: Option<&str>,
    host: &str,
) -> Result<String, ConfigError> {
    let all_agree = [from_arg, from_env]
        .into_iter()
        .flatten()
        .all(|arch| arch == host);
    if !all_agree {
        return Err(ConfigError::AmbiguousTargetArch {
            from_arg: from_arg.map(str::to_string),
            from_env: from_env.map(str::to_string),
            host: host.to_string(),
        });
    }
    Ok(host.to_string())
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

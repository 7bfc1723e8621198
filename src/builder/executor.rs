//! Stage executor.
//!
//! Builds one stage: prepares its directories, configures it with the
//! options derived by the matrix, runs the ninja steps in order and then
//! carries out the stage's install plan. Any failing external command aborts
//! the stage. Nothing is cleaned up afterwards so the run can be resumed
//! with `--existing_build_dir`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::builder::arch::{arch_switch_prefix, validate_build_output_arch};
use crate::builder::cmake::{is_cmake_project, CMakeBuilder};
use crate::builder::compiler_wrapper::{wrapper_compilers, wrapper_env};
use crate::builder::compilers::resolve_compilers;
use crate::builder::matrix::{derive, InstallPlan, NinjaStep, StageConfig};
use crate::builder::tools::BuildTools;
use crate::core::build_conf::BuildConf;
use crate::core::error::InvariantError;
use crate::core::platform::Platform;
use crate::core::stage::Stage;
use crate::util::fs::{copy_executable, copy_file, ensure_dir, remove_dir_all_if_exists};
use crate::util::process::ProcessBuilder;
use crate::util::scoped::{ScopedCurrentDir, ScopedEnvVars};

/// Builds stages of one run.
pub struct StageExecutor<'a> {
    conf: &'a BuildConf,
    platform: &'a Platform,
    tools: &'a BuildTools,
}

impl<'a> StageExecutor<'a> {
    pub fn new(conf: &'a BuildConf, platform: &'a Platform, tools: &'a BuildTools) -> Self {
        StageExecutor {
            conf,
            platform,
            tools,
        }
    }

    /// Build `stage` and return how long it took.
    pub fn build(&self, stage: &Stage) -> Result<Duration> {
        let start = Instant::now();
        tracing::info!("{} Building", stage);

        let config = derive(stage, self.conf, self.platform);
        let build_dir = stage.build_dir();

        if self.conf.flags().clean && build_dir.exists() {
            tracing::info!("{} Deleting directory: {}", stage, build_dir.display());
            remove_dir_all_if_exists(&build_dir)?;
        }

        let compilers = resolve_compilers(&config.compiler, self.platform)?;
        let invocations_dir = stage.compiler_invocations_dir(self.conf.build_start_timestamp());
        ensure_dir(&invocations_dir)?;
        ensure_dir(&build_dir)?;
        if let InstallPlan::MergeProfiles { ref raw_dir, .. } = config.install {
            ensure_dir(raw_dir)?;
        }

        let mut env = config.env.clone();
        let mut options = config.options.clone();
        if self.conf.flags().use_compiler_wrapper {
            env.extend(wrapper_env(&compilers, &invocations_dir));
            let wrappers = wrapper_compilers()?;
            options
                .set("CMAKE_C_COMPILER", wrappers.c.display().to_string())
                .set("CMAKE_CXX_COMPILER", wrappers.cxx.display().to_string());
        } else {
            options
                .set("CMAKE_C_COMPILER", compilers.c.display().to_string())
                .set("CMAKE_CXX_COMPILER", compilers.cxx.display().to_string());
        }

        let source_dir = self.conf.llvm_project_clone_dir().join("llvm");
        if !is_cmake_project(&source_dir) {
            bail!(
                "{} is not a CMake project, has the LLVM source been checked out?",
                source_dir.display()
            );
        }

        // Both guards are restored on every exit path, including errors.
        let _cwd = ScopedCurrentDir::enter(&build_dir)?;
        let _env = ScopedEnvVars::apply(env);

        let cmake = CMakeBuilder::new(self.tools, source_dir, build_dir.clone())
            .cmd_prefix(arch_switch_prefix(self.platform, self.conf.target_arch()))
            .parallelism(self.conf.parallelism());

        tracing::info!("{} Configuring with CMake", stage);
        cmake.configure(&options)?;

        for step in &config.steps {
            match step {
                NinjaStep::Targets(targets) => {
                    tracing::info!("{} Building target(s) {}", stage, targets.join(" "));
                    cmake.ninja(targets)?;
                }
                NinjaStep::All => {
                    tracing::info!("{} Building all other targets", stage);
                    cmake.ninja(&[])?;
                }
            }
        }

        self.finish(stage, &config, &cmake)?;

        let elapsed = start.elapsed();
        tracing::info!("{} Built in {:.1} seconds", stage, elapsed.as_secs_f64());
        Ok(elapsed)
    }

    fn finish(&self, stage: &Stage, config: &StageConfig, cmake: &CMakeBuilder<'_>) -> Result<()> {
        let build_dir = cmake.build_dir();
        match &config.install {
            InstallPlan::Install {
                copy_binaries,
                metadata_files,
            } => {
                tracing::info!("{} Installing", stage);
                cmake.ninja(&["install".to_string()])?;
                for name in copy_binaries {
                    install_binary(stage, build_dir, name, stage.install_prefix())?;
                }
                if !metadata_files.is_empty() {
                    let info_dir = self.conf.build_info_dir();
                    for file_name in metadata_files {
                        let src = build_dir.join(file_name);
                        let dst = info_dir.join(file_name);
                        tracing::info!("{} Copying file {} to {}", stage, src.display(), dst.display());
                        copy_file(&src, &dst)?;
                    }
                }
                self.validate_arch(stage.install_prefix())
            }
            InstallPlan::ReplaceBinaries { binaries } => {
                tracing::info!("{} Installing binaries: {}", stage, binaries.join(", "));
                for name in binaries {
                    install_binary(stage, build_dir, name, stage.final_install_dir())?;
                }
                // Runtime libraries in the final install still come from the
                // final ordinary stage.
                tracing::debug!(
                    "{} Keeping the other files in {}",
                    stage,
                    stage.final_install_dir().display()
                );
                self.validate_arch(stage.final_install_dir())
            }
            InstallPlan::InPlace => {
                tracing::info!("{} Leaving binaries in {}", stage, build_dir.display());
                Ok(())
            }
            InstallPlan::MergeProfiles { raw_dir, output } => {
                let raw_profiles = collect_raw_profiles(raw_dir)?;
                tracing::info!(
                    "{} Merging {} raw profile(s) into {}",
                    stage,
                    raw_profiles.len(),
                    output.display()
                );
                let profdata = stage.final_install_dir().join("bin").join("llvm-profdata");
                ProcessBuilder::with_prefix(
                    &arch_switch_prefix(self.platform, self.conf.target_arch()),
                    profdata,
                )
                .arg("merge")
                .arg(format!("-output={}", output.display()))
                .args(&raw_profiles)
                .run()
                .context("failed to merge raw profiles")
            }
        }
    }

    fn validate_arch(&self, dir: &Path) -> Result<()> {
        validate_build_output_arch(self.platform, self.conf.target_arch(), dir)
    }
}

/// Copy `bin/<name>` from the build tree into `<dest_prefix>/bin`.
///
/// `clang` is a symlink to `clang-<major>` in the build tree; the link
/// target is copied under its own name so the installed link keeps working.
pub fn install_binary(stage: &Stage, build_dir: &Path, name: &str, dest_prefix: &Path) -> Result<PathBuf> {
    let src = build_dir.join("bin").join(name);
    let meta = std::fs::symlink_metadata(&src)
        .map_err(|_| InvariantError::MissingBinary(src.clone()))?;

    let binary_name = if meta.file_type().is_symlink() {
        let target = std::fs::read_link(&src)
            .with_context(|| format!("failed to read link {}", src.display()))?;
        let target_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| InvariantError::MissingBinary(target.clone()))?;
        tracing::info!(
            "{} {} is a link to {}, using binary name {} instead",
            stage,
            name,
            target.display(),
            target_name
        );
        target_name
    } else {
        name.to_string()
    };

    let src = build_dir.join("bin").join(&binary_name);
    let dst = dest_prefix.join("bin").join(&binary_name);
    tracing::info!("{} Copying file {} to {}", stage, src.display(), dst.display());
    copy_executable(&src, &dst)?;
    Ok(dst)
}

/// Raw profiles written by the training build, sorted.
pub fn collect_raw_profiles(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = raw_dir.join("*.profraw");
    let pattern = pattern.to_string_lossy();
    let mut profiles: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("invalid glob pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .collect();
    if profiles.is_empty() {
        bail!("no raw profiles found in {}", raw_dir.display());
    }
    profiles.sort();
    Ok(profiles)
}

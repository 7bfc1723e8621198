//! Command implementations

pub mod build;
pub mod plan;

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::Cli;
use build_clang::core::build_conf::{
    resolve_target_arch, BuildConfOptions, BuildFlags, DEFAULT_GITHUB_ORG,
    DEFAULT_INSTALL_PARENT_DIR,
};
use build_clang::core::platform::Platform;
use build_clang::core::version::{map_version, LlvmVersion};
use build_clang::ops::RunOptions;
use build_clang::util::config::{global_config_path, load_config, project_config_path, Config};

/// Environment variable that may also name the target architecture.
pub const TARGET_ARCH_ENV: &str = "YB_TARGET_ARCH";

/// Load the global and project configuration files.
pub fn load_configuration() -> Result<Config> {
    let cwd = std::env::current_dir()?;
    Ok(load_config(
        global_config_path().as_deref(),
        &project_config_path(&cwd),
    ))
}

/// Combine the command line, the environment and the config file.
///
/// Command-line flags win over environment variables, which win over the
/// config file.
pub fn run_options(cli: &Cli, config: &Config, platform: &Platform) -> Result<RunOptions> {
    let version: LlvmVersion = map_version(&cli.llvm_version).parse()?;

    let env_arch = std::env::var(TARGET_ARCH_ENV).ok().filter(|s| !s.is_empty());
    let target_arch = resolve_target_arch(cli.target_arch.as_deref(), env_arch.as_deref(), &platform.arch)?;

    let existing_build_dir = cli
        .existing_build_dir
        .as_ref()
        .map(std::path::absolute)
        .transpose()?;

    let install_parent_dir = cli
        .install_parent_dir
        .clone()
        .or_else(|| config.build.install_parent_dir.clone())
        .or_else(|| {
            existing_build_dir
                .as_ref()
                .and_then(|dir| dir.parent().map(PathBuf::from))
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_PARENT_DIR));

    let flags = BuildFlags {
        clean: cli.clean,
        use_compiler_wrapper: cli.use_compiler_wrapper,
        use_compiler_rt: cli.compiler_rt_enabled(),
        lto: cli.lto_enabled(),
        pgo: cli.pgo_enabled(),
        openmp: cli.with_openmp,
    };

    Ok(RunOptions {
        conf: BuildConfOptions {
            install_parent_dir,
            version,
            user_suffix: cli.top_dir_suffix.clone(),
            skip_auto_suffix: cli.skip_auto_suffix || existing_build_dir.is_some(),
            existing_build_dir,
            flags,
            target_arch,
            parallelism: cli.parallelism.or(config.build.parallelism),
            github_org: cli
                .github_org
                .clone()
                .or_else(|| config.build.github_org.clone())
                .unwrap_or_else(|| DEFAULT_GITHUB_ORG.to_string()),
        },
        min_stage: cli.min_stage,
        max_stage: cli.max_stage,
        skip_build: cli.skip_build,
        skip_upload: cli.skip_upload,
        upload_earlier_build: cli.upload_earlier_build.clone(),
        reuse_tarball: cli.reuse_tarball,
        release_repo: cli.release_repo.clone().or_else(|| config.release.repo.clone()),
    })
}

//! Compiler selection for a stage.
//!
//! Stage 1 is built with a system GCC. Some distributions ship newer GCC
//! releases outside the default `PATH`, so those locations are searched
//! first, newest version first. On CentOS 7 the devtoolset's environment is
//! also activated so that its binutils and libraries are used throughout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::builder::matrix::CompilerSource;
use crate::core::error::ConfigError;
use crate::core::platform::Platform;
use crate::util::process::{find_executable, shell_quote, ProcessBuilder};
use crate::util::scoped::ScopedEnvVars;

/// GCC major versions searched, newest first.
pub const GCC_VERSIONS: [u32; 6] = [14, 13, 12, 11, 10, 9];

/// Variables taken over from a devtoolset's `enable` script.
pub const DEVTOOLSET_ENV_VARS: [&str; 8] = [
    "INFOPATH",
    "LD_LIBRARY_PATH",
    "MANPATH",
    "PATH",
    "PCP_DIR",
    "PERL5LIB",
    "PKG_CONFIG_PATH",
    "PYTHONPATH",
];

/// A C compiler and the matching C++ compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerPair {
    pub c: PathBuf,
    pub cxx: PathBuf,
}

impl CompilerPair {
    pub fn new(c: impl Into<PathBuf>, cxx: impl Into<PathBuf>) -> Self {
        CompilerPair {
            c: c.into(),
            cxx: cxx.into(),
        }
    }
}

/// Resolve the compilers a stage builds with.
pub fn resolve_compilers(
    source: &CompilerSource,
    platform: &Platform,
) -> Result<CompilerPair, ConfigError> {
    match source.built_compilers() {
        Some((c, cxx)) => Ok(CompilerPair { c, cxx }),
        None => find_bootstrap_compilers(platform),
    }
}

/// Find the system compiler used for the bootstrap stage.
pub fn find_bootstrap_compilers(platform: &Platform) -> Result<CompilerPair, ConfigError> {
    if let Some(pair) = find_versioned_gcc(Path::new("/"), platform) {
        tracing::info!(
            "Using bootstrap compilers {} and {}",
            pair.c.display(),
            pair.cxx.display()
        );
        return Ok(pair);
    }
    match (find_executable("gcc"), find_executable("g++")) {
        (Some(c), Some(cxx)) => Ok(CompilerPair { c, cxx }),
        _ => Err(ConfigError::NoBootstrapCompiler),
    }
}

/// Activate the newest devtoolset on CentOS 7 until the guard is dropped.
///
/// Returns `None` on every other platform.
pub fn activate_devtoolset(platform: &Platform) -> Result<Option<ScopedEnvVars>> {
    let env = devtoolset_env(Path::new("/"), platform)?;
    if env.is_empty() {
        return Ok(None);
    }
    for (key, value) in &env {
        tracing::info!("Setting {} to: {}", key, value);
    }
    Ok(Some(ScopedEnvVars::apply(env)))
}

/// Environment of the newest devtoolset under `root`, limited to
/// [`DEVTOOLSET_ENV_VARS`]. Empty unless the platform is CentOS 7.
pub fn devtoolset_env(root: &Path, platform: &Platform) -> Result<BTreeMap<String, String>> {
    if !platform.is_linux() || platform.short_os_name_and_version != "centos7" {
        return Ok(BTreeMap::new());
    }
    let script = GCC_VERSIONS
        .iter()
        .map(|v| root.join(format!("opt/rh/devtoolset-{}/enable", v)))
        .find(|path| path.exists())
        .ok_or(ConfigError::NoDevtoolset)?;

    let output = ProcessBuilder::new("bash")
        .arg("-c")
        .arg(format!(". {} && env", shell_quote(&script.display().to_string())))
        .exec_stdout()
        .with_context(|| format!("failed to source {}", script.display()))?;
    Ok(filter_devtoolset_env(&output))
}

fn filter_devtoolset_env(env_output: &str) -> BTreeMap<String, String> {
    env_output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .filter(|(key, _)| DEVTOOLSET_ENV_VARS.contains(key))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Search distribution-specific GCC locations under `root`.
pub fn find_versioned_gcc(root: &Path, platform: &Platform) -> Option<CompilerPair> {
    if !platform.is_linux() {
        return None;
    }
    versioned_gcc_candidates(root, &platform.short_os_name_and_version)
        .into_iter()
        .find(|pair| pair.c.exists() && pair.cxx.exists())
}

fn versioned_gcc_candidates(root: &Path, os: &str) -> Vec<CompilerPair> {
    match os {
        "centos7" => GCC_VERSIONS
            .iter()
            .map(|v| {
                let bin = root
                    .join(format!("opt/rh/devtoolset-{}", v))
                    .join("root/usr/bin");
                CompilerPair::new(bin.join("gcc"), bin.join("g++"))
            })
            .collect(),
        "amzn2" => GCC_VERSIONS
            .iter()
            .map(|v| {
                let bin = root.join("usr/bin");
                CompilerPair::new(bin.join(format!("gcc{}-gcc", v)), bin.join(format!("gcc{}-g++", v)))
            })
            .collect(),
        _ => Vec::new(),
    }
}

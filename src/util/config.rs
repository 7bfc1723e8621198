//! Configuration file support for build-clang.
//!
//! Two configuration file locations are consulted:
//! - Global: `<config dir>/build-clang/build-clang.toml` - user-wide defaults
//! - Project: `./build-clang.toml` - checkout-specific overrides
//!
//! Project config takes precedence over global config. Command-line flags and
//! environment variables take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the configuration file in both locations.
pub const CONFIG_FILE_NAME: &str = "build-clang.toml";

/// build-clang configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildSection,

    /// Remote build host settings
    pub remote: RemoteSection,

    /// Release publishing settings
    pub release: ReleaseSection,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Parent directory of build and install directories
    pub install_parent_dir: Option<PathBuf>,

    /// GitHub organization hosting the llvm-project fork
    pub github_org: Option<String>,

    /// Parallelism passed to ninja (`-j`)
    pub parallelism: Option<usize>,

    /// Explicit path to the cmake executable
    pub cmake: Option<PathBuf>,

    /// Explicit path to the ninja executable
    pub ninja: Option<PathBuf>,
}

/// Remote build configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Host to build on
    pub server: Option<String>,

    /// Absolute directory on the host holding a copy of this project
    pub build_scripts_path: Option<String>,
}

/// Release configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseSection {
    /// `owner/name` of the repository receiving releases
    pub repo: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        let Config {
            build,
            remote,
            release,
        } = other;

        if build.install_parent_dir.is_some() {
            self.build.install_parent_dir = build.install_parent_dir;
        }
        if build.github_org.is_some() {
            self.build.github_org = build.github_org;
        }
        if build.parallelism.is_some() {
            self.build.parallelism = build.parallelism;
        }
        if build.cmake.is_some() {
            self.build.cmake = build.cmake;
        }
        if build.ninja.is_some() {
            self.build.ninja = build.ninja;
        }

        if remote.server.is_some() {
            self.remote.server = remote.server;
        }
        if remote.build_scripts_path.is_some() {
            self.remote.build_scripts_path = remote.build_scripts_path;
        }

        if release.repo.is_some() {
            self.release.repo = release.repo;
        }
    }
}

/// Get the global config path, if a home directory can be determined.
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "build-clang")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Get the project config path relative to a directory.
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (`./build-clang.toml`)
/// 2. Global config
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

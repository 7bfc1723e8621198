//! External build tools.
//!
//! Discovered once per run and passed to whoever needs them.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::error::ConfigError;
use crate::util::config::Config;
use crate::util::process::find_executable;

/// Paths of the external tools the pipeline drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTools {
    cmake: PathBuf,
    ninja: PathBuf,
    git: PathBuf,
}

impl BuildTools {
    /// Use explicit tool paths.
    pub fn new(cmake: impl Into<PathBuf>, ninja: impl Into<PathBuf>, git: impl Into<PathBuf>) -> Self {
        BuildTools {
            cmake: cmake.into(),
            ninja: ninja.into(),
            git: git.into(),
        }
    }

    /// Find the tools, preferring paths set in the configuration file.
    pub fn discover(config: &Config) -> Result<Self, ConfigError> {
        let cmake = locate("cmake", config.build.cmake.as_deref())?;
        let ninja = locate("ninja", config.build.ninja.as_deref())?;
        let git = locate("git", None)?;
        tracing::debug!(
            "Using cmake {}, ninja {}, git {}",
            cmake.display(),
            ninja.display(),
            git.display()
        );
        Ok(BuildTools { cmake, ninja, git })
    }

    pub fn cmake(&self) -> &Path {
        &self.cmake
    }

    pub fn ninja(&self) -> &Path {
        &self.ninja
    }

    pub fn git(&self) -> &Path {
        &self.git
    }
}

fn locate(tool: &'static str, configured: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match configured {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => {
            tracing::warn!(
                "Configured {} path {} does not exist, searching PATH",
                tool,
                path.display()
            );
            find_executable(tool).ok_or(ConfigError::ToolNotFound { tool })
        }
        None => find_executable(tool).ok_or(ConfigError::ToolNotFound { tool }),
    }
}

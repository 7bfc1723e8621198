//! Forwarding a whole invocation to a remote build host.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::error::ConfigError;
use crate::util::process::{shell_quote, ProcessBuilder};

/// Set to `1` to build on the configured remote host.
pub const BUILD_REMOTELY_ENV: &str = "BUILD_CLANG_REMOTELY";

/// Flag appended to the forwarded arguments so the host builds locally.
pub const LOCAL_BUILD_FLAG: &str = "--local_build";

/// A validated remote build target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub server: String,
    pub build_scripts_path: String,
}

impl RemoteTarget {
    /// Both settings are required and the path must be absolute.
    pub fn new(
        server: Option<String>,
        build_scripts_path: Option<String>,
    ) -> Result<Self, ConfigError> {
        let server = server
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::RemoteBuild("no remote server specified".to_string()))?;
        let build_scripts_path = build_scripts_path.ok_or_else(|| {
            ConfigError::RemoteBuild("no remote build scripts path specified".to_string())
        })?;
        if !build_scripts_path.starts_with('/') {
            return Err(ConfigError::RemoteBuild(format!(
                "remote build scripts path must be absolute: {}",
                build_scripts_path
            )));
        }
        Ok(RemoteTarget {
            server,
            build_scripts_path,
        })
    }

    /// `ssh`, `rsync` and `ssh` again, in order.
    pub fn commands(&self, local_dir: &Path, args: &[String]) -> Vec<ProcessBuilder> {
        let quoted_path = shell_quote(&self.build_scripts_path);
        let mkdir = ProcessBuilder::new("ssh")
            .arg(&self.server)
            .arg(format!("mkdir -p {}", quoted_path));

        let rsync = ProcessBuilder::new("rsync")
            .args(["-az", "--exclude", "target"])
            .arg(format!("{}/", local_dir.display()))
            .arg(format!("{}:{}/", self.server, self.build_scripts_path));

        let mut remote_cmd = format!(
            "cd {} && cargo run --release --bin build-clang --",
            quoted_path
        );
        for arg in args.iter().map(String::as_str).chain([LOCAL_BUILD_FLAG]) {
            remote_cmd.push(' ');
            remote_cmd.push_str(&shell_quote(arg));
        }
        let build = ProcessBuilder::new("ssh").arg(&self.server).arg(remote_cmd);

        vec![mkdir, rsync, build]
    }
}

/// Whether this invocation should be forwarded.
pub fn remote_build_requested(local_build: bool) -> bool {
    !local_build && std::env::var(BUILD_REMOTELY_ENV).map(|v| v == "1").unwrap_or(false)
}

/// Copy `local_dir` to the host and run the build there with `args`.
pub fn build_remotely(target: &RemoteTarget, local_dir: &Path, args: &[String]) -> Result<()> {
    tracing::info!(
        "Building on {} in {}",
        target.server,
        target.build_scripts_path
    );
    for cmd in target.commands(local_dir, args) {
        cmd.run()
            .with_context(|| format!("remote build on {} failed", target.server))?;
    }
    Ok(())
}

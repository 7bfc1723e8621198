//! Publishing a packaged build as a GitHub release.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::ops::package::PackagedRelease;
use crate::util::process::ProcessBuilder;

/// File holding a GitHub token, relative to the home directory.
pub const GITHUB_TOKEN_FILE: &str = ".github-token";

/// Options for [`publish`].
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    /// `owner/name` of the receiving repository; `gh` infers it when unset
    pub repo: Option<String>,
    /// Recorded in the release title
    pub lto: bool,
    /// Directory `gh` runs in
    pub cwd: Option<PathBuf>,
}

/// `Release <tag> (LTO enabled|disabled)`
pub fn release_title(tag: &str, lto: bool) -> String {
    format!(
        "Release {} (LTO {})",
        tag,
        if lto { "enabled" } else { "disabled" }
    )
}

/// The `gh release create` command for `release`.
pub fn release_command(release: &PackagedRelease, opts: &ReleaseOptions) -> ProcessBuilder {
    let mut cmd = ProcessBuilder::new("gh")
        .args(["release", "create"])
        .arg(&release.tag)
        .arg("--title")
        .arg(release_title(&release.tag, opts.lto))
        .arg("--notes")
        .arg("");
    if let Some(ref repo) = opts.repo {
        cmd = cmd.arg("--repo").arg(repo);
    }
    if let Some(ref cwd) = opts.cwd {
        cmd = cmd.cwd(cwd);
    }
    cmd.arg(&release.archive).arg(&release.checksum)
}

/// `GITHUB_TOKEN` from the environment, else from `~/.github-token`.
pub fn github_token(home: Option<&Path>) -> Result<Option<String>> {
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        if !token.is_empty() {
            return Ok(Some(token));
        }
    }
    let Some(home) = home else {
        return Ok(None);
    };
    let path = home.join(GITHUB_TOKEN_FILE);
    if !path.exists() {
        return Ok(None);
    }
    tracing::info!("Reading GitHub token from {}", path.display());
    let token = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(token.trim().to_string()))
}

/// Create the release and attach the archive and its checksum.
///
/// The token is passed to the upload process only.
pub fn publish(release: &PackagedRelease, opts: &ReleaseOptions) -> Result<()> {
    let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    let mut cmd = release_command(release, opts);
    if let Some(token) = github_token(home.as_deref())? {
        cmd = cmd.env("GITHUB_TOKEN", token);
    }
    tracing::info!("Publishing release {}", release.tag);
    cmd.run()
        .with_context(|| format!("failed to publish release {}", release.tag))
}

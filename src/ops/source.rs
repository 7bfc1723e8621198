//! llvm-project source checkout.
//!
//! The checkout is a shallow clone of the release tag. Earlier builds under
//! the install parent directory are searched first; a checkout whose `HEAD`
//! carries the wanted tag is cloned locally instead of fetching from GitHub.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::Repository;

use crate::builder::tools::BuildTools;
use crate::core::build_conf::{BuildConf, LLVM_PROJECT_CLONE_REL_PATH};
use crate::util::fs::{ensure_dir, write_string};
use crate::util::process::ProcessBuilder;

/// File name of the revision log in the build info directory.
pub const REVISION_LOG_FILE_NAME: &str = "revision_log.txt";

/// `https://github.com/<org>/llvm-project.git`
pub fn llvm_repo_url(github_org: &str) -> String {
    format!("https://github.com/{}/llvm-project.git", github_org)
}

/// Clone the release tag into the build directory unless it is already there.
///
/// Returns the checkout directory.
pub fn checkout_source(conf: &BuildConf, tools: &BuildTools) -> Result<PathBuf> {
    let dest = conf.llvm_project_clone_dir();
    if dest.exists() {
        tracing::info!("LLVM source already present in {}", dest.display());
        return Ok(dest);
    }

    let tag = conf.version().git_tag();
    let origin = match find_existing_checkout(conf.install_parent_dir(), &tag) {
        Some(dir) => {
            tracing::info!("Found an existing checkout of {} in {}, cloning from it", tag, dir.display());
            format!("file://{}", dir.display())
        }
        None => {
            let url = llvm_repo_url(conf.github_org());
            tracing::info!("Did not find an existing checkout of tag {}, will clone {}", tag, url);
            url
        }
    };

    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    ProcessBuilder::new(tools.git())
        .arg("clone")
        .arg(&origin)
        .args(["--branch", tag.as_str(), "--depth", "1"])
        .arg(&dest)
        .run()
        .with_context(|| format!("failed to clone {} at {}", origin, tag))?;
    Ok(dest)
}

/// Find a checkout under `install_parent` whose `HEAD` is tagged `tag`.
pub fn find_existing_checkout(install_parent: &Path, tag: &str) -> Option<PathBuf> {
    let pattern = install_parent.join("*").join(LLVM_PROJECT_CLONE_REL_PATH);
    let entries = glob::glob(&pattern.to_string_lossy()).ok()?;
    let mut candidates: Vec<PathBuf> = entries.filter_map(|e| e.ok()).collect();
    candidates.sort();

    candidates.into_iter().find(|dir| match head_has_tag(dir, tag) {
        Ok(found) => found,
        Err(e) => {
            tracing::debug!("Ignoring {}: {:#}", dir.display(), e);
            false
        }
    })
}

fn head_has_tag(repo_dir: &Path, tag: &str) -> Result<bool> {
    let repo = Repository::open(repo_dir)?;
    let head = repo.head()?.peel_to_commit()?.id();
    let tagged = match repo.find_reference(&format!("refs/tags/{}", tag)) {
        Ok(reference) => reference.peel_to_commit()?.id(),
        Err(_) => return Ok(false),
    };
    Ok(head == tagged)
}

/// Full SHA1 of `HEAD` in `repo_dir`.
pub fn head_revision(repo_dir: &Path) -> Result<String> {
    let repo = Repository::open(repo_dir)
        .with_context(|| format!("failed to open git repository {}", repo_dir.display()))?;
    let commit = repo
        .revparse_single("HEAD")
        .and_then(|obj| obj.peel_to_commit())
        .with_context(|| format!("failed to resolve HEAD in {}", repo_dir.display()))?;
    Ok(commit.id().to_string())
}

/// `git log -1`-style description of `HEAD`.
pub fn revision_log(repo_dir: &Path) -> Result<String> {
    let repo = Repository::open(repo_dir)
        .with_context(|| format!("failed to open git repository {}", repo_dir.display()))?;
    let commit = repo.head()?.peel_to_commit()?;
    let author = commit.author();
    let time = commit.time();
    let offset = time.offset_minutes();
    let sign = if offset < 0 { '-' } else { '+' };

    let mut log = format!(
        "commit {}\nAuthor: {} <{}>\nDate:   {} {}{:02}{:02}\n\n",
        commit.id(),
        author.name().unwrap_or_default(),
        author.email().unwrap_or_default(),
        time.seconds(),
        sign,
        offset.abs() / 60,
        offset.abs() % 60,
    );
    for line in commit.message().unwrap_or_default().lines() {
        log.push_str("    ");
        log.push_str(line);
        log.push('\n');
    }
    Ok(log)
}

/// Write the revision log of the checkout into the build info directory.
pub fn write_revision_log(repo_dir: &Path, build_info_dir: &Path) -> Result<PathBuf> {
    let path = build_info_dir.join(REVISION_LOG_FILE_NAME);
    write_string(&path, &revision_log(repo_dir)?)?;
    tracing::info!("Saved revision log to {}", path.display());
    Ok(path)
}

//! Packaging of the final install directory.
//!
//! Produces `<install_parent>/<name>.tar.gz` and a `sha256sum`-style sidecar.
//! On Linux, compatibility symlinks for runtime libraries are added first.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::core::error::InvariantError;
use crate::core::identity::parse_tag_from_install_dir_name;
use crate::core::platform::Platform;
use crate::core::version::LlvmVersion;
use crate::util::fs::{ensure_dir, file_name_string, relative_path, symlink, write_string};
use crate::util::hash::{sha256_file, sha256sum_line};

/// Files produced by packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedRelease {
    pub tag: String,
    pub archive: PathBuf,
    pub checksum: PathBuf,
}

/// Options for [`package`].
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    /// Use an existing archive instead of recreating it
    pub reuse_tarball: bool,
}

/// Add compatibility symlinks, archive `install_dir` and write the checksum.
pub fn package(
    install_dir: &Path,
    version: &LlvmVersion,
    platform: &Platform,
    opts: &PackageOptions,
) -> Result<PackagedRelease> {
    let tag = tag_from_install_dir(install_dir)?;
    if platform.is_linux() {
        create_runtime_compat_symlinks(install_dir, version, &platform.arch)?;
    }
    let archive = create_archive(install_dir, opts.reuse_tarball)?;
    let checksum = write_checksum(&archive)?;
    Ok(PackagedRelease {
        tag,
        archive,
        checksum,
    })
}

/// The release tag encoded in the install directory name.
pub fn tag_from_install_dir(install_dir: &Path) -> Result<String> {
    let basename = file_name_string(install_dir);
    parse_tag_from_install_dir_name(&basename)
        .map(str::to_string)
        .ok_or_else(|| InvariantError::UnexpectedInstallDirName(basename).into())
}

/// `<parent>/<basename>.tar.gz`
pub fn archive_path(install_dir: &Path) -> PathBuf {
    let name = format!("{}.tar.gz", file_name_string(install_dir));
    match install_dir.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Runtime library directory under `install_dir`, for whichever version
/// spelling (`16` or `16.0.6`) the toolchain installed.
pub fn runtime_lib_dir(install_dir: &Path, version: &LlvmVersion) -> Result<PathBuf> {
    let mut variants = vec![version.major().to_string(), version.without_suffix()];
    variants.sort();
    variants.dedup();

    let candidates: Vec<PathBuf> = variants
        .iter()
        .map(|v| install_dir.join("lib").join("clang").join(v).join("lib"))
        .collect();
    let mut found: Vec<PathBuf> = candidates.iter().filter(|p| p.is_dir()).cloned().collect();
    match found.len() {
        0 => Err(InvariantError::NoRuntimeLibDir { candidates }.into()),
        1 => Ok(found.remove(0)),
        _ => Err(InvariantError::MultipleRuntimeLibDirs { found }.into()),
    }
}

/// Link `lib/clang/<v>/lib/linux/<name>-<arch>.<ext>` to each runtime
/// library in `lib/clang/<v>/lib/<arch>-unknown-linux-gnu/`.
///
/// Some build systems look for runtime libraries under the old per-OS
/// layout. Links that already exist are left alone. Returns the number of
/// links created.
pub fn create_runtime_compat_symlinks(install_dir: &Path, version: &LlvmVersion, arch: &str) -> Result<usize> {
    let lib_dir = runtime_lib_dir(install_dir, version)?;
    let per_arch_dir = lib_dir.join(format!("{}-unknown-linux-gnu", arch));
    if !per_arch_dir.is_dir() {
        return Err(InvariantError::MissingPerArchDir(per_arch_dir).into());
    }
    let link_dir = lib_dir.join("linux");
    ensure_dir(&link_dir)?;

    let mut libraries: Vec<PathBuf> = std::fs::read_dir(&per_arch_dir)
        .with_context(|| format!("failed to read directory {}", per_arch_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("a") | Some("so")))
        .collect();
    libraries.sort();

    let mut created = 0;
    for library in libraries {
        let (Some(stem), Some(ext)) = (
            library.file_stem().and_then(|s| s.to_str()),
            library.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        let link = link_dir.join(format!("{}-{}.{}", stem, arch, ext));
        if link.symlink_metadata().is_ok() {
            continue;
        }
        symlink(&relative_path(&link_dir, &library), &link)
            .with_context(|| format!("failed to create symlink {}", link.display()))?;
        created += 1;
    }

    tracing::info!(
        "Created {} symlinks to files in {} in {}",
        created,
        per_arch_dir.display(),
        link_dir.display()
    );
    Ok(created)
}

/// Archive `install_dir` next to itself. Symlinks are stored as symlinks.
pub fn create_archive(install_dir: &Path, reuse_tarball: bool) -> Result<PathBuf> {
    let archive = archive_path(install_dir);
    if archive.exists() {
        if reuse_tarball {
            tracing::info!("Reusing existing archive {}", archive.display());
            return Ok(archive);
        }
        tracing::info!("Removing existing archive {}", archive.display());
        if let Err(e) = std::fs::remove_file(&archive) {
            tracing::warn!("Failed to remove {}, ignoring the error: {}", archive.display(), e);
        }
    }

    tracing::info!("Creating archive {}", archive.display());
    let file = File::create(&archive)
        .with_context(|| format!("failed to create {}", archive.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(file_name_string(install_dir), install_dir)
        .with_context(|| format!("failed to archive {}", install_dir.display()))?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .with_context(|| format!("failed to finish {}", archive.display()))?;
    Ok(archive)
}

/// Write `<archive>.sha256`.
pub fn write_checksum(archive: &Path) -> Result<PathBuf> {
    let hash = sha256_file(archive)?;
    let mut path = archive.as_os_str().to_owned();
    path.push(".sha256");
    let path = PathBuf::from(path);
    write_string(&path, &sha256sum_line(&hash, archive))?;
    tracing::info!("SHA256 of {}: {}", archive.display(), hash);
    Ok(path)
}

//! Target architecture handling on macOS.
//!
//! A macOS host can run both x86_64 and arm64 binaries, so every external
//! command is pinned with `arch -<target>` and the output is checked for
//! objects of the other architecture.

use std::path::Path;

use anyhow::{bail, Result};
use walkdir::WalkDir;

use crate::core::error::InvariantError;
use crate::core::platform::Platform;
use crate::util::process::ProcessBuilder;

/// CPU architectures a macOS host may build for.
pub const MACOS_CPU_ARCHITECTURES: [&str; 2] = ["x86_64", "arm64"];

/// Command prefix that runs a program as `target_arch`. Empty off macOS.
pub fn arch_switch_prefix(platform: &Platform, target_arch: &str) -> Vec<String> {
    if platform.is_macos() {
        vec!["arch".to_string(), format!("-{}", target_arch)]
    } else {
        Vec::new()
    }
}

/// The macOS architecture that is not `arch`.
pub fn other_macos_arch(arch: &str) -> Result<&'static str> {
    if !MACOS_CPU_ARCHITECTURES.contains(&arch) {
        bail!("not a valid CPU architecture for macOS: {}", arch);
    }
    let others: Vec<&'static str> = MACOS_CPU_ARCHITECTURES
        .iter()
        .copied()
        .filter(|a| *a != arch)
        .collect();
    match others.as_slice() {
        [other] => Ok(*other),
        _ => bail!(
            "could not determine the other macOS CPU architecture for {}, candidates: {:?}",
            arch,
            others
        ),
    }
}

/// Whether `file` output for `rel_path` shows the disallowed architecture.
///
/// The compiler-rt builtins for the other architecture are expected.
pub fn is_wrong_arch(file_type: &str, rel_path: &Path, other_arch: &str) -> bool {
    file_type.ends_with(&format!(" {}", other_arch))
        && !rel_path
            .to_string_lossy()
            .contains(&format!("clang_rt.builtins_{}", other_arch))
}

/// Check every object file and dylib under `top_dir` with `file`.
pub fn validate_build_output_arch(platform: &Platform, target_arch: &str, top_dir: &Path) -> Result<()> {
    if !platform.is_macos() {
        return Ok(());
    }
    let other_arch = other_macos_arch(target_arch)?;
    tracing::info!(
        "Verifying architecture of object files and libraries in {} (should be {})",
        top_dir.display(),
        target_arch
    );

    let candidates = WalkDir::new(top_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            matches!(
                e.path().extension().and_then(|x| x.to_str()),
                Some("o") | Some("dylib")
            )
        });

    for entry in candidates {
        let path = entry.path();
        let file_type = ProcessBuilder::new("file").arg(path).exec_stdout()?;
        let rel_path = path.strip_prefix(top_dir).unwrap_or(path);
        if is_wrong_arch(&file_type, rel_path, other_arch) {
            return Err(InvariantError::WrongArchitecture {
                path: path.to_path_buf(),
                expected: target_arch.to_string(),
                file_type,
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::Os;

    #[test]
    fn test_prefix_only_on_macos() {
        let mac = Platform::new(Os::MacOs, "macos14", "arm64");
        let linux = Platform::new(Os::Linux, "ubuntu22.04", "x86_64");
        assert_eq!(arch_switch_prefix(&mac, "x86_64"), vec!["arch", "-x86_64"]);
        assert!(arch_switch_prefix(&linux, "x86_64").is_empty());
    }

    #[test]
    fn test_other_arch() {
        assert_eq!(other_macos_arch("arm64").unwrap(), "x86_64");
        assert_eq!(other_macos_arch("x86_64").unwrap(), "arm64");
        assert!(other_macos_arch("aarch64").is_err());
    }

    #[test]
    fn test_wrong_arch_detection() {
        let rel = Path::new("lib/libc++.dylib");
        assert!(is_wrong_arch(
            "lib/libc++.dylib: Mach-O 64-bit dynamically linked shared library x86_64",
            rel,
            "x86_64"
        ));
        assert!(!is_wrong_arch(
            "lib/libc++.dylib: Mach-O 64-bit dynamically linked shared library arm64",
            rel,
            "x86_64"
        ));
        assert!(!is_wrong_arch(
            "x.o: Mach-O 64-bit object x86_64",
            Path::new("lib/clang_rt.builtins_x86_64_osx/x.o"),
            "x86_64"
        ));
    }

    #[test]
    fn test_validation_skipped_off_macos() {
        let linux = Platform::new(Os::Linux, "ubuntu22.04", "x86_64");
        validate_build_output_arch(&linux, "x86_64", Path::new("/nonexistent")).unwrap();
    }
}

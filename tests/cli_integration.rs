//! CLI integration tests for build-clang.
//!
//! These tests run the binary without building anything: validation
//! failures, the JSON plan and the skip paths.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Get the build-clang binary command with a clean environment.
fn build_clang(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("build-clang").unwrap();
    cmd.current_dir(cwd)
        .env_remove("BUILD_CLANG_REMOTELY")
        .env_remove("BUILD_CLANG_REMOTE_SERVER")
        .env_remove("BUILD_CLANG_REMOTE_BUILD_SCRIPTS_PATH")
        .env_remove("YB_TARGET_ARCH")
        .env_remove("RUST_LOG");
    cmd
}

/// Create a temporary directory used as cwd and install parent.
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn plan(tmp: &TempDir, args: &[&str]) -> Value {
    let output = build_clang(tmp.path())
        .args(["--print_plan", "--install_parent_dir"])
        .arg(tmp.path())
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_help_lists_flags() {
    let tmp = temp_dir();
    build_clang(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--llvm_version"))
        .stdout(predicate::str::contains("--existing_build_dir"));
}

#[test]
fn test_pgo_without_lto_fails() {
    let tmp = temp_dir();
    build_clang(tmp.path())
        .args(["--no_lto", "--pgo", "--print_plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PGO build requires LTO enabled"));
}

#[test]
fn test_max_stage_too_high_fails() {
    let tmp = temp_dir();
    build_clang(tmp.path())
        .args(["--no_lto", "--max_stage", "4", "--print_plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "--max_stage value too high: 4, must be 3 or lower. LTO is disabled. PGO is disabled",
        ));
}

#[test]
fn test_inverted_stage_range_fails() {
    let tmp = temp_dir();
    build_clang(tmp.path())
        .args(["--min_stage", "3", "--max_stage", "2", "--print_plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is greater than --max_stage value"));
}

#[test]
fn test_invalid_existing_build_dir_fails() {
    let tmp = temp_dir();
    let dir = tmp.path().join("not-a-build-dir");
    fs::create_dir(&dir).unwrap();

    build_clang(tmp.path())
        .arg("--existing_build_dir")
        .arg(&dir)
        .arg("--print_plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid existing build directory basename"));
}

#[test]
fn test_unsupported_version_fails() {
    let tmp = temp_dir();
    build_clang(tmp.path())
        .args(["--llvm_version", "6.0.1", "--print_plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not supported"));
}

#[test]
fn test_remote_build_requires_server() {
    let tmp = temp_dir();
    build_clang(tmp.path())
        .env("BUILD_CLANG_REMOTELY", "1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("remote build misconfigured"));
}

// ============================================================================
// --print_plan
// ============================================================================

#[test]
fn test_plan_without_lto_has_three_stages() {
    let tmp = temp_dir();
    let plan = plan(&tmp, &["--llvm_version", "16", "--no_lto"]);

    let stages = plan["stages"].as_array().unwrap();
    assert_eq!(stages.len(), 3);
    let numbers: Vec<u64> = stages.iter().map(|s| s["number"].as_u64().unwrap()).collect();
    assert_eq!(numbers, [1, 2, 3]);
    assert!(stages.iter().all(|s| s["selected"] == true));

    let final_dir = plan["final_install_dir"].as_str().unwrap();
    let prefixes: Vec<&str> = stages
        .iter()
        .map(|s| s["options"]["CMAKE_INSTALL_PREFIX"].as_str().unwrap())
        .collect();
    assert_ne!(prefixes[0], final_dir);
    assert_ne!(prefixes[1], final_dir);
    assert_eq!(prefixes[2], final_dir);
    assert!(plan["tag"].as_str().unwrap().starts_with("v16.0.6-yb-3-"));
}

#[test]
fn test_plan_with_pgo_has_seven_stages() {
    let tmp = temp_dir();
    let plan = plan(&tmp, &["--llvm_version", "18", "--min_stage", "4"]);

    let stages = plan["stages"].as_array().unwrap();
    let roles: Vec<&str> = stages.iter().map(|s| s["role"].as_str().unwrap()).collect();
    assert_eq!(
        roles,
        [
            "ordinary",
            "ordinary",
            "final_ordinary",
            "lto",
            "pgo_instrumented",
            "pgo_training",
            "pgo_final",
        ]
    );
    assert_eq!(stages[2]["selected"], false);
    assert_eq!(stages[3]["selected"], true);
    assert_eq!(stages[3]["install"]["kind"], "replace_binaries");
}

#[test]
fn test_plan_skip_auto_suffix_tag() {
    let tmp = temp_dir();
    let plan = plan(&tmp, &["--llvm_version", "18", "--skip_auto_suffix"]);
    assert_eq!(plan["tag"], "v18.1.8-yb-1");
    assert_eq!(
        plan["final_install_dir"].as_str().unwrap(),
        tmp.path().join("yb-llvm-v18.1.8-yb-1").display().to_string()
    );
}

#[test]
fn test_project_config_sets_install_parent() {
    let tmp = temp_dir();
    let parent = tmp.path().join("from-config");
    fs::write(
        tmp.path().join("build-clang.toml"),
        format!("[build]\ninstall_parent_dir = \"{}\"\n", parent.display()),
    )
    .unwrap();

    let output = build_clang(tmp.path())
        .args(["--print_plan", "--skip_auto_suffix", "--llvm_version", "17"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let plan: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        plan["build_parent_dir"].as_str().unwrap(),
        parent.join("yb-llvm-v17.0.6-yb-1-build").display().to_string()
    );
}

// ============================================================================
// Skips
// ============================================================================

#[test]
fn test_skip_build_and_upload_succeeds() {
    let tmp = temp_dir();
    build_clang(tmp.path())
        .arg("--install_parent_dir")
        .arg(tmp.path())
        .args(["--skip_build", "--skip_upload"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Skipping build"));
}

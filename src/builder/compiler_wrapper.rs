//! Compiler wrapper that records every compiler invocation.
//!
//! When enabled, CMake is pointed at the `build-clang-cc` and
//! `build-clang-cxx` binaries. They read the real compiler and the record
//! directory from the environment, write one JSON file per invocation and
//! then run the real compiler through ccache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::compilers::CompilerPair;
use crate::util::fs::write_string;
use crate::util::hash::sha256_str;
use crate::util::process::find_executable;

pub const UNDERLYING_C_COMPILER_ENV: &str = "BUILD_CLANG_UNDERLYING_C_COMPILER";
pub const UNDERLYING_CXX_COMPILER_ENV: &str = "BUILD_CLANG_UNDERLYING_CXX_COMPILER";
pub const INVOCATIONS_DIR_ENV: &str = "BUILD_CLANG_COMPILER_INVOCATIONS_DIR";

/// Wrapper binary names.
pub const C_WRAPPER_NAME: &str = "build-clang-cc";
pub const CXX_WRAPPER_NAME: &str = "build-clang-cxx";

/// One recorded compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub compiler: PathBuf,
    pub args: Vec<String>,
    pub directory: PathBuf,
}

/// Wrapper binaries installed next to the running executable.
pub fn wrapper_compilers() -> Result<CompilerPair> {
    let exe = std::env::current_exe().context("failed to locate the running executable")?;
    let dir = exe
        .parent()
        .context("running executable has no parent directory")?;
    Ok(wrapper_compilers_in(dir))
}

pub fn wrapper_compilers_in(dir: &Path) -> CompilerPair {
    CompilerPair::new(dir.join(C_WRAPPER_NAME), dir.join(CXX_WRAPPER_NAME))
}

/// Environment telling the wrappers what to run and where to record.
pub fn wrapper_env(underlying: &CompilerPair, invocations_dir: &Path) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            UNDERLYING_C_COMPILER_ENV.to_string(),
            underlying.c.display().to_string(),
        ),
        (
            UNDERLYING_CXX_COMPILER_ENV.to_string(),
            underlying.cxx.display().to_string(),
        ),
        (
            INVOCATIONS_DIR_ENV.to_string(),
            invocations_dir.display().to_string(),
        ),
    ])
}

/// `compiler_invocation_<timestamp>_<hash>.json`
pub fn invocation_file_name(timestamp: &str, compiler: &Path, args: &[String]) -> String {
    let mut command_line = compiler.display().to_string();
    for arg in args {
        command_line.push(' ');
        command_line.push_str(arg);
    }
    let hash = sha256_str(&command_line);
    format!("compiler_invocation_{}_{}.json", timestamp, &hash[..16])
}

/// Record the invocation and run the real compiler. Returns its exit code.
pub fn run_wrapper(is_cxx: bool, args: Vec<String>) -> Result<i32> {
    let var = if is_cxx {
        UNDERLYING_CXX_COMPILER_ENV
    } else {
        UNDERLYING_C_COMPILER_ENV
    };
    let compiler = PathBuf::from(
        std::env::var(var).with_context(|| format!("{} is not set", var))?,
    );
    let invocations_dir = PathBuf::from(
        std::env::var(INVOCATIONS_DIR_ENV)
            .with_context(|| format!("{} is not set", INVOCATIONS_DIR_ENV))?,
    );

    let invocation = Invocation {
        compiler: compiler.clone(),
        args,
        directory: std::env::current_dir().context("failed to get current directory")?,
    };
    record_invocation(&invocations_dir, &invocation)?;

    let mut cmd = match find_executable("ccache") {
        Some(ccache) => {
            let mut cmd = Command::new(ccache);
            cmd.arg(&compiler).env("CCACHE_COMPILER", &compiler);
            cmd
        }
        None => Command::new(&compiler),
    };
    let status = cmd
        .args(&invocation.args)
        .status()
        .with_context(|| format!("failed to execute `{}`", compiler.display()))?;
    Ok(status.code().unwrap_or(1))
}

/// Write `invocation` as a JSON file in `dir`.
pub fn record_invocation(dir: &Path, invocation: &Invocation) -> Result<PathBuf> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let path = dir.join(invocation_file_name(
        &nanos.to_string(),
        &invocation.compiler,
        &invocation.args,
    ));
    let json = serde_json::to_string_pretty(invocation)?;
    write_string(&path, &json)?;
    Ok(path)
}

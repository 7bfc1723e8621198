//! CMake and Ninja invocation for one stage.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::options::CMakeOptions;
use crate::builder::tools::BuildTools;
use crate::util::fs::ensure_dir;
use crate::util::process::ProcessBuilder;

/// CMake generator used for every stage.
pub const CMAKE_GENERATOR: &str = "Ninja";

/// Configures an LLVM build tree and runs ninja in it.
pub struct CMakeBuilder<'a> {
    tools: &'a BuildTools,
    source_dir: PathBuf,
    build_dir: PathBuf,
    cmd_prefix: Vec<String>,
    parallelism: Option<usize>,
}

impl<'a> CMakeBuilder<'a> {
    /// Create a builder for `source_dir` (the `llvm` directory of the
    /// checkout) and `build_dir`.
    pub fn new(tools: &'a BuildTools, source_dir: PathBuf, build_dir: PathBuf) -> Self {
        CMakeBuilder {
            tools,
            source_dir,
            build_dir,
            cmd_prefix: Vec::new(),
            parallelism: None,
        }
    }

    /// Prefix every command, e.g. with `arch -arm64`.
    pub fn cmd_prefix(mut self, prefix: Vec<String>) -> Self {
        self.cmd_prefix = prefix;
        self
    }

    /// Pass `-j<n>` to ninja.
    pub fn parallelism(mut self, parallelism: Option<usize>) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    // Runs in the current directory; the executor enters the build
    // directory for the whole stage.
    fn command(&self, program: &Path) -> ProcessBuilder {
        ProcessBuilder::with_prefix(&self.cmd_prefix, program)
    }

    /// The cmake configure command for `options`.
    pub fn configure_command(&self, options: &CMakeOptions) -> ProcessBuilder {
        self.command(self.tools.cmake())
            .arg("-G")
            .arg(CMAKE_GENERATOR)
            .arg("-S")
            .arg(&self.source_dir)
            .arg("-B")
            .arg(&self.build_dir)
            .args(options.to_cmake_args())
    }

    /// Run the cmake configure step.
    pub fn configure(&self, options: &CMakeOptions) -> Result<()> {
        ensure_dir(&self.build_dir)?;
        self.configure_command(options)
            .run()
            .with_context(|| format!("CMake configuration failed in {}", self.build_dir.display()))
    }

    /// The ninja command building `targets`, or everything if empty.
    pub fn ninja_command(&self, targets: &[String]) -> ProcessBuilder {
        let mut cmd = self
            .command(self.tools.ninja())
            .arg("-C")
            .arg(&self.build_dir);
        if let Some(jobs) = self.parallelism {
            cmd = cmd.arg(format!("-j{}", jobs));
        }
        cmd.args(targets)
    }

    /// Run ninja for `targets`.
    pub fn ninja(&self, targets: &[String]) -> Result<()> {
        self.ninja_command(targets).run()
    }
}

/// Check if a directory contains a CMake project.
pub fn is_cmake_project(dir: &Path) -> bool {
    dir.join("CMakeLists.txt").exists()
}

//! Subprocess execution for external build tools.
//!
//! Every external program the pipeline drives (cmake, ninja, git, tar
//! helpers, ssh) goes through [`ProcessBuilder`]. Long-running build steps use
//! [`ProcessBuilder::run`], which streams output to the terminal; short
//! queries use [`ProcessBuilder::exec_and_check`] and capture it.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{bail, Context, Result};

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Create a builder whose program and leading arguments come from `prefix`,
    /// e.g. `["arch", "-arm64"]`, followed by `program`.
    pub fn with_prefix(prefix: &[String], program: impl AsRef<Path>) -> Self {
        match prefix.split_first() {
            Some((first, rest)) => ProcessBuilder::new(first)
                .args(rest)
                .arg(program.as_ref()),
            None => ProcessBuilder::new(program),
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable for this process only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command, capturing stdout and stderr.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        cmd.output()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))
    }

    /// Execute with captured output and require success.
    pub fn exec_and_check(&self) -> Result<Output> {
        let output = self.exec()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` failed with exit code {:?}\n{}",
                self.display_command(),
                output.status.code(),
                stderr
            );
        }
        Ok(output)
    }

    /// Execute with captured output and return trimmed stdout.
    pub fn exec_stdout(&self) -> Result<String> {
        let output = self.exec_and_check()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Execute with inherited stdio and require success.
    ///
    /// No retry is attempted; a non-zero exit is returned as an error and the
    /// caller aborts the run.
    pub fn run(&self) -> Result<()> {
        tracing::info!("Running command: {}", self.display_command());
        let status = self
            .build_command()
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))?;

        if !status.success() {
            match status.code() {
                Some(code) => bail!("`{}` failed with exit code {}", self.display_command(), code),
                None => bail!("`{}` was terminated by a signal", self.display_command()),
            }
        }
        Ok(())
    }

    /// Display the command for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![shell_quote(&self.program.display().to_string())];
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

/// Quote a string for a POSIX shell, leaving plain words untouched.
pub fn shell_quote(s: &str) -> String {
    let is_plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if is_plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_stdout() {
        let out = ProcessBuilder::new("echo").arg("hello").exec_stdout().unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_run_propagates_failure() {
        let err = ProcessBuilder::new("false").run().unwrap_err();
        assert!(err.to_string().contains("failed with exit code 1"));
    }

    #[test]
    fn test_env_is_per_process() {
        let out = ProcessBuilder::new("sh")
            .args(["-c", "echo $BUILD_CLANG_PROCESS_TEST"])
            .env("BUILD_CLANG_PROCESS_TEST", "scoped")
            .exec_stdout()
            .unwrap();
        assert_eq!(out, "scoped");
        assert!(std::env::var("BUILD_CLANG_PROCESS_TEST").is_err());
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("ninja").args(["-j8", "clang"]);
        assert_eq!(pb.display_command(), "ninja -j8 clang");

        let pb = ProcessBuilder::new("cmake").arg("-DCMAKE_EXE_LINKER_FLAGS_INIT=-lc++ -lunwind");
        assert_eq!(
            pb.display_command(),
            "cmake '-DCMAKE_EXE_LINKER_FLAGS_INIT=-lc++ -lunwind'"
        );
    }

    #[test]
    fn test_with_prefix() {
        let prefix = vec!["arch".to_string(), "-arm64".to_string()];
        let pb = ProcessBuilder::with_prefix(&prefix, "ninja").arg("clang");
        assert_eq!(pb.get_program(), Path::new("arch"));
        assert_eq!(pb.get_args(), &["-arm64", "ninja", "clang"]);

        let pb = ProcessBuilder::with_prefix(&[], "ninja");
        assert_eq!(pb.get_program(), Path::new("ninja"));
        assert!(pb.get_args().is_empty());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "plain");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}

//! Scoped acquisitions of process-wide state.
//!
//! A stage runs its external tools from inside its build directory and with
//! stage-specific environment variables. Both are process-wide, so each is
//! held by a guard that records the previous state and restores it in `Drop`,
//! which also runs when the stage bails out with an error.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Changes the current directory for the guard's lifetime.
#[must_use = "the previous directory is restored when the guard is dropped"]
pub struct ScopedCurrentDir {
    previous: PathBuf,
}

impl ScopedCurrentDir {
    /// Switch to `dir`, remembering the current directory.
    pub fn enter(dir: &Path) -> Result<Self> {
        let previous = std::env::current_dir().context("failed to get current directory")?;
        std::env::set_current_dir(dir)
            .with_context(|| format!("failed to change directory to {}", dir.display()))?;
        tracing::debug!("Entered directory {}", dir.display());
        Ok(ScopedCurrentDir { previous })
    }
}

impl Drop for ScopedCurrentDir {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            tracing::warn!(
                "failed to restore working directory {}: {}",
                self.previous.display(),
                e
            );
        }
    }
}

/// Sets environment variables for the guard's lifetime.
#[must_use = "the previous environment is restored when the guard is dropped"]
pub struct ScopedEnvVars {
    saved: Vec<(String, Option<OsString>)>,
}

impl ScopedEnvVars {
    /// Apply `vars`, saving each variable's previous value (or absence).
    pub fn apply<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut saved = Vec::new();
        for (key, value) in vars {
            let key = key.into();
            saved.push((key.clone(), std::env::var_os(&key)));
            std::env::set_var(&key, value.as_ref());
        }
        ScopedEnvVars { saved }
    }

    /// Number of variables held by this scope.
    pub fn len(&self) -> usize {
        self.saved.len()
    }

    /// Whether this scope holds no variables.
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

impl Drop for ScopedEnvVars {
    fn drop(&mut self) {
        // Reverse order so a key applied twice ends at its original value.
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_current_dir_restored() {
        let tmp = TempDir::new().unwrap();
        let before = std::env::current_dir().unwrap();
        {
            let _cwd = ScopedCurrentDir::enter(tmp.path()).unwrap();
            assert_eq!(
                std::env::current_dir().unwrap().canonicalize().unwrap(),
                tmp.path().canonicalize().unwrap()
            );
        }
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    #[serial]
    fn test_current_dir_restored_on_error_path() {
        fn failing_step(dir: &Path) -> Result<()> {
            let _cwd = ScopedCurrentDir::enter(dir)?;
            anyhow::bail!("ninja failed")
        }

        let tmp = TempDir::new().unwrap();
        let before = std::env::current_dir().unwrap();
        assert!(failing_step(tmp.path()).is_err());
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    #[serial]
    fn test_enter_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let before = std::env::current_dir().unwrap();
        assert!(ScopedCurrentDir::enter(&tmp.path().join("missing")).is_err());
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    #[serial]
    fn test_env_vars_restored() {
        std::env::set_var("BUILD_CLANG_SCOPED_EXISTING", "outer");
        std::env::remove_var("BUILD_CLANG_SCOPED_NEW");
        {
            let scope = ScopedEnvVars::apply([
                ("BUILD_CLANG_SCOPED_EXISTING", "inner"),
                ("BUILD_CLANG_SCOPED_NEW", "set"),
            ]);
            assert_eq!(scope.len(), 2);
            assert_eq!(std::env::var("BUILD_CLANG_SCOPED_EXISTING").unwrap(), "inner");
            assert_eq!(std::env::var("BUILD_CLANG_SCOPED_NEW").unwrap(), "set");
        }
        assert_eq!(std::env::var("BUILD_CLANG_SCOPED_EXISTING").unwrap(), "outer");
        assert!(std::env::var_os("BUILD_CLANG_SCOPED_NEW").is_none());
        std::env::remove_var("BUILD_CLANG_SCOPED_EXISTING");
    }

    #[test]
    #[serial]
    fn test_env_vars_duplicate_key() {
        std::env::remove_var("BUILD_CLANG_SCOPED_DUP");
        {
            let _scope = ScopedEnvVars::apply([
                ("BUILD_CLANG_SCOPED_DUP", "first"),
                ("BUILD_CLANG_SCOPED_DUP", "second"),
            ]);
            assert_eq!(std::env::var("BUILD_CLANG_SCOPED_DUP").unwrap(), "second");
        }
        assert!(std::env::var_os("BUILD_CLANG_SCOPED_DUP").is_none());
    }
}

//! Build identity: the tag naming a build's directories, archive and release.
//!
//! A fresh build does not know its source revision until the llvm-project
//! checkout exists, and the checkout lives inside the build directory whose
//! name includes that revision. The identity therefore starts out
//! [`Revision::Unresolved`] with a placeholder token in its name and moves to
//! [`Revision::Resolved`] exactly once.

use std::path::Path;

use serde::Serialize;

use crate::core::error::{ConfigError, IdentityError};

/// Prefix of every install directory, build directory and archive name.
pub const ARCHIVE_NAME_PREFIX: &str = "yb-llvm-";

/// Separator between tag components.
pub const NAME_COMPONENT_SEPARATOR: &str = "-";

/// Suffix distinguishing the build directory from the install directory.
pub const BUILD_DIR_SUFFIX: &str = "-build";

/// Stands in for the source revision until it is known.
pub const REVISION_PLACEHOLDER: &str = "GIT_SHA1_PLACEHOLDER";

/// Number of revision characters used in names.
pub const REVISION_PREFIX_LEN: usize = 8;

/// Tag component marking builds that do not use the sanitizer runtime.
pub const NO_COMPILER_RT_MARKER: &str = "no-compiler-rt";

/// Inputs to an automatically suffixed tag, other than the revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagComponents {
    /// Seconds since the epoch when the run started
    pub unix_timestamp: String,
    /// Whether compiler-rt is the runtime library
    pub use_compiler_rt: bool,
    /// `--top_dir_suffix`
    pub user_suffix: Option<String>,
    /// e.g. `ubuntu22.04`
    pub short_os_name_and_version: String,
    /// e.g. `x86_64`
    pub arch: String,
}

/// How the tag is composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagScheme {
    /// Exactly `v<version>`.
    Plain,
    /// `v<version>` followed by the present components.
    Auto(TagComponents),
    /// A tag recovered from an existing build directory name.
    Fixed { tag: String },
}

/// Source revision state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "prefix", rename_all = "snake_case")]
pub enum Revision {
    Unresolved,
    Resolved(String),
}

/// The naming identity of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildIdentity {
    version: String,
    scheme: TagScheme,
    revision: Revision,
}

impl BuildIdentity {
    /// Identity whose tag is exactly `v<version>`.
    pub fn plain(version: impl Into<String>) -> Self {
        BuildIdentity {
            version: version.into(),
            scheme: TagScheme::Plain,
            revision: Revision::Unresolved,
        }
    }

    /// Identity with automatic suffixes and a not-yet-known revision.
    pub fn auto(version: impl Into<String>, components: TagComponents) -> Self {
        BuildIdentity {
            version: version.into(),
            scheme: TagScheme::Auto(components),
            revision: Revision::Unresolved,
        }
    }

    /// Recover the identity of an existing build directory such as
    /// `/opt/yb-build/llvm/yb-llvm-v16.0.6-yb-3-1700000000-abcdef12-build`.
    pub fn from_existing_build_dir(
        version: impl Into<String>,
        build_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let basename = build_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tag = parse_tag_from_build_dir_name(&basename)?;
        Ok(BuildIdentity {
            version: version.into(),
            scheme: TagScheme::Fixed { tag },
            revision: Revision::Unresolved,
        })
    }

    /// The LLVM version string this identity was created for.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// How the tag is composed.
    pub fn scheme(&self) -> &TagScheme {
        &self.scheme
    }

    /// Current revision state.
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Whether the tag still contains the revision placeholder.
    pub fn needs_resolution(&self) -> bool {
        matches!(self.scheme, TagScheme::Auto(_)) && self.revision == Revision::Unresolved
    }

    /// Compose the tag, e.g. `v16.0.6-yb-3-1700000000-abcdef12-ubuntu22.04-x86_64`.
    pub fn tag(&self) -> String {
        match &self.scheme {
            TagScheme::Plain => format!("v{}", self.version),
            TagScheme::Fixed { tag } => tag.clone(),
            TagScheme::Auto(c) => {
                let revision = match &self.revision {
                    Revision::Unresolved => REVISION_PLACEHOLDER,
                    Revision::Resolved(prefix) => prefix.as_str(),
                };
                let rt_marker = if c.use_compiler_rt {
                    None
                } else {
                    Some(NO_COMPILER_RT_MARKER)
                };
                let components: Vec<&str> = [
                    Some(c.unix_timestamp.as_str()),
                    Some(revision),
                    rt_marker,
                    c.user_suffix.as_deref(),
                    Some(c.short_os_name_and_version.as_str()),
                    Some(c.arch.as_str()),
                ]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect();
                format!(
                    "v{}{}{}",
                    self.version,
                    NAME_COMPONENT_SEPARATOR,
                    components.join(NAME_COMPONENT_SEPARATOR)
                )
            }
        }
    }

    /// Name of the final install directory and archive stem.
    pub fn install_dir_basename(&self) -> String {
        format!("{}{}", ARCHIVE_NAME_PREFIX, self.tag())
    }

    /// Name of the directory holding stages and the source checkout.
    pub fn build_dir_basename(&self) -> String {
        format!("{}{}", self.install_dir_basename(), BUILD_DIR_SUFFIX)
    }

    /// Bind the source revision. Legal exactly once.
    pub fn resolve(&mut self, revision: &str) -> Result<(), IdentityError> {
        if let Revision::Resolved(existing) = &self.revision {
            return Err(IdentityError::AlreadyResolved {
                existing: existing.clone(),
            });
        }
        let prefix: String = revision.chars().take(REVISION_PREFIX_LEN).collect();
        if prefix.len() < REVISION_PREFIX_LEN {
            return Err(IdentityError::RevisionTooShort {
                revision: revision.to_string(),
                required: REVISION_PREFIX_LEN,
            });
        }
        self.revision = Revision::Resolved(prefix);
        Ok(())
    }
}

/// Extract the tag from a build directory basename of the form
/// `yb-llvm-<tag>-build`.
pub fn parse_tag_from_build_dir_name(basename: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidExistingBuildDir {
        basename: basename.to_string(),
        reason,
    };
    let rest = basename
        .strip_suffix(BUILD_DIR_SUFFIX)
        .ok_or_else(|| invalid(format!("does not end with '{}'", BUILD_DIR_SUFFIX)))?;
    let tag = rest
        .strip_prefix(ARCHIVE_NAME_PREFIX)
        .ok_or_else(|| invalid(format!("does not start with '{}'", ARCHIVE_NAME_PREFIX)))?;
    if tag.is_empty() {
        return Err(invalid("has an empty tag".to_string()));
    }
    Ok(tag.to_string())
}

/// Extract the tag from a final install directory basename `yb-llvm-<tag>`.
pub fn parse_tag_from_install_dir_name(basename: &str) -> Option<&str> {
    basename
        .strip_prefix(ARCHIVE_NAME_PREFIX)
        .filter(|tag| !tag.is_empty())
}

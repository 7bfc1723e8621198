//! LLVM version handling.
//!
//! Versions look like `16.0.6` or, for releases carrying extra patches,
//! `16.0.6-yb-3`. A bare major version such as `16` is mapped to the pinned
//! patched release for that major version. Unmapped versions keep their
//! spelling, so `10` builds tag `llvmorg-10`.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::core::error::ConfigError;

/// Oldest LLVM major version the stage matrix knows how to build.
pub const MIN_SUPPORTED_MAJOR: u64 = 7;

/// Pinned releases for bare major versions.
pub const LLVM_VERSION_MAP: &[(&str, &str)] = &[
    ("11", "11.1.0-yb-1"),
    ("12", "12.0.1-yb-2"),
    ("13", "13.0.1-yb-2"),
    ("14", "14.0.6-yb-2"),
    ("15", "15.0.7-yb-1"),
    ("16", "16.0.6-yb-3"),
    ("17", "17.0.6-yb-1"),
    ("18", "18.1.8-yb-1"),
    ("19", "19.1.0-yb-1"),
    ("20", "20.1.8-yb-1"),
    ("21", "21.1.1-yb-2"),
];

/// Default value of `--llvm_version`.
pub const DEFAULT_LLVM_VERSION: &str = "18";

/// Map a user-supplied version to its pinned release. Unmapped strings pass through.
pub fn map_version(requested: &str) -> &str {
    LLVM_VERSION_MAP
        .iter()
        .find(|(short, _)| *short == requested)
        .map(|(_, full)| *full)
        .unwrap_or(requested)
}

/// A parsed LLVM version with an optional vendor suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlvmVersion {
    raw: String,
    parsed: semver::Version,
}

impl LlvmVersion {
    /// The version string as given, e.g. `16.0.6-yb-3`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Major version, e.g. 16.
    pub fn major(&self) -> u64 {
        self.parsed.major
    }

    /// The version without its vendor suffix, e.g. `16.0.6`.
    pub fn without_suffix(&self) -> String {
        format!(
            "{}.{}.{}",
            self.parsed.major, self.parsed.minor, self.parsed.patch
        )
    }

    /// Tag name of this release in the llvm-project repository.
    pub fn git_tag(&self) -> String {
        format!("llvmorg-{}", self.raw)
    }
}

impl FromStr for LlvmVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = map_version(s);
        let parsed = semver::Version::parse(&pad_version(s)).map_err(|e| ConfigError::InvalidVersion {
            version: s.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.major < MIN_SUPPORTED_MAJOR {
            return Err(ConfigError::UnsupportedVersion {
                version: s.to_string(),
                minimum: MIN_SUPPORTED_MAJOR,
            });
        }
        Ok(LlvmVersion {
            raw: s.to_string(),
            parsed,
        })
    }
}

/// Fill in a missing minor or patch component so that `10` and `10.0` parse.
/// The original string is kept as the version's name.
fn pad_version(s: &str) -> String {
    let (release, suffix) = match s.split_once('-') {
        Some((release, suffix)) => (release, Some(suffix)),
        None => (s, None),
    };
    let mut padded = release.to_string();
    for _ in release.matches('.').count()..2 {
        padded.push_str(".0");
    }
    match suffix {
        Some(suffix) => format!("{}-{}", padded, suffix),
        None => padded,
    }
}

impl fmt::Display for LlvmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for LlvmVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_version() {
        assert_eq!(map_version("16"), "16.0.6-yb-3");
        assert_eq!(map_version("18"), "18.1.8-yb-1");
        assert_eq!(map_version("12.0.1"), "12.0.1");
        assert_eq!(map_version("99"), "99");
    }

    #[test]
    fn test_parse_with_vendor_suffix() {
        let v: LlvmVersion = "16.0.6-yb-3".parse().unwrap();
        assert_eq!(v.major(), 16);
        assert_eq!(v.as_str(), "16.0.6-yb-3");
        assert_eq!(v.without_suffix(), "16.0.6");
        assert_eq!(v.git_tag(), "llvmorg-16.0.6-yb-3");
        assert_eq!(v.to_string(), "16.0.6-yb-3");
    }

    #[test]
    fn test_parse_plain() {
        let v: LlvmVersion = "12.0.1".parse().unwrap();
        assert_eq!(v.major(), 12);
        assert_eq!(v.without_suffix(), "12.0.1");
    }

    #[test]
    fn test_parse_rejects_old_and_invalid() {
        assert!(matches!(
            "6.0.1".parse::<LlvmVersion>(),
            Err(ConfigError::UnsupportedVersion { .. })
        ));
        assert!(matches!(
            "sixteen".parse::<LlvmVersion>(),
            Err(ConfigError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_parse_maps_bare_major() {
        let v: LlvmVersion = "16".parse().unwrap();
        assert_eq!(v.as_str(), "16.0.6-yb-3");
        assert_eq!(v.git_tag(), "llvmorg-16.0.6-yb-3");
    }

    #[test]
    fn test_parse_unmapped_short_version() {
        let v: LlvmVersion = "10".parse().unwrap();
        assert_eq!(v.as_str(), "10");
        assert_eq!(v.major(), 10);
        assert_eq!(v.without_suffix(), "10.0.0");
        assert_eq!(v.git_tag(), "llvmorg-10");

        let v: LlvmVersion = "10.0-rc1".parse().unwrap();
        assert_eq!(v.major(), 10);
        assert_eq!(v.as_str(), "10.0-rc1");

        assert!(matches!(
            "6".parse::<LlvmVersion>(),
            Err(ConfigError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_every_mapped_version_parses() {
        for (short, full) in LLVM_VERSION_MAP {
            let v: LlvmVersion = full.parse().unwrap();
            assert_eq!(v.major().to_string(), *short);
        }
    }
}

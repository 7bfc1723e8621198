//! Host platform facts consulted by the stage matrix.

use std::fmt;
use std::path::Path;

use regex::Regex;
use serde::Serialize;

use crate::util::process::ProcessBuilder;

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    MacOs,
    Other,
}

impl Os {
    /// The OS this binary was compiled for.
    pub fn host() -> Self {
        match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            _ => Os::Other,
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Linux => write!(f, "linux"),
            Os::MacOs => write!(f, "macos"),
            Os::Other => write!(f, "other"),
        }
    }
}

/// Everything about the host that changes what a stage builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    /// OS family
    pub os: Os,
    /// Short distribution name and version, e.g. `amzn2`, `ubuntu22.04`, `macos14`
    pub short_os_name_and_version: String,
    /// Machine architecture as `uname -m` reports it, e.g. `x86_64`, `aarch64`, `arm64`
    pub arch: String,
}

impl Platform {
    /// Construct platform facts explicitly.
    pub fn new(os: Os, short_os_name_and_version: impl Into<String>, arch: impl Into<String>) -> Self {
        Platform {
            os,
            short_os_name_and_version: short_os_name_and_version.into(),
            arch: arch.into(),
        }
    }

    /// Detect facts about the running host.
    pub fn detect() -> Self {
        let os = Os::host();
        let short_os_name_and_version = match os {
            Os::Linux => std::fs::read_to_string(Path::new("/etc/os-release"))
                .ok()
                .and_then(|contents| short_name_from_os_release(&contents))
                .unwrap_or_else(|| "linux".to_string()),
            Os::MacOs => ProcessBuilder::new("sw_vers")
                .arg("-productVersion")
                .exec_stdout()
                .ok()
                .and_then(|v| v.split('.').next().map(|major| format!("macos{}", major)))
                .unwrap_or_else(|| "macos".to_string()),
            Os::Other => std::env::consts::OS.to_string(),
        };
        Platform {
            os,
            short_os_name_and_version,
            arch: host_machine(os),
        }
    }

    /// Whether this is Linux, the primary build platform.
    pub fn is_linux(&self) -> bool {
        self.os == Os::Linux
    }

    /// Whether this is macOS, the secondary build platform.
    pub fn is_macos(&self) -> bool {
        self.os == Os::MacOs
    }

    /// Per-target runtime library subdirectory, e.g. `lib/x86_64-unknown-linux-gnu`.
    pub fn os_specific_lib_dir(&self) -> String {
        format!("lib/{}-unknown-linux-gnu", self.arch)
    }
}

/// Host architecture in `uname -m` spelling.
fn host_machine(os: Os) -> String {
    match (os, std::env::consts::ARCH) {
        (Os::MacOs, "aarch64") => "arm64".to_string(),
        (_, arch) => arch.to_string(),
    }
}

/// Derive a short name like `centos7` or `ubuntu22.04` from `/etc/os-release`.
pub fn short_name_from_os_release(contents: &str) -> Option<String> {
    let re = Regex::new(r#"(?m)^(ID|VERSION_ID)="?([^"\n]*)"?\s*$"#).ok()?;
    let mut id = None;
    let mut version_id = None;
    for caps in re.captures_iter(contents) {
        match &caps[1] {
            "ID" => id = Some(caps[2].to_string()),
            "VERSION_ID" => version_id = Some(caps[2].to_string()),
            _ => {}
        }
    }
    let id = id?;
    let version_id = version_id.unwrap_or_default();
    // Ubuntu is identified by its full release number, others by their major version.
    let version = if id == "ubuntu" {
        version_id
    } else {
        version_id.split('.').next().unwrap_or_default().to_string()
    };
    Some(format!("{}{}", id, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_amazon_linux() {
        let contents = "NAME=\"Amazon Linux\"\nVERSION=\"2\"\nID=\"amzn\"\nID_LIKE=\"centos rhel fedora\"\nVERSION_ID=\"2\"\n";
        assert_eq!(short_name_from_os_release(contents).as_deref(), Some("amzn2"));
    }

    #[test]
    fn test_short_name_ubuntu_keeps_minor() {
        let contents = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(
            short_name_from_os_release(contents).as_deref(),
            Some("ubuntu22.04")
        );
    }

    #[test]
    fn test_short_name_almalinux_major_only() {
        let contents = "ID=\"almalinux\"\nVERSION_ID=\"8.7\"\n";
        assert_eq!(
            short_name_from_os_release(contents).as_deref(),
            Some("almalinux8")
        );
    }

    #[test]
    fn test_short_name_missing_id() {
        assert_eq!(short_name_from_os_release("VERSION_ID=\"7\"\n"), None);
    }

    #[test]
    fn test_os_specific_lib_dir() {
        let platform = Platform::new(Os::Linux, "ubuntu22.04", "aarch64");
        assert_eq!(platform.os_specific_lib_dir(), "lib/aarch64-unknown-linux-gnu");
        assert!(platform.is_linux());
        assert!(!platform.is_macos());
    }

    #[test]
    fn test_detect_is_consistent() {
        let platform = Platform::detect();
        assert_eq!(platform.os, Os::host());
        assert!(!platform.arch.is_empty());
        assert!(!platform.short_os_name_and_version.is_empty());
    }
}

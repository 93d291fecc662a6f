//! Platform tags and OS family matching.
//!
//! Packages carry a wheel-style platform tag (`win_amd64`, `linux_x86_64`,
//! `macosx_arm64`). Installation only cares about the OS family.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    MacOs,
    Other,
}

impl OsFamily {
    /// The family of the running process.
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value.
    pub fn from_os_name(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            _ => Self::Other,
        }
    }

    /// Classify a platform tag. Unknown tags yield `None`.
    pub fn from_platform_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        // "darwin" contains "win", so macOS is checked first
        if tag.starts_with("macosx") || tag.starts_with("macos") || tag.starts_with("darwin") {
            Some(Self::MacOs)
        } else if tag.starts_with("win") {
            Some(Self::Windows)
        } else if tag.contains("linux") {
            Some(Self::Linux)
        } else {
            None
        }
    }

    /// Returns true if a package built for `tag` may be installed here.
    pub fn accepts(&self, tag: &str) -> bool {
        *self != Self::Other && Self::from_platform_tag(tag) == Some(*self)
    }

    /// Platform tag for this family on the given CPU architecture.
    pub fn platform_tag(&self, arch: &str) -> String {
        match self {
            Self::Windows => match arch {
                "x86_64" => "win_amd64".to_string(),
                "x86" => "win32".to_string(),
                "aarch64" => "win_arm64".to_string(),
                other => format!("win_{other}"),
            },
            Self::Linux => format!("linux_{arch}"),
            Self::MacOs => match arch {
                "aarch64" => "macosx_arm64".to_string(),
                other => format!("macosx_{other}"),
            },
            Self::Other => format!("{}_{arch}", std::env::consts::OS),
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Other => std::env::consts::OS,
        };
        f.write_str(name)
    }
}

/// Platform tag of the machine this binary runs on.
pub fn host_platform_tag() -> String {
    OsFamily::current().platform_tag(std::env::consts::ARCH)
}

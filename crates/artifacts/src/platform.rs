//! Platform model: OS distribution and CPU architecture.
//!
//! Catalog records are constrained by these two values. Both can be
//! detected from the running host or parsed from user input.
//!
//! # Example
//!
//! ```
//! use artifacts::platform::{detect_distribution, Distribution};
//!
//! let text = "ID=ubuntu\nVERSION_ID=\"20.04\"\nVERSION_CODENAME=focal\n";
//! assert_eq!(detect_distribution(text).unwrap(), Distribution::Focal);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A supported OS distribution release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Debian9,
    Debian10,
    Xenial,
    Bionic,
    Focal,
    Rhel7,
    Rhel8,
    Centos7,
    Centos8,
    AmazonLinux2,
    Flatcar,
    ContainerOS,
}

impl Distribution {
    /// Every supported distribution.
    #[must_use]
    pub fn all() -> &'static [Distribution] {
        use Distribution::*;
        &[
            Debian9,
            Debian10,
            Xenial,
            Bionic,
            Focal,
            Rhel7,
            Rhel8,
            Centos7,
            Centos8,
            AmazonLinux2,
            Flatcar,
            ContainerOS,
        ]
    }

    /// Lowercase identifier used in configuration and on the command line.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Debian9 => "debian9",
            Self::Debian10 => "debian10",
            Self::Xenial => "xenial",
            Self::Bionic => "bionic",
            Self::Focal => "focal",
            Self::Rhel7 => "rhel7",
            Self::Rhel8 => "rhel8",
            Self::Centos7 => "centos7",
            Self::Centos8 => "centos8",
            Self::AmazonLinux2 => "amazonlinux2",
            Self::Flatcar => "flatcar",
            Self::ContainerOS => "containeros",
        }
    }

    /// Debian and Ubuntu releases (dpkg/apt).
    #[must_use]
    pub fn is_debian_family(&self) -> bool {
        matches!(
            self,
            Self::Debian9 | Self::Debian10 | Self::Xenial | Self::Bionic | Self::Focal
        )
    }

    /// RHEL, CentOS, and Amazon Linux (rpm/yum).
    #[must_use]
    pub fn is_rhel_family(&self) -> bool {
        matches!(
            self,
            Self::Rhel7 | Self::Rhel8 | Self::Centos7 | Self::Centos8 | Self::AmazonLinux2
        )
    }

    /// Image-based distributions that ship the container runtime themselves.
    #[must_use]
    pub fn is_immutable_image(&self) -> bool {
        matches!(self, Self::Flatcar | Self::ContainerOS)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Distribution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| Error::UnknownDistribution(s.to_string()))
    }
}

/// A supported CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    /// Detect the architecture this binary was compiled for.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedPlatform` on anything but x86_64 and aarch64.
    pub fn detect() -> Result<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Ok(Self::Amd64),
            "aarch64" => Ok(Self::Arm64),
            arch => Err(Error::UnsupportedPlatform {
                os: std::env::consts::OS.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" => Ok(Self::Amd64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(Error::UnknownArchitecture(s.to_string())),
        }
    }
}

/// Parse `/etc/os-release` content into a distribution.
///
/// # Errors
///
/// Returns `Error::UnknownDistribution` naming the ID and version when the
/// release is not one we support.
pub fn detect_distribution(os_release: &str) -> Result<Distribution> {
    let fields = parse_os_release(os_release);
    let id = fields.get("ID").map(String::as_str).unwrap_or_default();
    let version = fields.get("VERSION_ID").map(String::as_str).unwrap_or_default();
    let codename = fields
        .get("VERSION_CODENAME")
        .map(String::as_str)
        .unwrap_or_default();
    let major = version.split('.').next().unwrap_or_default();

    let found = match (id, major) {
        ("debian", "9") => Some(Distribution::Debian9),
        ("debian", "10") => Some(Distribution::Debian10),
        ("ubuntu", _) => match (codename, version) {
            ("xenial", _) | (_, "16.04") => Some(Distribution::Xenial),
            ("bionic", _) | (_, "18.04") => Some(Distribution::Bionic),
            ("focal", _) | (_, "20.04") => Some(Distribution::Focal),
            _ => None,
        },
        ("centos", "7") => Some(Distribution::Centos7),
        ("centos", "8") => Some(Distribution::Centos8),
        ("rhel", "7") => Some(Distribution::Rhel7),
        ("rhel", "8") => Some(Distribution::Rhel8),
        ("amzn", "2") => Some(Distribution::AmazonLinux2),
        ("flatcar", _) => Some(Distribution::Flatcar),
        ("cos", _) => Some(Distribution::ContainerOS),
        _ => None,
    };

    found.ok_or_else(|| Error::UnknownDistribution(format!("{id} {version}").trim().to_string()))
}

fn parse_os_release(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| {
            let v = v.trim().trim_matches('"').trim_matches('\'');
            (k.trim().to_string(), v.to_string())
        })
        .collect()
}

//! Core types for artifact records.
//!
//! A record describes one concrete installable build of a piece of node
//! software, constrained to the distributions and architectures it applies
//! to. The serialized form is a stable schema other builders rely on.

use crate::platform::{Architecture, Distribution};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an artifact is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMechanism {
    /// A .deb or .rpm handed to the distribution's package manager.
    ManagedPackage,
    /// A tarball extracted into place.
    PlainArchive,
}

impl fmt::Display for InstallMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManagedPackage => write!(f, "package"),
            Self::PlainArchive => write!(f, "archive"),
        }
    }
}

/// An additional package installed alongside a managed-package record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraPackage {
    pub name: String,
    pub version: String,
    pub source: String,
    pub hash: String,
}

/// A remediation step run after the install completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PostInstallAction {
    /// Set the immutable attribute so later package operations cannot
    /// replace the file.
    MarkImmutable { path: String },
}

/// One installable build of a piece of node software.
///
/// An empty distribution or architecture list applies to all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Logical component name, e.g. "containerd.io".
    pub name: String,
    /// Version tag users ask for, e.g. "1.2.10".
    pub requested_version: String,
    /// Concrete package version, e.g. "1.2.10-3". Absent for archives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concrete_version: Option<String>,
    #[serde(default)]
    pub distributions: Vec<Distribution>,
    #[serde(default)]
    pub architectures: Vec<Architecture>,
    pub mechanism: InstallMechanism,
    pub source: String,
    /// Hex SHA-1 or SHA-256 of the source.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_packages: Vec<ExtraPackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_install: Vec<PostInstallAction>,
    /// Plain OS packages required by this build.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os_dependencies: Vec<String>,
}

impl ArtifactRecord {
    /// A managed package record.
    pub fn package(
        name: impl Into<String>,
        requested_version: impl Into<String>,
        concrete_version: impl Into<String>,
        source: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            requested_version: requested_version.into(),
            concrete_version: Some(concrete_version.into()),
            distributions: Vec::new(),
            architectures: Vec::new(),
            mechanism: InstallMechanism::ManagedPackage,
            source: source.into(),
            hash: hash.into(),
            extra_packages: Vec::new(),
            post_install: Vec::new(),
            os_dependencies: Vec::new(),
        }
    }

    /// A plain archive record.
    pub fn archive(
        name: impl Into<String>,
        requested_version: impl Into<String>,
        source: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            requested_version: requested_version.into(),
            concrete_version: None,
            distributions: Vec::new(),
            architectures: Vec::new(),
            mechanism: InstallMechanism::PlainArchive,
            source: source.into(),
            hash: hash.into(),
            extra_packages: Vec::new(),
            post_install: Vec::new(),
            os_dependencies: Vec::new(),
        }
    }

    /// Restrict to these distributions.
    pub fn for_distributions(mut self, distributions: &[Distribution]) -> Self {
        self.distributions = distributions.to_vec();
        self
    }

    /// Restrict to these architectures.
    pub fn for_architectures(mut self, architectures: &[Architecture]) -> Self {
        self.architectures = architectures.to_vec();
        self
    }

    /// Add a package installed alongside this one.
    pub fn with_extra_package(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        source: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        self.extra_packages.push(ExtraPackage {
            name: name.into(),
            version: version.into(),
            source: source.into(),
            hash: hash.into(),
        });
        self
    }

    /// Add a post-install action.
    pub fn with_post_install(mut self, action: PostInstallAction) -> Self {
        self.post_install.push(action);
        self
    }

    /// Add a plain OS package dependency.
    pub fn with_os_dependency(mut self, name: impl Into<String>) -> Self {
        self.os_dependencies.push(name.into());
        self
    }

    /// Whether this record applies to the given platform and version.
    #[must_use]
    pub fn matches(
        &self,
        distribution: Distribution,
        architecture: Architecture,
        version: &str,
    ) -> bool {
        self.requested_version == version
            && (self.distributions.is_empty() || self.distributions.contains(&distribution))
            && (self.architectures.is_empty() || self.architectures.contains(&architecture))
    }

    /// Version to report for an install: concrete if known, else requested.
    #[must_use]
    pub fn version(&self) -> &str {
        self.concrete_version
            .as_deref()
            .unwrap_or(&self.requested_version)
    }

    /// File name component of the source URL.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.source.rsplit('/').next().unwrap_or(&self.source)
    }
}

//! Artifact catalog and the selection algorithm.
//!
//! Selection is inclusive: every record whose constraints are satisfied
//! for the requested version is returned, in catalog order. Some
//! distributions need several artifacts to realize one logical install.

use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::platform::{Architecture, Distribution};
use crate::types::ArtifactRecord;
use serde::{Deserialize, Serialize};

/// Immutable table of artifact records.
///
/// Build one at startup and pass it by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    records: Vec<ArtifactRecord>,
}

impl Catalog {
    #[must_use]
    pub fn new(records: Vec<ArtifactRecord>) -> Self {
        Self { records }
    }

    /// Load a catalog from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEntry` if the document does not parse or any
    /// entry fails [`Catalog::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json).map_err(|e| Error::InvalidEntry {
            name: "<catalog>".to_string(),
            version: String::new(),
            reason: e.to_string(),
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// All records, in catalog order.
    #[must_use]
    pub fn records(&self) -> &[ArtifactRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record applicable to this platform and version.
    ///
    /// Pure: the same inputs always yield the same records in the same order.
    /// An empty result means no artifact exists for this combination; the
    /// caller decides whether that is fatal.
    #[must_use]
    pub fn select(
        &self,
        distribution: Distribution,
        architecture: Architecture,
        version: &str,
    ) -> Vec<&ArtifactRecord> {
        self.records
            .iter()
            .filter(|r| r.matches(distribution, architecture, version))
            .collect()
    }

    /// Like [`Catalog::select`], for callers that require at least one match.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoMatchingArtifact` when nothing matches.
    pub fn select_required(
        &self,
        distribution: Distribution,
        architecture: Architecture,
        version: &str,
    ) -> Result<Vec<&ArtifactRecord>> {
        let selected = self.select(distribution, architecture, version);
        if selected.is_empty() {
            return Err(Error::NoMatchingArtifact {
                distribution: distribution.to_string(),
                architecture: architecture.to_string(),
                version: version.to_string(),
            });
        }
        Ok(selected)
    }

    /// Distinct requested versions, in catalog order.
    #[must_use]
    pub fn versions(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for r in &self.records {
            if !seen.contains(&r.requested_version.as_str()) {
                seen.push(&r.requested_version);
            }
        }
        seen
    }

    /// Check every entry has a source and a well-formed hash.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEntry` for the first bad entry.
    pub fn validate(&self) -> Result<()> {
        for r in &self.records {
            let invalid = |reason: String| Error::InvalidEntry {
                name: r.name.clone(),
                version: r.requested_version.clone(),
                reason,
            };

            if r.source.trim().is_empty() {
                return Err(invalid("missing source".to_string()));
            }
            ContentHash::parse(&r.hash).map_err(|e| invalid(e.to_string()))?;

            for extra in &r.extra_packages {
                if extra.source.trim().is_empty() {
                    return Err(invalid(format!("extra package {} has no source", extra.name)));
                }
                ContentHash::parse(&extra.hash)
                    .map_err(|e| invalid(format!("extra package {}: {e}", extra.name)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostInstallAction;

    const SHA1_A: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
    const SHA1_B: &str = "f572d396fae9206628714fb2ce00f72e94f2258f";

    fn catalog() -> Catalog {
        Catalog::new(vec![
            ArtifactRecord::package("c", "1.0", "1.0-1", "https://x/c-deb9.deb", SHA1_A)
                .for_distributions(&[Distribution::Debian9]),
            ArtifactRecord::package("c", "1.0", "1.0-2", "https://x/c-el7.rpm", SHA1_A)
                .for_distributions(&[Distribution::Centos7, Distribution::Rhel7])
                .with_extra_package("selinux", "2.5", "https://x/selinux.rpm", SHA1_B)
                .with_post_install(PostInstallAction::MarkImmutable {
                    path: "/usr/bin/runc".into(),
                }),
            ArtifactRecord::package("companion", "1.0", "1.0", "https://x/comp.rpm", SHA1_B)
                .for_distributions(&[Distribution::Centos7]),
            ArtifactRecord::archive("c", "1.1", "https://x/c-1.1.tgz", SHA1_B)
                .for_architectures(&[Architecture::Amd64]),
        ])
    }

    #[test]
    fn test_select_is_inclusive() {
        let c = catalog();
        let selected = c.select(Distribution::Centos7, Architecture::Amd64, "1.0");
        let names: Vec<_> = selected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["c", "companion"]);

        let rhel = c.select(Distribution::Rhel7, Architecture::Amd64, "1.0");
        assert_eq!(rhel.len(), 1);
    }

    #[test]
    fn test_select_is_pure() {
        let c = catalog();
        for d in Distribution::all() {
            for a in [Architecture::Amd64, Architecture::Arm64] {
                for v in ["1.0", "1.1", "9.9"] {
                    assert_eq!(c.select(*d, a, v), c.select(*d, a, v));
                }
            }
        }
    }

    #[test]
    fn test_absent_version_is_empty_not_error() {
        let c = catalog();
        assert!(c.select(Distribution::Debian9, Architecture::Amd64, "9.9").is_empty());
        assert!(matches!(
            c.select_required(Distribution::Debian9, Architecture::Amd64, "9.9"),
            Err(Error::NoMatchingArtifact { .. })
        ));
    }

    #[test]
    fn test_architecture_constraint() {
        let c = catalog();
        assert_eq!(c.select(Distribution::Focal, Architecture::Amd64, "1.1").len(), 1);
        assert!(c.select(Distribution::Focal, Architecture::Arm64, "1.1").is_empty());
    }

    #[test]
    fn test_versions_in_catalog_order() {
        assert_eq!(catalog().versions(), ["1.0", "1.1"]);
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        catalog().validate().unwrap();

        let bad_hash = Catalog::new(vec![ArtifactRecord::archive("c", "1", "https://x", "xyz")]);
        assert!(matches!(bad_hash.validate(), Err(Error::InvalidEntry { .. })));

        let no_source = Catalog::new(vec![ArtifactRecord::archive("c", "1", " ", SHA1_A)]);
        assert!(no_source.validate().is_err());

        let bad_extra = Catalog::new(vec![
            ArtifactRecord::package("c", "1", "1-1", "https://x", SHA1_A)
                .with_extra_package("e", "1", "https://y", "nope"),
        ]);
        assert!(bad_extra.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_order() {
        let c = catalog();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(Catalog::from_json(&json).unwrap(), c);
    }
}

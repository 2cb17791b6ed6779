//! # artifacts
//!
//! Catalog of installable node software and verified downloads.
//!
//! This crate provides:
//! - A static catalog of artifact records constrained by distribution and
//!   architecture
//! - Inclusive selection: every record that applies is returned
//! - Platform detection from `/etc/os-release` and the compile target
//! - Hash-verified, cached artifact fetch with retry
//!
//! ## Example
//!
//! ```
//! use artifacts::{ArtifactRecord, Architecture, Catalog, Distribution};
//!
//! let catalog = Catalog::new(vec![
//!     ArtifactRecord::package(
//!         "containerd.io",
//!         "1.2.4",
//!         "1.2.4-1",
//!         "https://download.docker.com/linux/debian/dists/stretch/pool/stable/amd64/containerd.io_1.2.4-1_amd64.deb",
//!         "48c6ab0c908316af9a183de5aad64703bc516bdf",
//!     )
//!     .for_distributions(&[Distribution::Debian9])
//!     .for_architectures(&[Architecture::Amd64]),
//! ]);
//!
//! let selected = catalog.select(Distribution::Debian9, Architecture::Amd64, "1.2.4");
//! assert_eq!(selected.len(), 1);
//! assert!(catalog.select(Distribution::Focal, Architecture::Amd64, "1.2.4").is_empty());
//! ```

pub mod catalog;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod platform;
pub mod retry;
pub mod types;

pub use catalog::Catalog;
pub use error::{Error, ErrorCategory, Result};
pub use fetch::{ArtifactStore, Fetcher, HttpFetcher, MockFetcher};
pub use hash::{ContentHash, HashAlgorithm};
pub use platform::{Architecture, Distribution, detect_distribution};
pub use retry::{RetryConfig, with_retry};
pub use types::{ArtifactRecord, ExtraPackage, InstallMechanism, PostInstallAction};

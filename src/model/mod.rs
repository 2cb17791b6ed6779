//! Node model and the builders that turn it into tasks

pub mod catalog;
pub mod containerd;
pub mod packages;

pub use containerd::ContainerdBuilder;
pub use packages::PackagesBuilder;

use crate::schema::NodeConfig;
use crate::tasks::PackageManager;
use artifacts::{Architecture, ArtifactStore, Catalog, Distribution};
use converge::ModelBuilder;
use std::sync::Arc;

/// Everything builders are allowed to look at
///
/// Read-only for the whole run.
#[derive(Debug)]
pub struct NodeModel {
    pub config: NodeConfig,
    pub distribution: Distribution,
    pub architecture: Architecture,
    /// Installable containerd builds
    pub catalog: Catalog,
    /// Where download-backed tasks fetch from
    pub store: Arc<ArtifactStore>,
}

impl NodeModel {
    pub fn package_manager(&self) -> Option<PackageManager> {
        PackageManager::for_distribution(self.distribution)
    }
}

/// Every builder that contributes to a node, in registration order
pub fn builders() -> Vec<Box<dyn ModelBuilder<NodeModel>>> {
    vec![Box::new(PackagesBuilder), Box::new(ContainerdBuilder)]
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use artifacts::MockFetcher;

    /// A model backed by an empty in-memory fetcher
    pub(crate) fn model(config: NodeConfig, distribution: Distribution) -> NodeModel {
        model_with(config, distribution, catalog::containerd_catalog())
    }

    pub(crate) fn model_with(
        config: NodeConfig,
        distribution: Distribution,
        catalog: Catalog,
    ) -> NodeModel {
        let store = ArtifactStore::new("/nonexistent/cache", Box::new(MockFetcher::new()));
        NodeModel {
            config,
            distribution,
            architecture: Architecture::Amd64,
            catalog,
            store: Arc::new(store),
        }
    }

    /// A config selecting a containerd version
    pub(crate) fn containerd_config(version: &str) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.cluster.container_runtime = "containerd".to_string();
        let mut containerd = crate::schema::ContainerdConfig::default();
        containerd.version = Some(version.to_string());
        config.cluster.containerd = Some(containerd);
        config
    }
}

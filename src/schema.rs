//! Node configuration schema
//!
//! Loaded from TOML or JSON. Keys are camelCase in both formats:
//!
//! ```toml
//! [cluster]
//! containerRuntime = "containerd"
//!
//! [cluster.containerd]
//! version = "1.3.4"
//! logLevel = "info"
//!
//! [cluster.networking.kubenet]
//!
//! [packages]
//! extra = ["nfs-common"]
//! ```

use serde::{Deserialize, Serialize};

/// Root of a node configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default)]
    pub cluster: ClusterSpec,
    #[serde(default)]
    pub packages: PackagesSpec,
}

/// Cluster-wide settings that affect this node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// "containerd" or "docker"
    #[serde(default)]
    pub container_runtime: String,
    /// Absent means the default empty configuration
    #[serde(default)]
    pub containerd: Option<ContainerdConfig>,
    #[serde(default)]
    pub networking: Option<NetworkingSpec>,
}

impl ClusterSpec {
    /// containerd settings, or the empty default when none were given
    pub fn containerd(&self) -> ContainerdConfig {
        self.containerd.clone().unwrap_or_default()
    }

    pub fn uses_kubenet(&self) -> bool {
        self.networking
            .as_ref()
            .is_some_and(|n| n.kubenet.is_some())
    }
}

/// containerd daemon settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerdConfig {
    /// Address of the containerd socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Complete replacement for the containerd config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// containerd persistent state directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Leave containerd entirely to the image
    #[serde(default)]
    pub skip_install: bool,
    /// containerd runtime state directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Pod networking provider, one field set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubenet: Option<KubenetSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni: Option<CniSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubenetSpec {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CniSpec {}

/// OS packages beyond the distribution base set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagesSpec {
    #[serde(default)]
    pub extra: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config: NodeConfig = toml::from_str(
            r#"
            [cluster]
            containerRuntime = "containerd"

            [cluster.containerd]
            version = "1.3.4"
            configOverride = "version = 2"
            skipInstall = false

            [cluster.networking.kubenet]

            [packages]
            extra = ["nfs-common"]
            "#,
        )
        .unwrap();

        let containerd = config.cluster.containerd();
        assert_eq!(containerd.version.as_deref(), Some("1.3.4"));
        assert_eq!(containerd.config_override.as_deref(), Some("version = 2"));
        assert!(config.cluster.uses_kubenet());
        assert_eq!(config.packages.extra, ["nfs-common"]);
    }

    #[test]
    fn test_absent_sections_default_to_empty() {
        let config: NodeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.cluster.containerd(), ContainerdConfig::default());
        assert!(!config.cluster.uses_kubenet());
        assert!(config.packages.extra.is_empty());
    }

    #[test]
    fn test_cni_is_not_kubenet() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"cluster": {"networking": {"cni": {}}}}"#).unwrap();
        assert!(!config.cluster.uses_kubenet());
    }
}

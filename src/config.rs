use crate::schema::NodeConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the node configuration lives unless told otherwise
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nodeup/nodeup.toml";

/// Downloaded artifacts are cached here on a real node
pub const NODE_CACHE_DIR: &str = "/var/cache/nodeup";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported config format for {} (expected .toml or .json)", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Config file format, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

/// Load a node configuration file
pub fn load(path: &Path) -> Result<NodeConfig, ConfigError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("loaded config from {}", path.display());
    parse(&content, format, path)
}

/// Parse configuration text in the given format
pub fn parse(content: &str, format: ConfigFormat, path: &Path) -> Result<NodeConfig, ConfigError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Default artifact cache for a filesystem root
///
/// Converging the real root caches under /var/cache; converging an
/// alternate root (a chroot or image build) uses the invoking user's cache.
pub fn default_cache_dir(root: &Path) -> PathBuf {
    if root == Path::new("/") {
        return PathBuf::from(NODE_CACHE_DIR);
    }
    dirs::cache_dir()
        .map(|d| d.join("nodeup"))
        .unwrap_or_else(|| root.join(NODE_CACHE_DIR.trim_start_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("/etc/nodeup/nodeup.toml")),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("node.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("node.yaml")), None);
        assert_eq!(ConfigFormat::from_path(Path::new("node")), None);
    }

    #[test]
    fn test_load_json_and_toml_agree() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("node.toml");
        let json_path = dir.path().join("node.json");
        fs::write(
            &toml_path,
            "[cluster]\ncontainerRuntime = \"containerd\"\n[cluster.containerd]\nversion = \"1.2.10\"\n",
        )
        .unwrap();
        fs::write(
            &json_path,
            r#"{"cluster": {"containerRuntime": "containerd", "containerd": {"version": "1.2.10"}}}"#,
        )
        .unwrap();

        assert_eq!(load(&toml_path).unwrap(), load(&json_path).unwrap());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("node.yaml");
        assert!(matches!(load(&yaml), Err(ConfigError::UnsupportedFormat { .. })));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(load(&missing), Err(ConfigError::Read { .. })));

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[cluster\n").unwrap();
        let err = load(&broken).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_cache_dir_for_real_root() {
        assert_eq!(default_cache_dir(Path::new("/")), PathBuf::from(NODE_CACHE_DIR));
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_path("~/node.toml");
        assert!(!expanded.to_string_lossy().starts_with('~') || dirs::home_dir().is_none());
    }
}

//! Daemon command-line flags built from configuration

use crate::schema::ContainerdConfig;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlagError {
    #[error("value for --{flag} contains a line break")]
    LineBreak { flag: String },
}

/// A set of `--name=value` flags, rendered sorted by name
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    flags: BTreeMap<String, String>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string flag; `None` and empty values are omitted
    pub fn string(&mut self, name: &str, value: Option<&str>) -> Result<&mut Self, FlagError> {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            if value.contains(['\n', '\r']) {
                return Err(FlagError::LineBreak {
                    flag: name.to_string(),
                });
            }
            self.flags.insert(name.to_string(), value.to_string());
        }
        Ok(self)
    }

    /// Space-separated flags in name order
    pub fn build(&self) -> String {
        self.flags
            .iter()
            .map(|(k, v)| format!("--{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Flags for the containerd daemon
///
/// Version, config override, and skip-install drive installation rather
/// than the daemon, so they never become flags.
pub fn containerd_flags(config: &ContainerdConfig) -> Result<String, FlagError> {
    let mut flags = FlagSet::new();
    flags
        .string("address", config.address.as_deref())?
        .string("log-level", config.log_level.as_deref())?
        .string("root", config.root.as_deref())?
        .string("state", config.state.as_deref())?;
    Ok(flags.build())
}

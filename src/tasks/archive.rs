//! Archive task - extract a verified tarball into place
//!
//! With no `map_files` the whole archive is extracted into `target_dir`.
//! Otherwise it is extracted into a staging directory and each mapped
//! subdirectory is copied into its destination, keeping its own name:
//! `./usr/local/bin` mapped to `/usr` lands in `/usr/bin`.

use super::digest;
use anyhow::{Context, Result, bail};
use artifacts::ArtifactStore;
use converge::{ApplyContext, ApplyResult, Task, TaskId, TaskState};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

pub const KIND: &str = "Archive";

/// Installed archives are recorded here, one JSON file per name
pub const STATE_DIR: &str = "/var/lib/nodeup/archives";

const STAGING_DIR: &str = "/var/cache/nodeup/extract";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    pub name: String,
    pub source: String,
    pub hash: String,
    pub target_dir: String,
    /// Archive subpath to the directory it is copied into
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub map_files: BTreeMap<String, String>,
    #[serde(skip)]
    store: Option<Arc<ArtifactStore>>,
}

/// What was last extracted under a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Installed {
    source: String,
    hash: String,
    target_dir: String,
    #[serde(default)]
    map_files: BTreeMap<String, String>,
}

impl Installed {
    fn details(&self) -> String {
        let file = self.source.rsplit('/').next().unwrap_or(&self.source);
        let fingerprint = serde_json::to_vec(self).unwrap_or_default();
        format!("{} ({})", file, digest(&fingerprint))
    }
}

impl Archive {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        hash: impl Into<String>,
        target_dir: impl Into<String>,
        store: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            hash: hash.into(),
            target_dir: target_dir.into(),
            map_files: BTreeMap::new(),
            store: Some(store),
        }
    }

    pub fn map_file(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.map_files.insert(from.into(), to.into());
        self
    }

    fn record(&self) -> Installed {
        Installed {
            source: self.source.clone(),
            hash: self.hash.clone(),
            target_dir: self.target_dir.clone(),
            map_files: self.map_files.clone(),
        }
    }

    fn state_path(&self) -> String {
        format!("{STATE_DIR}/{}.json", self.name)
    }
}

impl Task for Archive {
    fn id(&self) -> TaskId {
        TaskId::new(KIND, &self.name)
    }

    fn description(&self) -> String {
        format!("Extract {} into {}", self.name, self.target_dir)
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<TaskState> {
        let path = ctx.host_path(self.state_path());
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TaskState::Absent),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let installed: Installed = serde_json::from_str(&data)
            .with_context(|| format!("Corrupt archive state {}", path.display()))?;
        Ok(TaskState::Present {
            details: Some(installed.details()),
        })
    }

    fn desired_state(&self) -> TaskState {
        TaskState::Present {
            details: Some(self.record().details()),
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let store = self
            .store
            .as_ref()
            .with_context(|| format!("no artifact store to download {}", self.name))?;
        let bytes = store
            .fetch_bytes(&self.source, &self.hash)
            .with_context(|| format!("Failed to download {}", self.name))?;

        let state_path = ctx.host_path(self.state_path());
        let existed = state_path.exists();

        if self.map_files.is_empty() {
            unpack(&bytes, &ctx.host_path(&self.target_dir))?;
        } else {
            let staging = ctx.host_path(STAGING_DIR).join(&self.name);
            if staging.exists() {
                fs::remove_dir_all(&staging)
                    .with_context(|| format!("Failed to clear {}", staging.display()))?;
            }
            unpack(&bytes, &staging)?;

            for (from, to) in &self.map_files {
                let src = staging.join(from.trim_start_matches("./"));
                if !src.exists() {
                    bail!("{} has no {}", self.name, from);
                }
                let name = src
                    .file_name()
                    .with_context(|| format!("cannot map {from}"))?;
                let dest = ctx.host_path(to).join(name);
                log::debug!("copying {} to {}", from, dest.display());
                copy_tree(&src, &dest)?;
            }

            fs::remove_dir_all(&staging)
                .with_context(|| format!("Failed to clear {}", staging.display()))?;
        }

        let record = serde_json::to_string_pretty(&self.record())?;
        super::write_atomic(&state_path, record.as_bytes(), 0o644)?;

        log::info!("extracted {} ({})", self.name, self.source);
        Ok(if existed {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }
}

/// Extract a gzipped tarball into `dir`
fn unpack(data: &[u8], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    archive.set_preserve_permissions(true);
    archive
        .unpack(dir)
        .with_context(|| format!("Failed to extract into {}", dir.display()))
}

/// Copy a file or directory tree, replacing files by rename
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = if rel.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(rel)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            continue;
        }

        let tmp = target.with_extension("nodeup-tmp");
        fs::copy(entry.path(), &tmp)
            .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        fs::rename(&tmp, &target)
            .with_context(|| format!("Failed to replace {}", target.display()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let link = fs::read_link(src)?;
    if fs::symlink_metadata(dest).is_ok() {
        fs::remove_file(dest)?;
    }
    std::os::unix::fs::symlink(&link, dest)
        .with_context(|| format!("Failed to link {}", dest.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dest: &Path) -> Result<()> {
    log::warn!("skipping symlink {}", src.display());
    Ok(())
}

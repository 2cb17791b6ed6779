//! Node task kinds
//!
//! Each task converges one piece of host state: a file, a package, an
//! extracted archive, a file attribute, or a systemd service. All paths are
//! absolute node paths, resolved under the apply context's root.

pub mod archive;
pub mod chattr;
pub mod file;
pub mod package;
pub mod service;

pub use archive::Archive;
pub use chattr::Chattr;
pub use file::File;
pub use package::{Package, PackageManager};
pub use service::Service;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Short content digest used in state details
pub fn digest(bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes).to_hex();
    hash.as_str()[..16].to_string()
}

/// Serialize a permission mode as an octal string like "0644"
pub fn serialize_mode<S: serde::Serializer>(mode: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{mode:04o}"))
}

#[cfg(unix)]
pub fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
pub fn file_mode(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o644 }
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Write a file by renaming a sibling temporary into place
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.nodeup-tmp"));
    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    set_mode(&tmp, mode)?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serializes_as_octal() {
        #[derive(serde::Serialize)]
        struct M {
            #[serde(serialize_with = "serialize_mode")]
            mode: u32,
        }
        let json = serde_json::to_value(M { mode: 0o644 }).unwrap();
        assert_eq!(json["mode"], "0644");
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest(b"abc"), digest(b"abc"));
        assert_ne!(digest(b"abc"), digest(b"abd"));
        assert_eq!(digest(b"").len(), 16);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/sysconfig/containerd");
        write_atomic(&path, b"CONTAINERD_OPTS=", 0o600).unwrap();

        let meta = fs::metadata(&path).unwrap();
        assert_eq!(file_mode(&meta), 0o600);
        assert_eq!(fs::read(&path).unwrap(), b"CONTAINERD_OPTS=");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}

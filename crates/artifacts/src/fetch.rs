//! Artifact download with content verification.
//!
//! Bytes are verified against the catalog hash before they are written to
//! the cache, and again when a cached copy is reused. A cached file that no
//! longer matches is downloaded again.
//!
//! # Testing
//!
//! Use [`MockFetcher`] to serve artifacts from memory:
//!
//! ```
//! use artifacts::fetch::{Fetcher, MockFetcher};
//!
//! let mock = MockFetcher::new().with("https://example.com/a.tgz", b"data".to_vec());
//! assert_eq!(mock.fetch("https://example.com/a.tgz").unwrap(), b"data");
//! ```

use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::retry::{RetryConfig, with_retry};
use crate::types::ArtifactRecord;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Maximum download size (containerd tarballs are ~30 MB).
const MAX_BODY_SIZE: u64 = 512 * 1024 * 1024;

const USER_AGENT: &str = concat!("nodeup/", env!("CARGO_PKG_VERSION"));

/// Source of artifact bytes.
pub trait Fetcher: Send + Sync {
    /// Fetch the full body at `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetcher over HTTP(S), with `file://` for local mirrors.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            return fs::read(path).map_err(|e| Error::io(path, e));
        }

        log::debug!("GET {}", url);
        let mut response = self.agent.get(url).header("User-Agent", USER_AGENT).call()?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| Error::DownloadFailed {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

/// In-memory fetcher for tests.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    responses: HashMap<String, Vec<u8>>,
    requests: Arc<AtomicUsize>,
}

impl MockFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    #[must_use]
    pub fn with(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.responses.insert(url.into(), body);
        self
    }

    /// Number of fetches made so far, across clones.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| Error::http(format!("HTTP 404 for {url}"), Some(404)))
    }
}

/// Download cache keyed by content hash.
pub struct ArtifactStore {
    cache_dir: PathBuf,
    fetcher: Box<dyn Fetcher>,
    retry: RetryConfig,
}

impl fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("cache_dir", &self.cache_dir)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ArtifactStore {
    pub fn new(cache_dir: impl Into<PathBuf>, fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher,
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where a source with this hash is cached.
    #[must_use]
    pub fn cached_path(&self, source: &str, hash: &str) -> PathBuf {
        let file_name = source.rsplit('/').next().unwrap_or("artifact");
        let file_name = if file_name.is_empty() { "artifact" } else { file_name };
        self.cache_dir.join(hash.to_ascii_lowercase()).join(file_name)
    }

    /// Ensure a verified copy of `source` is cached and return its path.
    ///
    /// # Errors
    ///
    /// Fails on a malformed hash, a download error that survives retries,
    /// a hash mismatch, or a cache write error.
    pub fn fetch(&self, source: &str, hash: &str) -> Result<PathBuf> {
        let expected = ContentHash::parse(hash)?;
        let path = self.cached_path(source, hash);

        if path.exists() {
            let cached = fs::read(&path).map_err(|e| Error::io(&path, e))?;
            if expected.verify(source, &cached).is_ok() {
                log::debug!("using cached {}", path.display());
                return Ok(path);
            }
            log::warn!("cached {} does not match its hash, downloading again", path.display());
        }

        let bytes = with_retry(&self.retry, source, || self.fetcher.fetch(source))?;
        expected.verify(source, &bytes)?;

        let dir = path.parent().unwrap_or(&self.cache_dir);
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let partial = path.with_extension("partial");
        fs::write(&partial, &bytes).map_err(|e| Error::io(&partial, e))?;
        fs::rename(&partial, &path).map_err(|e| Error::io(&path, e))?;

        log::info!("downloaded {} ({} bytes)", source, bytes.len());
        Ok(path)
    }

    /// Fetch and return verified bytes.
    pub fn fetch_bytes(&self, source: &str, hash: &str) -> Result<Vec<u8>> {
        let path = self.fetch(source, hash)?;
        fs::read(&path).map_err(|e| Error::io(&path, e))
    }

    /// Fetch the primary source of a catalog record.
    pub fn fetch_record(&self, record: &ArtifactRecord) -> Result<PathBuf> {
        self.fetch(&record.source, &record.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    const URL: &str = "https://example.com/containerd.tgz";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay: std::time::Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: std::time::Duration::from_millis(1),
        }
    }

    #[test]
    fn test_fetch_verifies_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockFetcher::new().with(URL, b"hello".to_vec());
        let store = ArtifactStore::new(dir.path(), Box::new(mock.clone())).with_retry(fast());

        let path = store.fetch(URL, HELLO_SHA256).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(path.ends_with("containerd.tgz"));

        store.fetch(URL, HELLO_SHA256).unwrap();
        assert_eq!(mock.requests(), 1);
    }

    #[test]
    fn test_corrupt_cache_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockFetcher::new().with(URL, b"hello".to_vec());
        let store = ArtifactStore::new(dir.path(), Box::new(mock.clone())).with_retry(fast());

        let path = store.cached_path(URL, HELLO_SHA256);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"tampered").unwrap();

        assert_eq!(store.fetch_bytes(URL, HELLO_SHA256).unwrap(), b"hello");
        assert_eq!(mock.requests(), 1);
    }

    #[test]
    fn test_mismatch_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockFetcher::new().with(URL, b"goodbye".to_vec());
        let store = ArtifactStore::new(dir.path(), Box::new(mock)).with_retry(fast());

        let err = store.fetch(URL, HELLO_SHA256).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Integrity);
        assert!(!store.cached_path(URL, HELLO_SHA256).exists());
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockFetcher::new();
        let store = ArtifactStore::new(dir.path(), Box::new(mock.clone())).with_retry(fast());

        let err = store.fetch(URL, HELLO_SHA256).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(mock.requests(), 1);
    }

    #[test]
    fn test_file_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.deb");
        fs::write(&local, b"hello").unwrap();

        let body = HttpFetcher::new()
            .fetch(&format!("file://{}", local.display()))
            .unwrap();
        assert_eq!(body, b"hello");
    }
}

//! Package task - install an OS package or a downloaded .deb/.rpm

use anyhow::{Context, Result, bail};
use artifacts::{ArtifactStore, Distribution};
use converge::{ApplyContext, ApplyResult, Task, TaskId, TaskSet, TaskState};
use serde::Serialize;
use std::iter;
use std::sync::Arc;

pub const KIND: &str = "Package";

const DPKG_QUERY_FORMAT: &str = "${db:Status-Abbrev}${Version}\n";
const RPM_QUERY_FORMAT: &str = "%{VERSION}-%{RELEASE}";

/// Package manager family of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Yum,
}

impl PackageManager {
    /// `None` for image-based distributions with no package manager
    pub fn for_distribution(distribution: Distribution) -> Option<Self> {
        if distribution.is_debian_family() {
            Some(Self::Apt)
        } else if distribution.is_rhel_family() {
            Some(Self::Yum)
        } else {
            None
        }
    }
}

/// A package, optionally pinned and optionally installed from a URL
///
/// A package with a source is a "bare" package: its file is downloaded,
/// verified, and handed to the package manager together with its `deps`
/// in one transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub manager: PackageManager,
    /// Keep the package's service from starting during install
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub prevent_start: bool,
    /// Installed in the same transaction, before this package
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<Package>,
    #[serde(skip)]
    store: Option<Arc<ArtifactStore>>,
}

impl Package {
    /// A package from the distribution's repositories
    pub fn os(name: impl Into<String>, manager: PackageManager) -> Self {
        Self {
            name: name.into(),
            version: None,
            source: None,
            hash: None,
            manager,
            prevent_start: false,
            deps: Vec::new(),
            store: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Install from a downloaded file, verified against `hash`
    pub fn with_source(
        mut self,
        source: impl Into<String>,
        hash: impl Into<String>,
        store: Arc<ArtifactStore>,
    ) -> Self {
        self.source = Some(source.into());
        self.hash = Some(hash.into());
        self.store = Some(store);
        self
    }

    pub fn preventing_start(mut self) -> Self {
        self.prevent_start = true;
        self
    }

    pub fn with_dep(mut self, dep: Package) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn is_bare(&self) -> bool {
        self.source.is_some()
    }

    fn installed_version(&self, ctx: &ApplyContext, name: &str) -> Result<Option<String>> {
        match self.manager {
            PackageManager::Apt => {
                let out = ctx
                    .runner
                    .run("dpkg-query", &["-f", DPKG_QUERY_FORMAT, "-W", name])?;
                if !out.success {
                    return Ok(None);
                }
                let stdout = out.stdout_str();
                let line = stdout.lines().next().unwrap_or_default();
                Ok(line.strip_prefix("ii ").map(|v| v.trim().to_string()))
            }
            PackageManager::Yum => {
                let out = ctx
                    .runner
                    .run("rpm", &["-q", "--queryformat", RPM_QUERY_FORMAT, name])?;
                let version = out.stdout_str().trim().to_string();
                Ok((out.success && !version.is_empty()).then_some(version))
            }
        }
    }

    fn all(&self) -> impl Iterator<Item = &Package> {
        self.deps.iter().chain(iter::once(self))
    }

    fn wanted(pkg: &Package) -> String {
        match &pkg.version {
            Some(v) => format!("{} {}", pkg.name, v),
            None => format!("{} installed", pkg.name),
        }
    }

    /// Name spec for installing from a repository
    fn spec(&self) -> String {
        match (&self.version, self.manager) {
            (Some(v), PackageManager::Apt) => format!("{}={}", self.name, v),
            (Some(v), PackageManager::Yum) => format!("{}-{}", self.name, v),
            (None, _) => self.name.clone(),
        }
    }
}

/// Whether an installed version satisfies a wanted one
///
/// "1.2.10" is satisfied by "1.2.10" and by "1.2.10-3.2.el7".
pub fn version_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with('-'))
}

impl Task for Package {
    fn id(&self) -> TaskId {
        TaskId::new(KIND, &self.name)
    }

    fn description(&self) -> String {
        match &self.version {
            Some(v) => format!("Install package {} {}", self.name, v),
            None => format!("Install package {}", self.name),
        }
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Bare packages install after every repository package
    fn infer_ordering(&self, tasks: &TaskSet) -> Vec<TaskId> {
        if !self.is_bare() {
            return Vec::new();
        }
        tasks
            .of_type::<Package>()
            .filter(|(_, p)| !p.is_bare())
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<TaskState> {
        let mut parts = Vec::new();
        for pkg in self.all() {
            let installed = self.installed_version(ctx, &pkg.name)?;
            let part = match (installed, &pkg.version) {
                (None, _) if pkg.name == self.name => return Ok(TaskState::Absent),
                (None, _) => format!("{} absent", pkg.name),
                (Some(_), None) => format!("{} installed", pkg.name),
                (Some(have), Some(want)) if version_matches(&have, want) => {
                    format!("{} {}", pkg.name, want)
                }
                (Some(have), Some(_)) => format!("{} {}", pkg.name, have),
            };
            parts.push(part);
        }
        Ok(TaskState::Present {
            details: Some(parts.join(", ")),
        })
    }

    fn desired_state(&self) -> TaskState {
        let parts: Vec<String> = self.all().map(Self::wanted).collect();
        TaskState::Present {
            details: Some(parts.join(", ")),
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let existed = self.installed_version(ctx, &self.name)?.is_some();

        let mut targets = Vec::new();
        for pkg in self.all() {
            match (&pkg.source, &pkg.hash) {
                (Some(source), Some(hash)) => {
                    let store = self
                        .store
                        .as_ref()
                        .with_context(|| format!("no artifact store to download {}", pkg.name))?;
                    let path = store
                        .fetch(source, hash)
                        .with_context(|| format!("Failed to download {}", pkg.name))?;
                    targets.push(path.display().to_string());
                }
                (Some(_), None) => bail!("package {} has a source but no hash", pkg.name),
                (None, _) => targets.push(pkg.spec()),
            }
        }

        let mut argv: Vec<String> = Vec::new();
        match self.manager {
            PackageManager::Apt => {
                argv.extend(["env".into(), "DEBIAN_FRONTEND=noninteractive".into()]);
                if self.prevent_start {
                    argv.push("RUNLEVEL=1".into());
                }
                argv.extend(
                    ["apt-get", "install", "--yes", "--no-install-recommends"].map(String::from),
                );
            }
            PackageManager::Yum => {
                argv.extend(["yum", "install", "-y"].map(String::from));
            }
        }
        argv.extend(targets);

        log::info!("installing {}", self.name);
        ctx.runner
            .run_argv(&argv)
            .with_context(|| format!("Failed to install {}", self.name))?;

        Ok(if existed {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;
    use artifacts::MockFetcher;
    use converge::{BuildContext, DependencyGraph, converge_task};

    const URL: &str = "https://download.docker.com/containerd.io_1.2.4-1_amd64.deb";
    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

    fn dpkg_line(name: &str) -> String {
        format!("dpkg-query -f {DPKG_QUERY_FORMAT} -W {name}")
    }

    fn store(dir: &std::path::Path) -> Arc<ArtifactStore> {
        let fetcher = MockFetcher::new().with(URL, b"hello".to_vec());
        Arc::new(ArtifactStore::new(dir.join("cache"), Box::new(fetcher)))
    }

    #[test]
    fn test_installed_at_wanted_version_is_converged() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new().answer(&dpkg_line("socat"), "ii 1.7.3.1-2\n", true);
        let ctx = ApplyContext::new(dir.path(), &runner);

        let pinned = Package::os("socat", PackageManager::Apt).with_version("1.7.3.1-2");
        assert_eq!(pinned.current_state(&ctx).unwrap(), pinned.desired_state());

        let unpinned = Package::os("socat", PackageManager::Apt);
        assert_eq!(unpinned.current_state(&ctx).unwrap(), unpinned.desired_state());

        let newer = Package::os("socat", PackageManager::Apt).with_version("1.8");
        assert_ne!(newer.current_state(&ctx).unwrap(), newer.desired_state());
    }

    #[test]
    fn test_not_installed_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new()
            .answer(&dpkg_line("conntrack"), "", false)
            .answer(&dpkg_line("ebtables"), "un \n", true);
        let ctx = ApplyContext::new(dir.path(), &runner);

        for name in ["conntrack", "ebtables"] {
            let pkg = Package::os(name, PackageManager::Apt);
            assert_eq!(pkg.current_state(&ctx).unwrap(), TaskState::Absent);
        }
    }

    #[test]
    fn test_install_bare_package_downloads_and_prevents_start() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new().answer(&dpkg_line("containerd.io"), "", false);
        let ctx = ApplyContext::new(dir.path(), &runner);
        let store = store(dir.path());

        let pkg = Package::os("containerd.io", PackageManager::Apt)
            .with_version("1.2.4-1")
            .with_source(URL, HELLO_SHA1, store.clone())
            .preventing_start();

        assert_eq!(converge_task(&pkg, &ctx), ApplyResult::Created);

        let cached = store.cached_path(URL, HELLO_SHA1);
        assert!(cached.exists());
        let install = runner.lines().pop().unwrap();
        assert_eq!(
            install,
            format!(
                "env DEBIAN_FRONTEND=noninteractive RUNLEVEL=1 apt-get install --yes --no-install-recommends {}",
                cached.display()
            )
        );
    }

    #[test]
    fn test_bad_hash_fails_without_installing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let ctx = ApplyContext::new(dir.path(), &runner);

        let pkg = Package::os("containerd.io", PackageManager::Yum).with_source(
            URL,
            "0000000000000000000000000000000000000000",
            store(dir.path()),
        );
        let ApplyResult::Failed { error } = converge_task(&pkg, &ctx) else {
            panic!("expected failure");
        };
        assert!(error.contains("containerd.io"));
        assert!(!runner.lines().iter().any(|l| l.starts_with("yum")));
    }

    #[test]
    fn test_yum_install_of_repository_packages() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new().answer(
            "rpm -q --queryformat %{VERSION}-%{RELEASE} container-selinux",
            "",
            false,
        );
        let ctx = ApplyContext::new(dir.path(), &runner);

        let pkg = Package::os("container-selinux", PackageManager::Yum).with_version("2.107");
        pkg.apply(&ctx).unwrap();
        assert_eq!(
            runner.lines().pop().unwrap(),
            "yum install -y container-selinux-2.107"
        );
    }

    #[test]
    fn test_version_matches() {
        assert!(version_matches("1.2.10", "1.2.10"));
        assert!(version_matches("1.2.10-3.2.el7", "1.2.10"));
        assert!(!version_matches("1.2.100", "1.2.10"));
        assert!(!version_matches("1.2.1", "1.2.10"));
    }

    #[test]
    fn test_bare_packages_follow_repository_packages() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let model = ();
        let mut build = BuildContext::new(&model);
        for task in [
            Package::os("libseccomp2", PackageManager::Apt),
            Package::os("socat", PackageManager::Apt),
            Package::os("containerd.io", PackageManager::Apt).with_source(URL, HELLO_SHA1, store),
        ] {
            build.register("t", Box::new(task)).unwrap();
        }

        let graph = DependencyGraph::build(build.finish()).unwrap();
        let bare = TaskId::new(KIND, "containerd.io");
        assert_eq!(graph.prerequisites(&bare).count(), 2);
        assert_eq!(graph.prerequisites(&TaskId::new(KIND, "socat")).count(), 0);
    }

    #[test]
    fn test_store_is_not_part_of_payload() {
        let dir = tempfile::tempdir().unwrap();
        let a = Package::os("containerd.io", PackageManager::Apt)
            .with_source(URL, HELLO_SHA1, store(dir.path()));
        let b = Package::os("containerd.io", PackageManager::Apt)
            .with_source(URL, HELLO_SHA1, store(dir.path()));
        assert_eq!(a.payload().unwrap(), b.payload().unwrap());
        assert!(a.payload().unwrap().get("store").is_none());
    }
}

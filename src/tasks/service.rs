//! Service task - install a systemd unit and keep it enabled and running

use super::{archive, chattr, digest, file, package, write_atomic};
use crate::systemd;
use anyhow::{Context, Result};
use converge::{ApplyContext, ApplyResult, Task, TaskId, TaskSet, TaskState};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;

pub const KIND: &str = "Service";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    /// Unit file contents, written to the system unit directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    pub running: bool,
    pub enabled: bool,
    /// When false only the unit file is managed
    pub manage_state: bool,
}

/// What systemd reports for one unit
#[derive(Debug, Default)]
struct Observed {
    definition: Option<String>,
    enabled: bool,
    active: bool,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: None,
            running: true,
            enabled: true,
            manage_state: true,
        }
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    fn observe(&self, ctx: &ApplyContext) -> Result<Observed> {
        let mut observed = Observed::default();
        if self.definition.is_some() {
            let path = ctx.host_path(systemd::unit_path(&self.name));
            observed.definition = match fs::read(&path) {
                Ok(bytes) => Some(digest(&bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()));
                }
            };
        }
        if self.manage_state {
            observed.enabled = ctx
                .runner
                .run_status("systemctl", &["is-enabled", &self.name])?;
            observed.active = ctx
                .runner
                .run_status("systemctl", &["is-active", &self.name])?;
        }
        Ok(observed)
    }

    fn details(&self, definition: Option<&str>, enabled: bool, active: bool) -> String {
        let mut parts = Vec::new();
        if self.definition.is_some() {
            parts.push(format!("unit {}", definition.unwrap_or("missing")));
        }
        if self.manage_state {
            parts.push(if enabled { "enabled" } else { "disabled" }.to_string());
            parts.push(if active { "active" } else { "inactive" }.to_string());
        }
        parts.join(", ")
    }
}

impl Task for Service {
    fn id(&self) -> TaskId {
        TaskId::new(KIND, &self.name)
    }

    fn description(&self) -> String {
        format!("Configure service {}", self.name)
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Services start after everything they might run or read is in place
    fn infer_ordering(&self, tasks: &TaskSet) -> Vec<TaskId> {
        [package::KIND, archive::KIND, file::KIND, chattr::KIND]
            .into_iter()
            .flat_map(|kind| tasks.ids_of_kind(kind))
            .cloned()
            .collect()
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<TaskState> {
        let observed = self.observe(ctx)?;
        if self.definition.is_some() && observed.definition.is_none() {
            return Ok(TaskState::Absent);
        }
        Ok(TaskState::Present {
            details: Some(self.details(
                observed.definition.as_deref(),
                observed.enabled,
                observed.active,
            )),
        })
    }

    fn desired_state(&self) -> TaskState {
        let definition = self.definition.as_deref().map(|d| digest(d.as_bytes()));
        TaskState::Present {
            details: Some(self.details(definition.as_deref(), self.enabled, self.running)),
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let observed = self.observe(ctx)?;
        let mut created = false;
        let mut unit_changed = false;

        if let Some(definition) = &self.definition {
            let wanted = digest(definition.as_bytes());
            if observed.definition.as_deref() != Some(wanted.as_str()) {
                let path = ctx.host_path(systemd::unit_path(&self.name));
                write_atomic(&path, definition.as_bytes(), 0o644)?;
                created = observed.definition.is_none();
                unit_changed = true;
                ctx.runner.run_checked("systemctl", &["daemon-reload"])?;
                log::info!("wrote unit {}", self.name);
            }
        }

        if self.manage_state {
            if self.enabled && !observed.enabled {
                ctx.runner
                    .run_checked("systemctl", &["enable", &self.name])?;
            }
            if self.running {
                if !observed.active {
                    ctx.runner.run_checked("systemctl", &["start", &self.name])?;
                } else if unit_changed {
                    ctx.runner
                        .run_checked("systemctl", &["restart", &self.name])?;
                }
            }
        }

        Ok(if created {
            ApplyResult::Created
        } else {
            ApplyResult::Modified
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;
    use crate::tasks::{File, Package, PackageManager};
    use converge::{BuildContext, DependencyGraph, converge_task};

    const UNIT: &str = "[Unit]\nDescription=containerd container runtime\n";

    #[test]
    fn test_new_unit_is_written_and_started() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new()
            .answer("systemctl is-enabled containerd.service", "disabled", false)
            .answer("systemctl is-active containerd.service", "inactive", false);
        let ctx = ApplyContext::new(dir.path(), &runner);

        let task = Service::new("containerd.service").with_definition(UNIT);
        assert_eq!(task.current_state(&ctx).unwrap(), TaskState::Absent);
        assert_eq!(converge_task(&task, &ctx), ApplyResult::Created);

        let written =
            fs::read_to_string(dir.path().join("etc/systemd/system/containerd.service")).unwrap();
        assert_eq!(written, UNIT);
        let lines = runner.lines();
        assert!(lines.contains(&"systemctl daemon-reload".to_string()));
        assert!(lines.contains(&"systemctl enable containerd.service".to_string()));
        assert!(lines.contains(&"systemctl start containerd.service".to_string()));
    }

    #[test]
    fn test_changed_unit_restarts_running_service() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let ctx = ApplyContext::new(dir.path(), &runner);

        let old = Service::new("containerd.service").with_definition("old");
        converge_task(&old, &ctx);
        runner.clear();

        let task = Service::new("containerd.service").with_definition(UNIT);
        assert_eq!(converge_task(&task, &ctx), ApplyResult::Modified);
        let lines = runner.lines();
        assert!(lines.contains(&"systemctl daemon-reload".to_string()));
        assert!(lines.contains(&"systemctl restart containerd.service".to_string()));
        assert!(!lines.contains(&"systemctl start containerd.service".to_string()));

        runner.clear();
        assert_eq!(converge_task(&task, &ctx), ApplyResult::NoChange);
        assert_eq!(
            runner.lines(),
            [
                "systemctl is-enabled containerd.service",
                "systemctl is-active containerd.service"
            ]
        );
    }

    #[test]
    fn test_unmanaged_service_only_writes_unit() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let ctx = ApplyContext::new(dir.path(), &runner);

        let task = Service {
            manage_state: false,
            ..Service::new("kubelet.service").with_definition(UNIT)
        };
        assert_eq!(converge_task(&task, &ctx), ApplyResult::Created);
        assert_eq!(runner.lines(), ["systemctl daemon-reload"]);
    }

    #[test]
    fn test_service_runs_after_installs_and_files() {
        let mut build = BuildContext::new(&());
        build
            .register("t", Box::new(Service::new("containerd.service").with_definition(UNIT)))
            .unwrap();
        build
            .register("t", Box::new(File::new("/etc/sysconfig/containerd", "")))
            .unwrap();
        build
            .register("t", Box::new(Package::os("socat", PackageManager::Apt)))
            .unwrap();

        let graph = DependencyGraph::build(build.finish()).unwrap();
        let id = TaskId::new(KIND, "containerd.service");
        let mut prereqs: Vec<_> = graph.prerequisites(&id).map(ToString::to_string).collect();
        prereqs.sort_unstable();
        assert_eq!(prereqs, ["File//etc/sysconfig/containerd", "Package/socat"]);
    }
}

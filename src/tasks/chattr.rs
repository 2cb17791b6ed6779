//! Chattr task - set a file attribute such as immutable
//!
//! Used after installing binaries that must not be replaced behind the
//! package manager's back.

use anyhow::{Result, bail};
use converge::{
    ApplyContext, ApplyResult, RenderError, RenderValue, RenderedResource, Task, TaskId,
    TaskState,
};
use serde::Serialize;
use std::collections::BTreeMap;

pub const KIND: &str = "Chattr";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chattr {
    pub file: String,
    /// Attribute change in chattr syntax, e.g. `+i`
    pub mode: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<TaskId>,
}

impl Chattr {
    pub fn new(file: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            mode: mode.into(),
            deps: Vec::new(),
        }
    }

    pub fn after(mut self, id: TaskId) -> Self {
        self.deps.push(id);
        self
    }

    /// Attribute letters and whether they are being added
    fn flags(&self) -> Result<(bool, &str)> {
        match self.mode.split_at_checked(1) {
            Some(("+", letters)) if !letters.is_empty() => Ok((true, letters)),
            Some(("-", letters)) if !letters.is_empty() => Ok((false, letters)),
            _ => bail!("unsupported chattr mode {:?}", self.mode),
        }
    }
}

impl Task for Chattr {
    fn id(&self) -> TaskId {
        TaskId::new(KIND, &self.file)
    }

    fn description(&self) -> String {
        format!("chattr {} {}", self.mode, self.file)
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn dependencies(&self) -> Vec<TaskId> {
        self.deps.clone()
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<TaskState> {
        let path = ctx.host_path(&self.file);
        if !path.exists() {
            return Ok(TaskState::Absent);
        }
        let (adding, letters) = self.flags()?;
        let path_str = path.to_string_lossy();
        let output = ctx.runner.run("lsattr", &["-d", &path_str])?;
        if !output.success {
            return Ok(TaskState::Unknown);
        }
        // "----i---------e----- /usr/bin/containerd"
        let stdout = output.stdout_str();
        let attrs = stdout.split_whitespace().next().unwrap_or_default();
        let applied = letters.chars().all(|c| attrs.contains(c) == adding);
        Ok(TaskState::Present {
            details: Some(if applied { self.mode.clone() } else { attrs.to_string() }),
        })
    }

    fn desired_state(&self) -> TaskState {
        TaskState::Present {
            details: Some(self.mode.clone()),
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        self.flags()?;
        let path = ctx.host_path(&self.file);
        if !path.exists() {
            bail!("{} does not exist", self.file);
        }
        let host = path.to_string_lossy();
        ctx.runner.run_checked("chattr", &[self.mode.as_str(), &host])?;
        log::info!("chattr {} {}", self.mode, self.file);
        Ok(ApplyResult::Modified)
    }

    fn render(&self) -> Result<RenderedResource, RenderError> {
        let properties = BTreeMap::from([
            ("file".to_string(), RenderValue::Literal(self.file.clone().into())),
            ("mode".to_string(), RenderValue::Literal(self.mode.clone().into())),
        ]);
        Ok(RenderedResource {
            kind: KIND.to_string(),
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;
    use converge::converge_task;
    use std::fs;

    fn setup(dir: &std::path::Path) -> String {
        let bin = dir.join("usr/bin/containerd");
        fs::create_dir_all(bin.parent().unwrap()).unwrap();
        fs::write(&bin, b"bin").unwrap();
        bin.to_string_lossy().to_string()
    }

    #[test]
    fn test_sets_missing_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let host = setup(dir.path());
        let runner = RecordingRunner::new()
            .answer(&format!("lsattr -d {host}"), "--------------e----- x", true);
        let ctx = ApplyContext::new(dir.path(), &runner);

        let task = Chattr::new("/usr/bin/containerd", "+i");
        assert_eq!(converge_task(&task, &ctx), ApplyResult::Modified);
        assert_eq!(runner.lines().last().unwrap(), &format!("chattr +i {host}"));
    }

    #[test]
    fn test_already_immutable_is_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let host = setup(dir.path());
        let runner = RecordingRunner::new()
            .answer(&format!("lsattr -d {host}"), "----i---------e----- x", true);
        let ctx = ApplyContext::new(dir.path(), &runner);

        let task = Chattr::new("/usr/bin/containerd", "+i");
        assert_eq!(converge_task(&task, &ctx), ApplyResult::NoChange);
        assert_eq!(runner.lines().len(), 1);
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let ctx = ApplyContext::new(dir.path(), &runner);

        let task = Chattr::new("/usr/bin/containerd", "+i");
        assert!(matches!(converge_task(&task, &ctx), ApplyResult::Failed { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_render_omits_dependencies() {
        let task = Chattr::new("/usr/bin/containerd", "+i")
            .after(TaskId::new("Package", "containerd.io"));
        assert_eq!(task.dependencies().len(), 1);
        let rendered = task.render().unwrap();
        assert_eq!(rendered.properties.len(), 2);
        assert_eq!(task.payload().unwrap()["deps"][0]["name"], "containerd.io");
    }
}

//! File task - write a file with fixed contents and mode

use super::{digest, file_mode, serialize_mode, write_atomic};
use anyhow::{Context, Result, bail};
use converge::{ApplyContext, ApplyResult, Task, TaskId, TaskState};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;

pub const KIND: &str = "File";

/// A file with fixed contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub path: String,
    pub contents: String,
    #[serde(serialize_with = "serialize_mode")]
    pub mode: u32,
    /// Files this one is written after, when they are part of the build
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after_files: Vec<String>,
    /// Commands run in order when the file actually changed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub on_change_execute: Vec<Vec<String>>,
}

impl File {
    /// A regular file, mode 0644
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            mode: 0o644,
            after_files: Vec::new(),
            on_change_execute: Vec::new(),
        }
    }

    pub fn after_file(mut self, path: impl Into<String>) -> Self {
        self.after_files.push(path.into());
        self
    }

    pub fn on_change(mut self, argv: &[&str]) -> Self {
        self.on_change_execute
            .push(argv.iter().map(ToString::to_string).collect());
        self
    }

    fn details(&self, kind: &str, fingerprint: Option<&str>, mode: u32) -> String {
        match fingerprint {
            Some(fp) => format!("{kind} {fp} mode {mode:04o}"),
            None => format!("{kind} mode {mode:04o}"),
        }
    }
}

impl Task for File {
    fn id(&self) -> TaskId {
        TaskId::new(KIND, &self.path)
    }

    fn description(&self) -> String {
        format!("Write {}", self.path)
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn ordering_hints(&self) -> Vec<TaskId> {
        self.after_files
            .iter()
            .map(|p| TaskId::new(KIND, p))
            .collect()
    }

    fn on_change(&self) -> Vec<Vec<String>> {
        self.on_change_execute.clone()
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<TaskState> {
        let path = ctx.host_path(&self.path);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TaskState::Absent),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", path.display()));
            }
        };

        let details = if meta.is_dir() {
            self.details("directory", None, file_mode(&meta))
        } else {
            let bytes =
                fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            self.details("file", Some(&digest(&bytes)), file_mode(&meta))
        };
        Ok(TaskState::Present {
            details: Some(details),
        })
    }

    fn desired_state(&self) -> TaskState {
        let details = self.details("file", Some(&digest(self.contents.as_bytes())), self.mode);
        TaskState::Present {
            details: Some(details),
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = ctx.host_path(&self.path);
        let existing = fs::symlink_metadata(&path).ok();

        if existing.as_ref().is_some_and(fs::Metadata::is_dir) {
            bail!("{} is a directory", self.path);
        }
        write_atomic(&path, self.contents.as_bytes(), self.mode)?;

        log::info!("wrote {}", self.path);
        Ok(if existing.is_some() {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }
}

//! Apply context and provider traits
//!
//! These traits allow the converge crate to be used without
//! depending on a specific process runner, progress UI, or prompt.

use crate::types::{ApplyResult, CommandOutput, TaskId};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Provider for host commands
///
/// Implement this trait to run commands against the live environment.
/// Tests substitute a recording implementation.
pub trait CommandRunner: Send + Sync {
    /// Run a command
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&self, cmd: &str, args: &[&str]) -> Result<bool> {
        Ok(self.run(cmd, args)?.success)
    }

    /// Run a command, failing if it exits non-zero
    fn run_checked(&self, cmd: &str, args: &[&str]) -> Result<()> {
        let output = self.run(cmd, args)?;
        if !output.success {
            anyhow::bail!(
                "`{} {}` failed: {}",
                cmd,
                args.join(" "),
                output.stderr_str().trim()
            );
        }
        Ok(())
    }

    /// Run an argument vector, failing if it exits non-zero
    fn run_argv(&self, argv: &[String]) -> Result<()> {
        let Some((cmd, args)) = argv.split_first() else {
            anyhow::bail!("empty command");
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(cmd, &args)
    }
}

/// Progress callback for execution operations
///
/// All callbacks are invoked from the coordinating thread, never from
/// worker threads, so implementations need not be `Sync`.
pub trait ProgressCallback: Send {
    /// Called once before any task is applied
    fn on_run_start(&mut self, count: usize);

    /// Called when a task is handed to a worker
    fn on_task_start(&mut self, id: &TaskId, description: &str);

    /// Called when a task finishes (or is skipped because a dependency failed)
    fn on_task_complete(&mut self, id: &TaskId, result: &ApplyResult);

    /// Called after the last task completes
    fn on_run_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _count: usize) {}
    fn on_task_start(&mut self, _id: &TaskId, _description: &str) {}
    fn on_task_complete(&mut self, _id: &TaskId, _result: &ApplyResult) {}
    fn on_run_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Context passed to task state detection and apply operations
pub struct ApplyContext<'a> {
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
    /// Filesystem root that absolute task paths are resolved under
    pub root: &'a Path,
    /// Runner for host commands
    pub runner: &'a dyn CommandRunner,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(root: &'a Path, runner: &'a dyn CommandRunner) -> Self {
        Self {
            dry_run: false,
            verbose: false,
            root,
            runner,
        }
    }

    /// Resolve an absolute node path under the configured root
    ///
    /// `/etc/foo` with root `/tmp/x` becomes `/tmp/x/etc/foo`.
    pub fn host_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted {
        calls: Mutex<Vec<String>>,
        success: bool,
    }

    impl CommandRunner for Scripted {
        fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
            self.calls
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(format!("{} {}", cmd, args.join(" ")));
            Ok(CommandOutput {
                stdout: b"out".to_vec(),
                stderr: b"boom".to_vec(),
                success: self.success,
            })
        }
    }

    #[test]
    fn test_host_path_strips_leading_slash() {
        let runner = Scripted {
            calls: Mutex::new(Vec::new()),
            success: true,
        };
        let root = Path::new("/tmp/node");
        let ctx = ApplyContext::new(root, &runner);
        assert_eq!(
            ctx.host_path("/etc/containerd/config.toml"),
            PathBuf::from("/tmp/node/etc/containerd/config.toml")
        );
    }

    #[test]
    fn test_run_argv_splits_program() {
        let runner = Scripted {
            calls: Mutex::new(Vec::new()),
            success: true,
        };
        runner
            .run_argv(&["systemctl".to_string(), "daemon-reload".to_string()])
            .unwrap();
        assert_eq!(
            runner.calls.lock().unwrap().as_slice(),
            ["systemctl daemon-reload"]
        );
    }

    #[test]
    fn test_run_checked_reports_stderr() {
        let runner = Scripted {
            calls: Mutex::new(Vec::new()),
            success: false,
        };
        let err = runner.run_checked("chattr", &["+i", "/usr/bin/runc"]).unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(runner.run_argv(&[]).is_err());
    }
}

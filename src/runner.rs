use anyhow::{Context, Result};
use converge::{CommandOutput, CommandRunner};
use std::process::{Command, Stdio};

/// Runs task commands on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("exec: {} {}", cmd, args.join(" "));
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

        if !output.status.success() {
            log::debug!(
                "{} exited with {}: {}",
                cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.into())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;

    #[test]
    fn test_recording_runner_answers() {
        let runner = RecordingRunner::new().answer("systemctl is-active x", "inactive", false);
        assert!(!runner.run_status("systemctl", &["is-active", "x"]).unwrap());
        assert!(runner.run_status("systemctl", &["daemon-reload"]).unwrap());
        assert_eq!(
            runner.lines(),
            ["systemctl is-active x", "systemctl daemon-reload"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_host_runner_captures_output() {
        let out = HostRunner.run("sh", &["-c", "echo hi"]).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout_str().trim(), "hi");
        assert!(!HostRunner.run_status("sh", &["-c", "exit 3"]).unwrap());
    }
}

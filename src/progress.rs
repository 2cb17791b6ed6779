//! Apply progress on the terminal

use colored::Colorize;
use converge::{ApplyResult, ProgressCallback, TaskId};
use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar over the tasks of one run
///
/// Failures and, when verbose, every result are printed above the bar.
pub struct BarProgress {
    bar: ProgressBar,
    quiet: bool,
    verbose: bool,
}

impl BarProgress {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            quiet,
            verbose,
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_run_start(&mut self, count: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(count as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE) {
            bar.set_style(style.progress_chars("=>-"));
        }
        self.bar = bar;
    }

    fn on_task_start(&mut self, _id: &TaskId, description: &str) {
        self.bar.set_message(description.to_string());
    }

    fn on_task_complete(&mut self, id: &TaskId, result: &ApplyResult) {
        self.bar.inc(1);
        match result {
            ApplyResult::Failed { error } => {
                self.bar
                    .println(format!("  {} {}: {}", "✗".red(), id, error));
            }
            ApplyResult::Skipped { reason } if self.verbose => {
                self.bar
                    .println(format!("  {} {} ({})", "⊘".yellow(), id, reason));
            }
            ApplyResult::Created | ApplyResult::Modified if self.verbose => {
                self.bar.println(format!("  {} {}", "✓".green(), id));
            }
            _ => {}
        }
    }

    fn on_run_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_progress_stays_hidden() {
        let mut progress = BarProgress::new(true, false);
        progress.on_run_start(3);
        progress.on_task_complete(&TaskId::new("File", "/etc/x"), &ApplyResult::Created);
        assert!(progress.bar.is_hidden());
        assert_eq!(progress.bar.position(), 1);
        progress.on_run_complete();
    }
}

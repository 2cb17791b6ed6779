use anyhow::Result;
use colored::Colorize;
use converge::{ConfirmCallback, DiffSummary, ExecuteSummary, TaskDiff, TaskState, group_by_kind};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

fn state_label(state: &TaskState) -> String {
    match state {
        TaskState::Present { details: Some(d) } => d.clone(),
        TaskState::Present { details: None } => "present".to_string(),
        TaskState::Absent => "absent".to_string(),
        TaskState::Unknown => "unknown".to_string(),
    }
}

/// Print pending changes grouped by task kind
pub fn display_diffs(diffs: &[TaskDiff]) {
    if diffs.is_empty() {
        success("Node is up to date");
        return;
    }

    for (kind, group) in group_by_kind(diffs) {
        section(kind);
        for diff in group {
            let marker = if diff.is_addition() {
                "+".green()
            } else if diff.is_removal() {
                "-".red()
            } else {
                "~".yellow()
            };
            println!("  {} {}", marker, diff.id.name);
            dim(&format!(
                "{}: {} → {}",
                diff.description,
                state_label(&diff.current),
                state_label(&diff.desired)
            ));
        }
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!();
    println!(
        "  {} to add, {} to change, {} to remove",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
}

/// Line diff of file contents, changed lines only
pub fn content_diff(old: &str, new: &str) -> Vec<String> {
    let diff = similar::TextDiff::from_lines(old, new);
    let mut lines = Vec::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => continue,
        };
        lines.push(format!("{sign} {}", change.value().trim_end_matches('\n')));
    }
    lines
}

/// Print a content diff under a task
pub fn show_content_diff(old: &str, new: &str) {
    for line in content_diff(old, new) {
        if line.starts_with('+') {
            println!("      {}", line.green());
        } else {
            println!("      {}", line.red());
        }
    }
}

/// Print the final apply summary
pub fn print_summary(summary: &ExecuteSummary, dry_run: bool) {
    println!();
    if dry_run {
        info("Dry run - no changes made");
    } else if summary.is_success() {
        println!("  {} Node converged", "✓".green().bold());
    } else {
        println!("  {} Node converged with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} modified", summary.modified);
    }
    if summary.no_change > 0 {
        println!("    • {} unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
        for (id, cause) in &summary.failures {
            println!("      {} {}: {}", "✗".red(), id, cause);
        }
    }
}

/// Interactive confirmation on the terminal
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        Ok(confirmed)
    }
}

// ============================================================================
// Size Formatting
// ============================================================================

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(30 * 1024 * 1024), "30.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_content_diff_shows_changed_lines() {
        let old = "[Service]\nTasksMax=4096\n";
        let new = "[Service]\nTasksMax=infinity\n";
        assert_eq!(content_diff(old, new), ["- TasksMax=4096", "+ TasksMax=infinity"]);
        assert!(content_diff(new, new).is_empty());
    }

    #[test]
    fn test_content_diff_from_nothing() {
        assert_eq!(content_diff("", "CONTAINERD_OPTS="), ["+ CONTAINERD_OPTS="]);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(state_label(&TaskState::Absent), "absent");
        assert_eq!(
            state_label(&TaskState::Present {
                details: Some("socat 1.7".to_string())
            }),
            "socat 1.7"
        );
    }
}

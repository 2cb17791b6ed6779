//! Diff computation for planned tasks

use crate::context::ApplyContext;
use crate::planner::ExecutionPlan;
use crate::task::Task;
use crate::types::{TaskId, TaskState};
use serde::Serialize;
use std::collections::BTreeMap;

/// A difference between observed and desired state of one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskDiff {
    pub id: TaskId,
    /// Human-readable description
    pub description: String,
    pub current: TaskState,
    pub desired: TaskState,
}

impl TaskDiff {
    /// Diff a task against the live environment, `None` when converged
    ///
    /// A task whose state cannot be read is reported with `Unknown` current
    /// state rather than hidden.
    pub fn from_task(task: &dyn Task, ctx: &ApplyContext<'_>) -> Option<Self> {
        let current = match task.current_state(ctx) {
            Ok(state) => state,
            Err(e) => {
                log::debug!("cannot read state of {}: {:#}", task.id(), e);
                TaskState::Unknown
            }
        };
        let desired = task.desired_state();

        if current == desired {
            return None;
        }

        Some(Self {
            id: task.id(),
            description: task.description(),
            current,
            desired,
        })
    }

    pub fn is_addition(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (TaskState::Absent, TaskState::Present { .. })
        )
    }

    pub fn is_removal(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (TaskState::Present { .. }, TaskState::Absent)
        )
    }
}

/// Diffs for every unconverged task, in plan order
pub fn compute_diffs(plan: &ExecutionPlan, ctx: &ApplyContext<'_>) -> Vec<TaskDiff> {
    plan.tasks()
        .filter_map(|task| TaskDiff::from_task(task, ctx))
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    pub additions: usize,
    pub removals: usize,
    pub modifications: usize,
}

impl DiffSummary {
    pub fn from_diffs(diffs: &[TaskDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by task kind
pub fn group_by_kind(diffs: &[TaskDiff]) -> BTreeMap<&str, Vec<&TaskDiff>> {
    let mut groups: BTreeMap<&str, Vec<&TaskDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.id.kind.as_str()).or_default().push(diff);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(kind: &str, current: TaskState, desired: TaskState) -> TaskDiff {
        TaskDiff {
            id: TaskId::new(kind, "x"),
            description: String::new(),
            current,
            desired,
        }
    }

    #[test]
    fn test_summary_classifies_diffs() {
        let present = || TaskState::Present { details: None };
        let diffs = vec![
            diff("File", TaskState::Absent, present()),
            diff(
                "File",
                TaskState::Present {
                    details: Some("a".into()),
                },
                TaskState::Present {
                    details: Some("b".into()),
                },
            ),
            diff("Package", TaskState::Unknown, present()),
        ];

        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.modifications, 2);
        assert!(summary.has_changes());

        let groups = group_by_kind(&diffs);
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), ["File", "Package"]);
        assert_eq!(groups["File"].len(), 2);
    }
}

//! Mutating target - converges the live environment task by task
//!
//! Tasks run on a bounded worker pool as soon as every prerequisite has
//! succeeded. A failure skips everything downstream of it; independent
//! branches keep going. A task that panics counts as failed.

use crate::context::{ApplyContext, ProgressCallback};
use crate::error::BuildError;
use crate::planner::ExecutionPlan;
use crate::run::{RunPhase, Target};
use crate::task::Task;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary, TaskId, TaskOutcome};
use std::any::Any;
use std::collections::{BTreeSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

/// Result of a mutating run
#[derive(Debug, Clone, Default)]
pub struct ExecuteReport {
    /// One outcome per task, in completion order
    pub outcomes: Vec<TaskOutcome>,
    pub summary: ExecuteSummary,
}

/// Target that applies a plan to the live environment
pub struct MutatingTarget<'a, P: ProgressCallback> {
    ctx: ApplyContext<'a>,
    jobs: usize,
    progress: P,
}

impl<'a, P: ProgressCallback> MutatingTarget<'a, P> {
    pub fn new(mut ctx: ApplyContext<'a>, opts: &ExecuteOptions, progress: P) -> Self {
        ctx.dry_run = opts.dry_run;
        ctx.verbose = opts.verbose;
        Self {
            ctx,
            jobs: opts.jobs,
            progress,
        }
    }
}

impl<P: ProgressCallback> Target for MutatingTarget<'_, P> {
    type Output = ExecuteReport;

    fn phase(&self) -> RunPhase {
        RunPhase::Applying
    }

    fn run(&mut self, plan: &ExecutionPlan) -> Result<ExecuteReport, BuildError> {
        execute(plan, &self.ctx, self.jobs, &mut self.progress)
    }

    fn succeeded(&self, output: &ExecuteReport) -> bool {
        output.summary.is_success()
    }
}

/// Apply every task in the plan
///
/// `jobs` bounds how many tasks are in flight at once. With one job, tasks
/// run exactly in plan order.
pub fn execute(
    plan: &ExecutionPlan,
    ctx: &ApplyContext<'_>,
    jobs: usize,
    progress: &mut dyn ProgressCallback,
) -> Result<ExecuteReport, BuildError> {
    let jobs = jobs.max(1);
    let nodes = plan.nodes();
    let mut report = ExecuteReport::default();

    progress.on_run_start(nodes.len());
    if nodes.is_empty() {
        progress.on_run_complete();
        return Ok(report);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("converge-{i}"))
        .build()
        .map_err(|e| BuildError::Executor(e.to_string()))?;

    let mut remaining: Vec<usize> = nodes.iter().map(|n| n.prerequisites.len()).collect();
    let mut resolved = vec![false; nodes.len()];
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| remaining[i] == 0).collect();
    let (tx, rx) = mpsc::channel::<(usize, ApplyResult)>();

    pool.in_place_scope(|scope| {
        let mut in_flight = 0usize;
        loop {
            while in_flight < jobs
                && let Some(i) = ready.pop_first()
            {
                let node = &nodes[i];
                progress.on_task_start(&node.id, &node.task.description());
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        converge_task(node.task.as_ref(), ctx)
                    }))
                    .unwrap_or_else(|cause| ApplyResult::Failed {
                        error: format!("task panicked: {}", panic_message(cause.as_ref())),
                    });
                    // The receiver outlives the scope.
                    let _ = tx.send((i, result));
                });
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }
            let Ok((i, result)) = rx.recv() else {
                break;
            };
            in_flight -= 1;

            let node = &nodes[i];
            resolved[i] = true;
            progress.on_task_complete(&node.id, &result);

            if result.is_success() {
                for &d in &node.dependents {
                    remaining[d] -= 1;
                    if remaining[d] == 0 && !resolved[d] {
                        ready.insert(d);
                    }
                }
            } else {
                if let ApplyResult::Failed { error } = &result {
                    log::warn!("{} failed: {}", node.id, error);
                }
                for d in downstream(plan, i) {
                    if resolved[d] {
                        continue;
                    }
                    resolved[d] = true;
                    let skipped = ApplyResult::Skipped {
                        reason: format!("dependency {} failed", node.id),
                    };
                    progress.on_task_complete(&nodes[d].id, &skipped);
                    record(&mut report, &nodes[d].id, skipped);
                }
            }
            record(&mut report, &node.id, result);
        }
    });

    progress.on_run_complete();
    Ok(report)
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

fn record(report: &mut ExecuteReport, id: &TaskId, result: ApplyResult) {
    let outcome = TaskOutcome {
        id: id.clone(),
        result,
    };
    report.summary.add_outcome(&outcome);
    report.outcomes.push(outcome);
}

/// Every task reachable through dependent edges, in plan order
fn downstream(plan: &ExecutionPlan, from: usize) -> Vec<usize> {
    let nodes = plan.nodes();
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<usize> = nodes[from].dependents.iter().copied().collect();
    while let Some(i) = queue.pop_front() {
        if seen.insert(i) {
            queue.extend(nodes[i].dependents.iter().copied());
        }
    }
    seen.into_iter().collect()
}

/// Bring one task to its desired state
///
/// Compares observed and desired state, applies only on a difference, and
/// runs the task's on-change commands only when the apply reports a change.
pub fn converge_task(task: &dyn Task, ctx: &ApplyContext<'_>) -> ApplyResult {
    let current = match task.current_state(ctx) {
        Ok(state) => state,
        Err(e) => {
            return ApplyResult::Failed {
                error: format!("failed to read current state: {e:#}"),
            };
        }
    };

    if current == task.desired_state() {
        log::trace!("{} already converged", task.id());
        return ApplyResult::NoChange;
    }

    if ctx.dry_run {
        return ApplyResult::Skipped {
            reason: "dry run".to_string(),
        };
    }

    let result = match task.apply(ctx) {
        Ok(result) => result,
        Err(e) => {
            return ApplyResult::Failed {
                error: format!("{e:#}"),
            };
        }
    };

    if result.is_change() {
        for argv in task.on_change() {
            log::debug!("{} changed, running `{}`", task.id(), argv.join(" "));
            if let Err(e) = ctx.runner.run_argv(&argv) {
                return ApplyResult::Failed {
                    error: format!("on-change command `{}` failed: {e:#}", argv.join(" ")),
                };
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildContext;
    use crate::context::{CommandRunner, NoProgress};
    use crate::graph::DependencyGraph;
    use crate::types::{CommandOutput, TaskState};
    use serde::Serialize;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, cmd: &str, args: &[&str]) -> anyhow::Result<CommandOutput> {
            let mut line = cmd.to_string();
            for a in args {
                line.push(' ');
                line.push_str(a);
            }
            self.calls.lock().unwrap().push(line);
            Ok(CommandOutput::ok())
        }
    }

    /// Task whose behavior is fixed up front
    #[derive(Debug, Serialize)]
    struct Scripted {
        name: String,
        #[serde(skip)]
        deps: Vec<String>,
        #[serde(skip)]
        converged: bool,
        #[serde(skip)]
        fails: bool,
        #[serde(skip)]
        panics: bool,
    }

    fn scripted(name: &str, deps: &[&str], converged: bool, fails: bool) -> Scripted {
        Scripted {
            name: name.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            converged,
            fails,
            panics: false,
        }
    }

    impl Task for Scripted {
        fn id(&self) -> TaskId {
            TaskId::new("Scripted", &self.name)
        }

        fn description(&self) -> String {
            self.name.clone()
        }

        fn payload(&self) -> serde_json::Result<serde_json::Value> {
            serde_json::to_value(self)
        }

        fn dependencies(&self) -> Vec<TaskId> {
            self.deps.iter().map(|d| TaskId::new("Scripted", d)).collect()
        }

        fn on_change(&self) -> Vec<Vec<String>> {
            vec![vec!["touch".to_string(), self.name.clone()]]
        }

        fn current_state(&self, _ctx: &ApplyContext) -> anyhow::Result<TaskState> {
            if self.converged {
                Ok(TaskState::Present { details: None })
            } else {
                Ok(TaskState::Absent)
            }
        }

        fn desired_state(&self) -> TaskState {
            TaskState::Present { details: None }
        }

        fn apply(&self, _ctx: &ApplyContext) -> anyhow::Result<ApplyResult> {
            if self.panics {
                panic!("{} lost its footing", self.name);
            }
            if self.fails {
                anyhow::bail!("{} exploded", self.name);
            }
            Ok(ApplyResult::Created)
        }
    }

    fn plan(tasks: Vec<Scripted>) -> ExecutionPlan {
        let mut ctx = BuildContext::new(&());
        for task in tasks {
            ctx.register("test", Box::new(task)).unwrap();
        }
        ExecutionPlan::from_graph(DependencyGraph::build(ctx.finish()).unwrap()).unwrap()
    }

    fn result_of<'r>(report: &'r ExecuteReport, name: &str) -> &'r ApplyResult {
        &report
            .outcomes
            .iter()
            .find(|o| o.id.name == name)
            .unwrap()
            .result
    }

    #[test]
    fn test_on_change_runs_only_for_changed_tasks() {
        let runner = Recorder::default();
        let ctx = ApplyContext::new(Path::new("/"), &runner);
        let p = plan(vec![
            scripted("changed", &[], false, false),
            scripted("steady", &[], true, false),
        ]);

        let report = execute(&p, &ctx, 1, &mut NoProgress).unwrap();

        assert_eq!(runner.calls(), ["touch changed"]);
        assert_eq!(report.summary.created, 1);
        assert_eq!(report.summary.no_change, 1);
    }

    #[test]
    fn test_failure_skips_dependents_but_not_siblings() {
        let runner = Recorder::default();
        let ctx = ApplyContext::new(Path::new("/"), &runner);
        let p = plan(vec![
            scripted("install", &[], false, true),
            scripted("chattr", &["install"], false, false),
            scripted("service", &["chattr"], false, false),
            scripted("unrelated", &[], false, false),
        ]);

        let report = execute(&p, &ctx, 4, &mut NoProgress).unwrap();

        assert!(matches!(result_of(&report, "install"), ApplyResult::Failed { .. }));
        assert!(matches!(
            result_of(&report, "chattr"),
            ApplyResult::Skipped { reason } if reason.contains("install")
        ));
        assert!(matches!(result_of(&report, "service"), ApplyResult::Skipped { .. }));
        assert_eq!(result_of(&report, "unrelated"), &ApplyResult::Created);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.outcomes.len(), 4);
        assert!(!runner.calls().iter().any(|c| c.contains("chattr")));
    }

    #[test]
    fn test_panicking_task_fails_without_stalling_the_run() {
        let runner = Recorder::default();
        let ctx = ApplyContext::new(Path::new("/"), &runner);
        let p = plan(vec![
            Scripted {
                panics: true,
                ..scripted("boom", &[], false, false)
            },
            scripted("after", &["boom"], false, false),
            scripted("other", &[], false, false),
        ]);

        let report = execute(&p, &ctx, 2, &mut NoProgress).unwrap();

        assert!(matches!(
            result_of(&report, "boom"),
            ApplyResult::Failed { error } if error.contains("boom lost its footing")
        ));
        assert!(matches!(result_of(&report, "after"), ApplyResult::Skipped { .. }));
        assert_eq!(result_of(&report, "other"), &ApplyResult::Created);
        assert_eq!(report.outcomes.len(), 3);
        assert!(!report.summary.is_success());
    }

    #[test]
    fn test_single_job_runs_in_plan_order() {
        let runner = Recorder::default();
        let ctx = ApplyContext::new(Path::new("/"), &runner);
        let p = plan(vec![
            scripted("c", &["b"], false, false),
            scripted("b", &[], false, false),
            scripted("a", &[], false, false),
        ]);

        execute(&p, &ctx, 1, &mut NoProgress).unwrap();
        assert_eq!(runner.calls(), ["touch a", "touch b", "touch c"]);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let runner = Recorder::default();
        let mut ctx = ApplyContext::new(Path::new("/"), &runner);
        ctx.dry_run = true;
        let p = plan(vec![scripted("a", &[], false, false)]);

        let report = execute(&p, &ctx, 2, &mut NoProgress).unwrap();
        assert!(runner.calls().is_empty());
        assert_eq!(report.summary.skipped, 1);
        assert!(report.summary.is_success());
    }

    #[test]
    fn test_empty_plan() {
        let runner = Recorder::default();
        let ctx = ApplyContext::new(Path::new("/"), &runner);
        let report = execute(&ExecutionPlan::default(), &ctx, 4, &mut NoProgress).unwrap();
        assert_eq!(report.summary.total(), 0);
    }
}

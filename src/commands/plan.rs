//! `nodeup plan` - show what apply would change

use anyhow::Result;
use converge::{ApplyContext, ExecutionPlan, TaskDiff};
use std::path::Path;

use super::{load_model, prepare, read_host_file};
use crate::Context;
use crate::runner::HostRunner;
use crate::tasks::{File, file};
use crate::ui;

/// Diffs for every planned task matching the filter, in plan order
pub fn pending_diffs(
    plan: &ExecutionPlan,
    ctx: &ApplyContext<'_>,
    target: Option<&str>,
) -> Vec<TaskDiff> {
    plan.matching(target)
        .filter_map(|node| TaskDiff::from_task(node.task.as_ref(), ctx))
        .collect()
}

/// Print diffs, with line changes for files whose contents differ
pub fn show_diffs(plan: &ExecutionPlan, diffs: &[TaskDiff], root: &Path) {
    ui::display_diffs(diffs);

    let files: Vec<&File> = diffs
        .iter()
        .filter(|d| d.id.kind == file::KIND)
        .filter_map(|d| plan.position(&d.id))
        .filter_map(|i| plan.nodes()[i].task.as_ref().as_any().downcast_ref::<File>())
        .collect();
    for file in files {
        let current = read_host_file(root, &file.path);
        if current == file.contents {
            continue;
        }
        ui::section(&file.path);
        ui::show_content_diff(&current, &file.contents);
    }
}

pub fn run(ctx: &Context, target: Option<&str>) -> Result<()> {
    let model = load_model(ctx)?;
    let (_, plan) = prepare(&model)?;

    ui::header("Planned Changes");
    ui::kv("platform", &format!("{} {}", model.distribution, model.architecture));
    ui::kv("tasks", &plan.len().to_string());
    if let Some(t) = target {
        ui::kv("target", t);
    }

    let runner = HostRunner;
    let apply_ctx = ApplyContext::new(&ctx.root, &runner);
    let diffs = pending_diffs(&plan, &apply_ctx, target);
    show_diffs(&plan, &diffs, &ctx.root);
    Ok(())
}

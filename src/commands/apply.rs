//! `nodeup apply` - converge the node

use anyhow::{Result, bail};
use converge::{
    ApplyContext, AutoConfirm, ConfirmCallback, ExecuteOptions, ExecuteReport, MutatingTarget,
};

use super::plan::{pending_diffs, show_diffs};
use super::{load_model, prepare};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::BarProgress;
use crate::runner::HostRunner;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    ui::header("Applying Node Configuration");
    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let model = load_model(ctx)?;
    let (mut convergence, plan) = prepare(&model)?;

    let runner = HostRunner;
    let diffs = pending_diffs(&plan, &ApplyContext::new(&ctx.root, &runner), None);
    show_diffs(&plan, &diffs, &ctx.root);
    if diffs.is_empty() {
        return Ok(());
    }

    if !args.dry_run {
        let mut confirm: Box<dyn ConfirmCallback> = if args.yes {
            Box::new(AutoConfirm)
        } else {
            Box::new(ui::PromptConfirm)
        };
        if !confirm.confirm("Apply these changes?")? {
            ui::info("Cancelled");
            return Ok(());
        }
    }

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.max(1),
        verbose: ctx.verbose > 0,
    };
    let progress = BarProgress::new(ctx.quiet, opts.verbose);
    let mut target = MutatingTarget::new(ApplyContext::new(&ctx.root, &runner), &opts, progress);
    let report = convergence.finish(&plan, &mut target)?;

    finish(&report, args.dry_run)
}

fn finish(report: &ExecuteReport, dry_run: bool) -> Result<()> {
    ui::print_summary(&report.summary, dry_run);
    if !report.summary.is_success() {
        bail!("{} of {} tasks failed", report.summary.failed, report.summary.total());
    }
    Ok(())
}

//! `nodeup render` - write the plan as a resource document

use anyhow::{Context as AnyhowContext, Result};
use converge::{RenderTarget, RenderedDocument};
use std::fs;
use std::io::{self, Write};

use super::{load_model, prepare};
use crate::Context;
use crate::cli::RenderArgs;
use crate::model::NodeModel;
use crate::ui;

/// Render the plan for a model without touching the host
pub fn document(model: &NodeModel) -> Result<RenderedDocument> {
    let (mut convergence, plan) = prepare(model)?;
    let doc = convergence
        .finish(&plan, &mut RenderTarget)
        .context("Failed to render the node plan")?;
    Ok(doc)
}

pub fn run(ctx: &Context, args: RenderArgs) -> Result<()> {
    let model = load_model(ctx)?;
    let json = document(&model)?.to_json()?;

    match &args.output {
        Some(path) => {
            fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!("Rendered plan to {}", path.display()));
            }
        }
        None => {
            io::stdout()
                .lock()
                .write_all(json.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

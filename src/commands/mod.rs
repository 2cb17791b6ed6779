//! Subcommand implementations

pub mod apply;
pub mod artifacts;
pub mod plan;
pub mod render;

use anyhow::{Context as AnyhowContext, Result};
use ::artifacts::{Architecture, ArtifactStore, Distribution, HttpFetcher, detect_distribution};
use converge::{Convergence, ExecutionPlan};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::Context;
use crate::config;
use crate::model::{self, NodeModel, catalog};

const OS_RELEASE: &str = "/etc/os-release";

/// Distribution from the flag, or from os-release under the root
pub fn distribution(ctx: &Context) -> Result<Distribution> {
    if let Some(name) = &ctx.distribution {
        return Ok(name.parse()?);
    }
    let path = ctx.root.join(OS_RELEASE.trim_start_matches('/'));
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(detect_distribution(&content)?)
}

/// Architecture from the flag, or the one nodeup was built for
pub fn architecture(ctx: &Context) -> Result<Architecture> {
    match &ctx.architecture {
        Some(name) => Ok(name.parse()?),
        None => Ok(Architecture::detect()?),
    }
}

pub fn store(ctx: &Context) -> ArtifactStore {
    let cache_dir = ctx
        .cache_dir
        .clone()
        .unwrap_or_else(|| config::default_cache_dir(&ctx.root));
    log::debug!("artifact cache {}", cache_dir.display());
    ArtifactStore::new(cache_dir, Box::new(HttpFetcher::new()))
}

/// Load the configuration and detect the platform
pub fn load_model(ctx: &Context) -> Result<NodeModel> {
    let path = config::expand_path(&ctx.config);
    let node_config = config::load(&path)?;
    let distribution = distribution(ctx)?;
    let architecture = architecture(ctx)?;
    log::info!("node is {distribution} {architecture}");

    Ok(NodeModel {
        config: node_config,
        distribution,
        architecture,
        catalog: catalog::containerd_catalog(),
        store: Arc::new(store(ctx)),
    })
}

/// Run every builder and order the result
pub fn prepare(model: &NodeModel) -> Result<(Convergence<'_, NodeModel>, ExecutionPlan)> {
    let mut run = Convergence::new(model);
    let plan = run
        .prepare(&model::builders())
        .context("Failed to build the node plan")?;
    log::debug!("plan has {} tasks", plan.len());
    Ok((run, plan))
}

/// Read a file under the root, empty when missing
pub fn read_host_file(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path.trim_start_matches('/'))).unwrap_or_default()
}

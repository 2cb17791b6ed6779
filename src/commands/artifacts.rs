//! `nodeup artifacts` - inspect and prefetch the artifact catalog

use ::artifacts::{ArtifactRecord, ArtifactStore, Catalog};
use anyhow::{Result, bail};
use colored::Colorize;
use rayon::prelude::*;
use std::fs;

use super::{architecture, distribution, store};
use crate::Context;
use crate::cli::ArtifactsCommand;
use crate::config;
use crate::model::catalog::containerd_catalog;
use crate::ui;

pub fn run(ctx: &Context, cmd: ArtifactsCommand) -> Result<()> {
    let catalog = containerd_catalog();
    match cmd {
        ArtifactsCommand::List => list(&catalog),
        ArtifactsCommand::Select { version } => select(ctx, &catalog, &version),
        ArtifactsCommand::Fetch { version, jobs } => fetch(ctx, &catalog, version, jobs),
    }
}

fn platforms(record: &ArtifactRecord) -> String {
    let dists = if record.distributions.is_empty() {
        "any".to_string()
    } else {
        record
            .distributions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };
    let arches = if record.architectures.is_empty() {
        "any".to_string()
    } else {
        record
            .architectures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };
    format!("{dists} / {arches}")
}

fn print_record(record: &ArtifactRecord) {
    println!(
        "  {:<16} {:<10} {:<8} {}",
        record.name.bold(),
        record.version(),
        record.mechanism.to_string().cyan(),
        platforms(record).dimmed()
    );
    for extra in &record.extra_packages {
        ui::dim(&format!("+ {} {}", extra.name, extra.version));
    }
    for dep in &record.os_dependencies {
        ui::dim(&format!("needs {dep}"));
    }
}

fn list(catalog: &Catalog) -> Result<()> {
    catalog.validate()?;
    ui::header("Artifact Catalog");
    for version in catalog.versions() {
        ui::section(version);
        for record in catalog
            .records()
            .iter()
            .filter(|r| r.requested_version == version)
        {
            print_record(record);
        }
    }
    Ok(())
}

fn select(ctx: &Context, catalog: &Catalog, version: &str) -> Result<()> {
    let distribution = distribution(ctx)?;
    let architecture = architecture(ctx)?;

    ui::header("Selected Artifacts");
    ui::kv("platform", &format!("{distribution} {architecture}"));
    ui::kv("version", version);
    println!();

    let selected = catalog.select(distribution, architecture, version);
    if selected.is_empty() {
        ui::warn(&format!(
            "No containerd {version} artifact for {distribution} {architecture}"
        ));
        return Ok(());
    }
    for record in selected {
        print_record(record);
        ui::dim(&record.source);
    }
    Ok(())
}

/// Every download a set of records needs, extras included
fn sources<'a>(records: &[&'a ArtifactRecord]) -> Vec<(&'a str, &'a str)> {
    let mut out = Vec::new();
    for record in records {
        out.push((record.source.as_str(), record.hash.as_str()));
        for extra in &record.extra_packages {
            out.push((extra.source.as_str(), extra.hash.as_str()));
        }
    }
    out
}

/// Download into the cache in parallel, returning the size of each file
fn fetch_all<'a>(
    store: &ArtifactStore,
    sources: &[(&'a str, &'a str)],
    jobs: usize,
) -> Result<Vec<(&'a str, Result<u64>)>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()?;

    Ok(pool.install(|| {
        sources
            .par_iter()
            .map(|&(source, hash)| {
                let size = store
                    .fetch(source, hash)
                    .map_err(anyhow::Error::from)
                    .and_then(|path| Ok(fs::metadata(path)?.len()));
                (source, size)
            })
            .collect()
    }))
}

fn fetch(ctx: &Context, catalog: &Catalog, version: Option<String>, jobs: usize) -> Result<()> {
    let version = match version {
        Some(v) => v,
        None => {
            let node = config::load(&config::expand_path(&ctx.config))?;
            match node.cluster.containerd().version {
                Some(v) => v,
                None => bail!("No containerd version given and none configured"),
            }
        }
    };
    let distribution = distribution(ctx)?;
    let architecture = architecture(ctx)?;
    let selected = catalog.select_required(distribution, architecture, &version)?;
    let store = store(ctx);

    ui::header("Fetching Artifacts");
    ui::kv("cache", &store.cache_dir().display().to_string());

    let results = fetch_all(&store, &sources(&selected), jobs)?;
    let mut failed = 0;
    for (source, result) in &results {
        match result {
            Ok(size) => ui::success(&format!("{} ({})", source, ui::format_size(*size))),
            Err(e) => {
                failed += 1;
                ui::error(&format!("{source}: {e:#}"));
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} downloads failed", results.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::artifacts::{ContentHash, HashAlgorithm, MockFetcher, RetryConfig};

    const PKG: &str = "https://example.com/containerd.io_1.2.10-3_amd64.rpm";
    const SELINUX: &str = "https://example.com/container-selinux-2.107-3.el7.noarch.rpm";

    fn sha256(bytes: &[u8]) -> String {
        ContentHash::compute(HashAlgorithm::Sha256, bytes).to_hex()
    }

    fn record() -> ArtifactRecord {
        ArtifactRecord::package("containerd.io", "1.2.10", "1.2.10-3", PKG, sha256(b"rpm"))
            .with_extra_package("container-selinux", "2.107-3", SELINUX, sha256(b"selinux"))
    }

    #[test]
    fn test_sources_include_extra_packages() {
        let record = record();
        let all = sources(&[&record]);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, PKG);
        assert_eq!(all[1].0, SELINUX);
    }

    #[test]
    fn test_fetch_all_reports_each_download() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().with(PKG, b"rpm".to_vec());
        let store =
            ArtifactStore::new(dir.path(), Box::new(fetcher)).with_retry(RetryConfig::no_retry());
        let record = record();

        let results = fetch_all(&store, &sources(&[&record]), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].1.as_ref().unwrap(), 3);
        assert!(results[1].1.is_err());
    }

    #[test]
    fn test_platforms_label() {
        let record = record();
        assert_eq!(platforms(&record), "any / any");
    }
}

mod cli;
mod commands;
mod config;
mod flags;
mod model;
mod progress;
mod runner;
mod schema;
mod systemd;
mod tasks;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Configuration file, before tilde expansion
    pub config: String,
    /// Filesystem root every task path is resolved under
    pub root: PathBuf,
    pub distribution: Option<String>,
    pub architecture: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
        root: cli.root,
        distribution: cli.distribution,
        architecture: cli.architecture,
        cache_dir: cli.cache_dir,
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args.target.as_deref()),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Render(args) => commands::render::run(&ctx, args),
        Command::Artifacts(cmd) => commands::artifacts::run(&ctx, cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "nodeup", &mut io::stdout());
            Ok(())
        }
    }
}

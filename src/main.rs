use anyhow::{bail, Context, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod assemble;
mod catalog;
mod cli;
mod cluster;
mod config;
mod exec;
mod index;
mod remote;
mod report;
mod reproduce;
mod resolve;
mod stage;
mod tokens;
mod verify;

use cli::{Command, ReconstructArgs, RootArgs, RunArgs, VerifyArgs};
use reproduce::ReplayOptions;

fn main() -> Result<()> {
    let args = RootArgs::parse();

    let filter = EnvFilter::try_from_env("CREPLAY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match args.command {
        Command::Run(args) => cmd_run(args),
        Command::Reconstruct(args) => cmd_reconstruct(args),
        Command::Verify(args) => cmd_verify(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let execution_dir = resolve_execution_dir(args.execution_dir)?;
    tracing::info!(execution_dir = %execution_dir.display(), "starting replay");
    let options = ReplayOptions {
        new_dataset: args.new_dataset,
        provenance: args.provenance,
        check_dates: args.check_dates,
    };
    let ok = reproduce::replay(&args.crate_dir, &execution_dir, &options, true)?;
    if !ok {
        bail!("replayed command exited with a failure status");
    }
    tracing::info!("workflow replay completed");
    Ok(())
}

fn cmd_reconstruct(args: ReconstructArgs) -> Result<()> {
    let execution_dir = resolve_execution_dir(args.execution_dir)?;
    let options = ReplayOptions {
        new_dataset: args.new_dataset,
        provenance: args.provenance,
        check_dates: false,
    };
    reproduce::replay(&args.crate_dir, &execution_dir, &options, false)?;
    Ok(())
}

fn cmd_verify(args: VerifyArgs) -> Result<()> {
    reproduce::verify_only(&args.crate_dir, args.check_dates)
}

fn resolve_execution_dir(requested: Option<PathBuf>) -> Result<PathBuf> {
    match requested {
        Some(dir) => {
            std::fs::create_dir_all(dir.join("log"))
                .with_context(|| format!("create {}", dir.display()))?;
            Ok(dir)
        }
        None => {
            let cwd = env::current_dir().context("resolve working directory")?;
            stage::create_execution_dir(&cwd)
        }
    }
}

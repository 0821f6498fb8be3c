//! CLI argument parsing for the replay workflow.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "creplay",
    version,
    about = "Replays recorded COMPSs workflow executions from RO-Crate provenance",
    after_help = "Commands:\n  run --crate-dir <DIR>      Verify, reconstruct, and execute the recorded run\n  command --crate-dir <DIR>  Reconstruct the command and print it (dry run)\n  verify --crate-dir <DIR>   Verify staged assets against the manifest\n\nExamples:\n  creplay run --crate-dir ./workflow-838-1.crate\n  creplay run --crate-dir ./crate --new-dataset ./fresh_inputs\n  creplay command --crate-dir ./crate --provenance\n  creplay verify --crate-dir ./crate --check-dates",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify, reconstruct, and execute the recorded workflow run
    Run(RunArgs),
    /// Reconstruct the command line and print it without executing
    #[command(name = "command")]
    Reconstruct(ReconstructArgs),
    /// Verify staged assets against the manifest and print the status table
    Verify(VerifyArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Unpacked RO-Crate directory holding the recorded run
    #[arg(long, value_name = "DIR")]
    pub crate_dir: PathBuf,

    /// Execution directory (a timestamped one is created when omitted)
    #[arg(long, value_name = "DIR")]
    pub execution_dir: Option<PathBuf>,

    /// Replay against this dataset root instead of the recorded dataset
    #[arg(long, value_name = "DIR")]
    pub new_dataset: Option<PathBuf>,

    /// Ask the runtime to record provenance for the replayed run
    #[arg(long)]
    pub provenance: bool,

    /// Also compare recorded modification times (warnings only)
    #[arg(long)]
    pub check_dates: bool,
}

#[derive(Parser, Debug)]
pub struct ReconstructArgs {
    /// Unpacked RO-Crate directory holding the recorded run
    #[arg(long, value_name = "DIR")]
    pub crate_dir: PathBuf,

    /// Execution directory (a timestamped one is created when omitted)
    #[arg(long, value_name = "DIR")]
    pub execution_dir: Option<PathBuf>,

    /// Replay against this dataset root instead of the recorded dataset
    #[arg(long, value_name = "DIR")]
    pub new_dataset: Option<PathBuf>,

    /// Include the provenance flag in the reconstructed command
    #[arg(long)]
    pub provenance: bool,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Unpacked RO-Crate directory holding the recorded run
    #[arg(long, value_name = "DIR")]
    pub crate_dir: PathBuf,

    /// Also compare recorded modification times (warnings only)
    #[arg(long)]
    pub check_dates: bool,
}

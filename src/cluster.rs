//! Execution-environment detection: SLURM cluster check and runtime
//! version probing.

use regex::Regex;
use std::process::{Command, Stdio};

/// Launcher used when submitting through a scheduler-managed cluster.
pub const CLUSTER_LAUNCHER: &str = "enqueue_compss";
/// Launcher used for direct execution on a plain machine.
pub const DIRECT_LAUNCHER: &str = "runcompss";

/// True when the current host is a SLURM submission node: `squeue` is on
/// PATH and answers.
pub fn on_slurm_cluster() -> bool {
    if which::which("squeue").is_err() {
        return false;
    }
    Command::new("squeue")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// The installed COMPSs runtime version, if the launcher is present and
/// reports one.
pub fn runtime_version() -> Option<String> {
    let output = Command::new(DIRECT_LAUNCHER).arg("-v").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let pattern = Regex::new(r"COMPSs version (\S+)").ok()?;
    pattern
        .captures(&text)
        .map(|captures| captures[1].to_string())
}

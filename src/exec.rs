//! Spawning the reconstructed command and teeing its output to the
//! console and to per-run log files.

use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

/// Run the command with stdout/stderr streamed line-by-line to the console
/// and appended to `log/out.log` / `log/err.log` under the execution
/// directory. Returns whether the command exited successfully.
pub fn execute(command: &[String], execution_path: &Path) -> Result<bool> {
    let Some((program, args)) = command.split_first() else {
        bail!("nothing to execute: reconstructed command is empty");
    };
    tracing::info!(command = %shell_words::join(command), "executing reconstructed command");

    let log_dir = execution_path.join("log");
    fs::create_dir_all(&log_dir).with_context(|| format!("create {}", log_dir.display()))?;
    let stdout_log = log_dir.join("out.log");
    let stderr_log = log_dir.join("err.log");

    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {program}"))?;
    let stdout = child.stdout.take().context("capture child stdout")?;
    let stderr = child.stderr.take().context("capture child stderr")?;
    let out_handle = spawn_tee(stdout, stdout_log.clone(), false);
    let err_handle = spawn_tee(stderr, stderr_log.clone(), true);

    let status = child.wait().context("wait for reconstructed command")?;
    join_tee(out_handle, "stdout")?;
    join_tee(err_handle, "stderr")?;

    tracing::info!(
        stdout = %stdout_log.display(),
        stderr = %stderr_log.display(),
        "command output logged"
    );
    if status.success() {
        Ok(true)
    } else {
        tracing::warn!(%status, "reconstructed command failed");
        Ok(false)
    }
}

fn spawn_tee<R: Read + Send + 'static>(
    stream: R,
    log_path: PathBuf,
    to_stderr: bool,
) -> JoinHandle<Result<()>> {
    thread::spawn(move || {
        let mut log = File::options()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("open {}", log_path.display()))?;
        for line in BufReader::new(stream).lines() {
            let line = line.context("read command output")?;
            if to_stderr {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
            writeln!(log, "{line}").with_context(|| format!("write {}", log_path.display()))?;
        }
        Ok(())
    })
}

fn join_tee(handle: JoinHandle<Result<()>>, stream: &str) -> Result<()> {
    handle
        .join()
        .map_err(|_| anyhow!("{stream} logger thread panicked"))?
}

//! Filesystem staging around a replay run: execution directory creation,
//! input copy-in, post-run result collection, and cleanup.
//!
//! Inputs are copied into the working directory before execution because
//! recorded applications sometimes address them by bare name rather than
//! through the reconstructed paths.

use crate::resolve::results::RESULT_DIR;
use anyhow::{Context, Result};
use chrono::Local;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const EXECUTION_DIR_PREFIX: &str = "replay_";

/// Create a fresh timestamped execution directory with its `log/` area.
pub fn create_execution_dir(base: &Path) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let dir = base.join(format!("{EXECUTION_DIR_PREFIX}{stamp}"));
    fs::create_dir_all(dir.join("log"))
        .with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Copy top-level application-source and dataset files into the working
/// directory. Returns the names created there, for later cleanup.
pub fn stage_inputs(crate_dir: &Path, workdir: &Path) -> Result<BTreeSet<String>> {
    let mut staged = copy_top_level_files(&crate_dir.join("application_sources"), workdir)?;
    staged.extend(copy_top_level_files(&crate_dir.join("dataset"), workdir)?);
    Ok(staged)
}

/// Copy the downloaded remote dataset (files and directories) into the
/// working directory.
pub fn stage_remote_inputs(crate_dir: &Path, workdir: &Path) -> Result<BTreeSet<String>> {
    copy_tree(&crate_dir.join("remote_dataset"), workdir)
}

/// The current top-level entry names of a directory.
pub fn snapshot_names(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read {}", dir.display()))?;
        names.insert(entry.file_name().to_string_lossy().to_string());
    }
    Ok(names)
}

/// Move entries that appeared in the working directory during execution
/// into the run's `Result/` folder. Execution directories themselves stay
/// put: a directory cannot be moved into itself.
pub fn move_new_entries(
    workdir: &Path,
    initial: &BTreeSet<String>,
    execution_path: &Path,
) -> Result<()> {
    let current = snapshot_names(workdir)?;
    let new_entries: Vec<&String> = current
        .difference(initial)
        .filter(|name| !name.starts_with(EXECUTION_DIR_PREFIX))
        .collect();
    if new_entries.is_empty() {
        return Ok(());
    }
    let result_root = execution_path.join(RESULT_DIR);
    fs::create_dir_all(&result_root)
        .with_context(|| format!("create {}", result_root.display()))?;
    for name in new_entries {
        let from = workdir.join(name);
        let to = result_root.join(name);
        fs::rename(&from, &to)
            .with_context(|| format!("move {} to {}", from.display(), to.display()))?;
        tracing::debug!(entry = %name, "moved into result folder");
    }
    Ok(())
}

/// Remove the staged input copies from the working directory. Best effort:
/// a leftover copy is worth a warning, not a failed run.
pub fn cleanup(workdir: &Path, names: &BTreeSet<String>) {
    for name in names {
        let path = workdir.join(name);
        let outcome = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else if path.exists() {
            fs::remove_file(&path)
        } else {
            continue;
        };
        if let Err(error) = outcome {
            tracing::warn!(path = %path.display(), %error, "could not remove staged copy");
        }
    }
}

fn copy_top_level_files(src: &Path, dest: &Path) -> Result<BTreeSet<String>> {
    let mut copied = BTreeSet::new();
    if !src.is_dir() {
        return Ok(copied);
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(src)
        .with_context(|| format!("read {}", src.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in entries {
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            fs::copy(&path, dest.join(name))
                .with_context(|| format!("copy {} to {}", path.display(), dest.display()))?;
            copied.insert(name.to_string());
        }
    }
    Ok(copied)
}

fn copy_tree(src: &Path, dest: &Path) -> Result<BTreeSet<String>> {
    let mut copied = BTreeSet::new();
    if !src.is_dir() {
        return Ok(copied);
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(src)
        .with_context(|| format!("read {}", src.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        copy_item(&path, &dest.join(name))?;
        copied.insert(name.to_string());
    }
    Ok(copied)
}

fn copy_item(src: &Path, dest: &Path) -> Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dest).with_context(|| format!("create {}", dest.display()))?;
        for entry in fs::read_dir(src).with_context(|| format!("read {}", src.display()))? {
            let entry = entry.with_context(|| format!("read {}", src.display()))?;
            copy_item(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        fs::copy(src, dest)
            .with_context(|| format!("copy {} to {}", src.display(), dest.display()))?;
    }
    Ok(())
}

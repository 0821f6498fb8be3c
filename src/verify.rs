//! File integrity verification against the entity catalog.
//!
//! The verifier never fails fast: every record is checked and every
//! mismatch accumulated, so one failed run reports the complete picture.
//! Callers turn the report into a hard error with [`VerificationReport::check`].

use crate::catalog::EntityCatalog;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tri-state check outcome: "not recorded in metadata" is distinct from
/// "checked and mismatched".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed,
    NotRecorded,
}

/// One verified file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub name: String,
    pub host_path: PathBuf,
    pub exists: CheckStatus,
    pub size: CheckStatus,
    pub modified: CheckStatus,
}

/// Where object entries are expected on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLocation {
    /// Under the staged crate root (data persistence was on).
    Staged,
    /// At their recorded absolute paths (data persistence was off).
    InPlace,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Compare recorded modification times as well. Off by default; date
    /// drift warns but never fails a run.
    pub check_dates: bool,
}

#[derive(Debug, Default)]
pub struct VerificationReport {
    pub records: Vec<FileRecord>,
    pub missing: Vec<PathBuf>,
    pub size_mismatches: Vec<PathBuf>,
    pub date_mismatches: Vec<PathBuf>,
}

#[derive(Debug, Error)]
#[error("{}", render_failure(.missing, .size_mismatches))]
pub struct VerificationError {
    pub missing: Vec<PathBuf>,
    pub size_mismatches: Vec<PathBuf>,
}

fn render_failure(missing: &[PathBuf], size_mismatches: &[PathBuf]) -> String {
    let mut parts = Vec::new();
    if !size_mismatches.is_empty() {
        parts.push(format!(
            "content size mismatch in files: {}",
            join_paths(size_mismatches)
        ));
    }
    if !missing.is_empty() {
        parts.push(format!("files missing: {}", join_paths(missing)));
    }
    parts.join("\n")
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl VerificationReport {
    /// One aggregate error when anything is missing or size-mismatched,
    /// enumerating every offending path once.
    pub fn check(&self) -> Result<(), VerificationError> {
        if self.missing.is_empty() && self.size_mismatches.is_empty() {
            Ok(())
        } else {
            Err(VerificationError {
                missing: self.missing.clone(),
                size_mismatches: self.size_mismatches.clone(),
            })
        }
    }

    pub fn dates_ok(&self) -> bool {
        self.date_mismatches.is_empty()
    }
}

/// Verify the instrument and every local object entry against the staged
/// filesystem (or the original absolute paths in DPF mode).
pub fn verify(
    catalog: &EntityCatalog,
    crate_root: &Path,
    location: ObjectLocation,
    options: VerifyOptions,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    let instrument_path = crate_root.join(&catalog.instrument.identifier);
    let mut instrument = FileRecord {
        name: catalog.instrument.identifier.clone(),
        host_path: instrument_path.clone(),
        exists: CheckStatus::Passed,
        size: CheckStatus::NotRecorded,
        modified: CheckStatus::NotRecorded,
    };
    match file_size(&instrument_path) {
        Some(actual) => {
            if let Some(recorded) = catalog.instrument.content_size {
                if actual == recorded {
                    instrument.size = CheckStatus::Passed;
                } else {
                    instrument.size = CheckStatus::Failed;
                    report.size_mismatches.push(instrument_path.clone());
                }
            }
        }
        None => {
            instrument.exists = CheckStatus::Failed;
            instrument.size = CheckStatus::Failed;
            report.missing.push(instrument_path);
        }
    }
    report.records.push(instrument);

    for entry in &catalog.objects {
        if entry.is_remote() {
            continue;
        }
        let host_path = match location {
            ObjectLocation::Staged => crate_root.join(&entry.identifier),
            ObjectLocation::InPlace => PathBuf::from(entry.host_path()),
        };
        let mut record = FileRecord {
            name: entry.name.clone(),
            host_path: host_path.clone(),
            exists: CheckStatus::Passed,
            size: CheckStatus::NotRecorded,
            modified: CheckStatus::NotRecorded,
        };
        let Some(actual) = file_size(&host_path) else {
            record.exists = CheckStatus::Failed;
            record.size = CheckStatus::Failed;
            report.missing.push(host_path);
            report.records.push(record);
            continue;
        };
        if let Some(recorded) = entry.content_size {
            if actual == recorded {
                record.size = CheckStatus::Passed;
            } else {
                record.size = CheckStatus::Failed;
                report.size_mismatches.push(host_path.clone());
            }
        }
        if options.check_dates {
            if let Some(recorded) = entry.date_modified.as_deref() {
                if modified_matches(&host_path, recorded) {
                    record.modified = CheckStatus::Passed;
                } else {
                    record.modified = CheckStatus::Failed;
                    report.date_mismatches.push(host_path.clone());
                }
            }
        }
        report.records.push(record);
    }

    report
}

/// Every non-remote object's recorded absolute path that is not readable
/// right now. DPF runs abort when this is non-empty.
pub fn check_accessibility(catalog: &EntityCatalog) -> Vec<PathBuf> {
    catalog
        .objects
        .iter()
        .filter(|entry| !entry.is_remote())
        .map(|entry| PathBuf::from(entry.host_path()))
        .filter(|path| fs::File::open(path).is_err())
        .collect()
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|meta| meta.len())
}

/// Mtime comparison: the file's modification time truncated to whole
/// seconds and rendered in UTC, against the recorded timestamp with its
/// trailing timezone offset stripped.
fn modified_matches(path: &Path, recorded: &str) -> bool {
    let Some(actual) = actual_modified_iso(path) else {
        return false;
    };
    actual == strip_offset(recorded)
}

fn actual_modified_iso(path: &Path) -> Option<String> {
    let mtime = fs::metadata(path).ok()?.modified().ok()?;
    let stamp: DateTime<Utc> = mtime.into();
    Some(stamp.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn strip_offset(recorded: &str) -> &str {
    if let Some(stripped) = recorded.strip_suffix('Z') {
        return stripped;
    }
    if recorded.len() > 6 {
        let tail = &recorded[recorded.len() - 6..];
        if (tail.starts_with('+') || tail.starts_with('-')) && tail.as_bytes().get(3) == Some(&b':')
        {
            return &recorded[..recorded.len() - 6];
        }
    }
    recorded
}

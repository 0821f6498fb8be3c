//! Result-path allocation: recognizing tokens that denote recorded outputs
//! and mapping them under the run's `Result/` root before any input
//! category is consulted.

use crate::catalog::ResultEntry;
use crate::resolve::normalize_token;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const RESULT_DIR: &str = "Result";

pub struct ResultAllocator<'a> {
    result_root: PathBuf,
    results: &'a [ResultEntry],
}

impl<'a> ResultAllocator<'a> {
    pub fn new(execution_root: &Path, results: &'a [ResultEntry]) -> Self {
        Self {
            result_root: execution_root.join(RESULT_DIR),
            results,
        }
    }

    pub fn result_root(&self) -> &Path {
        &self.result_root
    }

    /// Map a path-like token that denotes a recorded output. `None` means
    /// the token is not an output and falls through to the input
    /// categories.
    pub fn match_path(&self, token: &str) -> Result<Option<PathBuf>> {
        let normalized = normalize_token(token);
        if let Some(file) = &normalized.file {
            if self.matches_result_basename(file) {
                self.ensure_root()?;
                return Ok(Some(self.result_root.join(file)));
            }
            return Ok(None);
        }
        // Directory token: reuse or create a named subdirectory when the
        // token shares its final path segment with a recorded result.
        for entry in self.results {
            if let Some(segment) = common_final_segment(&normalized.dirs, &entry.identifier) {
                let dir = self.result_root.join(&segment);
                fs::create_dir_all(&dir)
                    .with_context(|| format!("create {}", dir.display()))?;
                return Ok(Some(dir));
            }
        }
        Ok(None)
    }

    /// Map a bare value token whose name matches a recorded result.
    pub fn match_value(&self, value: &str) -> Result<Option<PathBuf>> {
        if self.results.iter().any(|entry| entry.name == value) {
            self.ensure_root()?;
            return Ok(Some(self.result_root.join(value)));
        }
        Ok(None)
    }

    fn matches_result_basename(&self, file: &str) -> bool {
        self.results.iter().any(|entry| {
            entry.name == file
                || identifier_components(&entry.identifier)
                    .last()
                    .is_some_and(|last| last == file)
        })
    }

    fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.result_root)
            .with_context(|| format!("create {}", self.result_root.display()))
    }
}

/// The deepest directory segment shared by a directory token and a result
/// identifier, compared component-wise from the end so a partial segment
/// never matches.
fn common_final_segment(token_dirs: &[String], identifier: &str) -> Option<String> {
    let mut id_dirs = identifier_components(identifier);
    // The identifier names the result file; its parent is the output
    // directory being compared.
    id_dirs.pop();
    match (token_dirs.last(), id_dirs.last()) {
        (Some(a), Some(b)) if a == b => Some(a.clone()),
        _ => None,
    }
}

fn identifier_components(identifier: &str) -> Vec<String> {
    identifier
        .trim_start_matches("file://")
        .split('/')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

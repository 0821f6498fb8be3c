//! Address mapping when data persistence is off (DPF): assets were never
//! copied into the crate and live only at their recorded absolute paths on
//! the shared cluster filesystem.
//!
//! Tokens are matched by longest path suffix against the recorded object
//! and result component lists, with every candidate confirmed against the
//! live filesystem. Application sources are the one exception: they ship
//! inside the crate regardless of persistence, so they are consulted first.

use crate::catalog::EntityCatalog;
use crate::index::NameIndex;
use crate::resolve::{
    normalize_token, resolve_in_category, resolved_string, NormalizedToken, ResolutionError,
};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Allocates numbered output directories under the run's result root.
///
/// The counter is monotonic within one run so repeated output tokens never
/// collide; allocation is the one deliberately non-idempotent operation in
/// the engine.
pub struct OutputAllocator {
    result_root: PathBuf,
    counter: usize,
}

impl OutputAllocator {
    pub fn new(result_root: PathBuf) -> Self {
        Self {
            result_root,
            counter: 0,
        }
    }

    pub fn allocate(&mut self) -> Result<PathBuf> {
        let dir = self.result_root.join(format!("new_output_{}", self.counter));
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        self.counter += 1;
        Ok(dir)
    }

    pub fn allocated(&self) -> usize {
        self.counter
    }
}

pub struct DpfMapper<'a> {
    object_lists: Vec<Vec<String>>,
    result_lists: Vec<Vec<String>>,
    app_index: &'a NameIndex,
    allocator: OutputAllocator,
}

impl<'a> DpfMapper<'a> {
    pub fn new(catalog: &EntityCatalog, app_index: &'a NameIndex, result_root: PathBuf) -> Self {
        let result_lists: Vec<Vec<String>> = catalog
            .results
            .iter()
            .map(|entry| absolute_components(&entry.identifier))
            .collect();
        // Result identifiers can double as object entries; those belong to
        // the result side only.
        let object_lists = catalog
            .objects
            .iter()
            .filter(|entry| !entry.is_remote())
            .map(|entry| absolute_components(&entry.identifier))
            .filter(|list| !result_lists.contains(list))
            .collect();
        Self {
            object_lists,
            result_lists,
            app_index,
            allocator: OutputAllocator::new(result_root),
        }
    }

    pub fn outputs_allocated(&self) -> usize {
        self.allocator.allocated()
    }

    /// Resolve one path-like token to an absolute path or a fresh output
    /// directory.
    pub fn resolve(&mut self, token: &str) -> Result<String> {
        let normalized = normalize_token(token);
        if let Ok(path) = resolve_in_category(self.app_index, &normalized) {
            return Ok(resolved_string(token, &path));
        }

        let mut best_len = 0usize;
        let mut mapped: Option<PathBuf> = None;
        let mut is_result = false;

        // Scan token components from the deepest outward; at each position
        // the longest existing suffix match is taken per list family.
        for position in (0..normalized.dirs.len()).rev() {
            let result_len = best_match(&self.result_lists, &normalized, position)
                .map(|(len, _)| len)
                .unwrap_or(0);
            let (object_len, object_path) =
                match best_match(&self.object_lists, &normalized, position) {
                    Some((len, path)) => (len, Some(path)),
                    None => (0, None),
                };
            if result_len == 0 && object_len == 0 {
                continue;
            }
            // The result branch wins only on a strictly longer match; an
            // equal-length tie resolves to the object side.
            if result_len > object_len {
                if result_len > best_len {
                    best_len = result_len;
                    is_result = true;
                }
            } else if object_len > best_len {
                best_len = object_len;
                mapped = object_path;
                is_result = false;
            }
        }

        if is_result {
            let dir = self.allocator.allocate()?;
            return Ok(format!("{}/", dir.display()));
        }
        let Some(base) = mapped else {
            return Err(ResolutionError::Unmapped {
                token: token.to_string(),
            }
            .into());
        };
        match &normalized.file {
            Some(file) => {
                let full = base.join(file);
                if full.exists() {
                    Ok(full.display().to_string())
                } else {
                    Err(ResolutionError::Unmapped {
                        token: token.to_string(),
                    }
                    .into())
                }
            }
            None => Ok(resolved_string(token, &base)),
        }
    }
}

/// Longest existing suffix match of `token.dirs[position]` across the
/// catalogued component lists: the matched prefix joined with the token's
/// remaining directory components must exist on the real filesystem.
fn best_match(
    lists: &[Vec<String>],
    token: &NormalizedToken,
    position: usize,
) -> Option<(usize, PathBuf)> {
    let component = &token.dirs[position];
    let mut best: Option<(usize, PathBuf)> = None;
    for list in lists {
        let Some(anchor) = list.iter().rposition(|c| c == component) else {
            continue;
        };
        let mut path = PathBuf::from("/");
        for part in &list[..=anchor] {
            path.push(part);
        }
        for part in &token.dirs[position + 1..] {
            path.push(part);
        }
        if !path.exists() {
            continue;
        }
        let len = anchor + 1;
        if best.as_ref().is_none_or(|(current, _)| len > *current) {
            best = Some((len, path));
        }
    }
    best
}

fn absolute_components(identifier: &str) -> Vec<String> {
    let path = match identifier.strip_prefix("file://") {
        Some(rest) => match rest.find('/') {
            Some(slash) => &rest[slash..],
            None => "",
        },
        None => identifier,
    };
    path.split('/')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

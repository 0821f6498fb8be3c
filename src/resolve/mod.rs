//! Address resolution: mapping recorded path references onto the staged
//! filesystem layout.
//!
//! Local mode resolves a token against category name indexes in a fixed
//! priority order; the first category that succeeds wins and all failures
//! are aggregated into a single error. DPF mode ([`dpf`]) matches against
//! the absolute paths recorded in the manifest instead.

pub mod dpf;
pub mod results;

use crate::index::NameIndex;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A resolved path-like token, still tagged with its original position.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub original: String,
    pub resolved: String,
    pub index: usize,
}

/// Why one category could not map a token.
#[derive(Debug, Clone)]
pub struct CategoryFailure {
    pub category: &'static str,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Local mode: every attempted category failed. Carries one reason per
    /// category so the caller sees the whole picture at once.
    #[error("could not map `{token}` in any category:\n{}", render_failures(.attempts))]
    AllCategoriesFailed {
        token: String,
        attempts: Vec<CategoryFailure>,
    },

    /// DPF mode: the token matched neither the recorded object paths nor
    /// the recorded result paths. Hard failure: there is nothing local to
    /// fall back to.
    #[error("could not map `{token}` against any recorded object or result path")]
    Unmapped { token: String },
}

fn render_failures(attempts: &[CategoryFailure]) -> String {
    attempts
        .iter()
        .map(|failure| format!("  {}: {}", failure.category, failure.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Asset categories, in the vocabulary of the staged crate layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    ApplicationSources,
    Dataset,
    NewDataset,
    RemoteDataset,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::ApplicationSources => "application sources",
            Category::Dataset => "dataset",
            Category::NewDataset => "new dataset",
            Category::RemoteDataset => "remote dataset",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Category::ApplicationSources => "application_sources",
            Category::Dataset => "dataset",
            Category::NewDataset => "new_dataset",
            Category::RemoteDataset => "remote_dataset",
        }
    }
}

/// One category root with its name index, tried in slice order by
/// [`resolve_local`].
pub struct CategoryResolver<'a> {
    pub category: Category,
    pub index: &'a NameIndex,
}

/// A token normalized for component-wise matching: leading `./` stripped,
/// rooted, split into directory components with a trailing filename
/// separated off unless the token names a directory.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedToken {
    pub dirs: Vec<String>,
    pub file: Option<String>,
}

pub(crate) fn normalize_token(token: &str) -> NormalizedToken {
    let rooted = match token.strip_prefix("./") {
        Some(rest) => format!("/{rest}"),
        None if token.starts_with('/') => token.to_string(),
        None => format!("/{token}"),
    };
    let is_dir = rooted.ends_with('/');
    let mut dirs: Vec<String> = rooted
        .split('/')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    let file = if is_dir { None } else { dirs.pop() };
    NormalizedToken { dirs, file }
}

/// Directory tokens keep their trailing separator through resolution.
pub(crate) fn resolved_string(original: &str, path: &Path) -> String {
    let mut rendered = path.display().to_string();
    if original.ends_with('/') && !rendered.ends_with('/') {
        rendered.push('/');
    }
    rendered
}

/// Resolve one normalized token inside a single category.
///
/// Directory components are scanned left to right; the first component
/// known to the index that rebuilds into an existing path under the
/// category root becomes the anchor. A split-off filename is appended to
/// the anchor (or to the category root when nothing anchored) and must
/// exist.
pub(crate) fn resolve_in_category(
    index: &NameIndex,
    token: &NormalizedToken,
) -> Result<PathBuf, String> {
    let mut anchor: Option<PathBuf> = None;
    for (position, component) in token.dirs.iter().enumerate() {
        if !index.contains(component) {
            continue;
        }
        let mut candidate = index.root().join(component);
        for rest in &token.dirs[position + 1..] {
            candidate.push(rest);
        }
        if candidate.exists() {
            anchor = Some(candidate);
            break;
        }
    }

    match (&token.file, anchor) {
        (Some(file), anchor) => {
            let base = anchor.unwrap_or_else(|| index.root().to_path_buf());
            let full = base.join(file);
            if full.exists() {
                Ok(full)
            } else {
                Err(format!("no entry `{}` under {}", file, base.display()))
            }
        }
        (None, Some(anchor)) => Ok(anchor),
        (None, None) => Err(format!(
            "no directory component matched under {}",
            index.root().display()
        )),
    }
}

/// Resolve a path-like token against categories in priority order. The
/// first category that succeeds wins; if all fail, the per-category
/// reasons are aggregated into one [`ResolutionError`].
pub fn resolve_local(
    token: &str,
    categories: &[CategoryResolver<'_>],
) -> Result<PathBuf, ResolutionError> {
    let normalized = normalize_token(token);
    let mut attempts = Vec::with_capacity(categories.len());
    for resolver in categories {
        match resolve_in_category(resolver.index, &normalized) {
            Ok(path) => return Ok(path),
            Err(reason) => attempts.push(CategoryFailure {
                category: resolver.category.label(),
                reason,
            }),
        }
    }
    Err(ResolutionError::AllCategoriesFailed {
        token: token.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdirs");
        }
        fs::write(path, b"x").expect("touch");
    }

    #[test]
    fn normalizes_relative_and_rooted_tokens_alike() {
        for token in ["./data/in.txt", "/data/in.txt", "data/in.txt"] {
            let norm = normalize_token(token);
            assert_eq!(norm.dirs, vec!["data".to_string()]);
            assert_eq!(norm.file.as_deref(), Some("in.txt"));
        }
        let dir = normalize_token("data/out/");
        assert_eq!(dir.dirs, vec!["data".to_string(), "out".to_string()]);
        assert!(dir.file.is_none());
    }

    #[test]
    fn anchors_on_first_component_that_rebuilds() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("dataset");
        touch(&root.join("input/sub/a.txt"));
        let index = NameIndex::build(&root).expect("index");

        let norm = normalize_token("/scratch/run/input/sub/a.txt");
        let resolved = resolve_in_category(&index, &norm).expect("resolve");
        assert_eq!(resolved, root.join("input/sub/a.txt"));
    }

    #[test]
    fn falls_back_to_category_root_for_plain_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("dataset");
        touch(&root.join("a.txt"));
        let index = NameIndex::build(&root).expect("index");

        let norm = normalize_token("/somewhere/else/a.txt");
        let resolved = resolve_in_category(&index, &norm).expect("resolve");
        assert_eq!(resolved, root.join("a.txt"));
    }

    #[test]
    fn application_sources_win_over_dataset() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let app_root = tmp.path().join("application_sources");
        let data_root = tmp.path().join("dataset");
        touch(&app_root.join("shared.txt"));
        touch(&data_root.join("shared.txt"));
        let app = NameIndex::build(&app_root).expect("index");
        let data = NameIndex::build(&data_root).expect("index");

        let categories = [
            CategoryResolver {
                category: Category::ApplicationSources,
                index: &app,
            },
            CategoryResolver {
                category: Category::Dataset,
                index: &data,
            },
        ];
        let resolved = resolve_local("./shared.txt", &categories).expect("resolve");
        assert_eq!(resolved, app_root.join("shared.txt"));
    }

    #[test]
    fn resolution_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("dataset");
        touch(&root.join("input/a.txt"));
        let index = NameIndex::build(&root).expect("index");
        let categories = [CategoryResolver {
            category: Category::Dataset,
            index: &index,
        }];

        let first = resolve_local("/data/input/a.txt", &categories).expect("resolve");
        let second = resolve_local("/data/input/a.txt", &categories).expect("resolve");
        assert_eq!(first, second);
    }

    #[test]
    fn aggregates_every_category_failure() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let app = NameIndex::build(&tmp.path().join("application_sources")).expect("index");
        let data = NameIndex::build(&tmp.path().join("dataset")).expect("index");
        let categories = [
            CategoryResolver {
                category: Category::ApplicationSources,
                index: &app,
            },
            CategoryResolver {
                category: Category::Dataset,
                index: &data,
            },
        ];

        let err = resolve_local("/nowhere/missing.txt", &categories).unwrap_err();
        match &err {
            ResolutionError::AllCategoriesFailed { token, attempts } => {
                assert_eq!(token, "/nowhere/missing.txt");
                assert_eq!(attempts.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("application sources"));
        assert!(message.contains("dataset"));
    }

    #[test]
    fn directory_tokens_keep_their_trailing_separator() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("dataset");
        fs::create_dir_all(root.join("out")).expect("mkdirs");
        let index = NameIndex::build(&root).expect("index");

        let norm = normalize_token("/data/out/");
        let resolved = resolve_in_category(&index, &norm).expect("resolve");
        let rendered = resolved_string("/data/out/", &resolved);
        assert!(rendered.ends_with("out/"));
    }
}

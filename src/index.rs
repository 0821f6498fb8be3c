//! Per-category name index: base filename to full path.
//!
//! One index is built per asset category root (application sources,
//! dataset, new dataset, remote dataset) at the start of a reconstruction
//! run and discarded afterwards. Both files and directories are indexed:
//! directory names serve as anchors for path rebuilding, file names serve
//! bare-filename lookups.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct NameIndex {
    root: PathBuf,
    entries: BTreeMap<String, PathBuf>,
}

impl NameIndex {
    /// Walk `root` recursively and index every entry by base name. The root
    /// is created when absent so a category can legitimately be empty.
    /// On duplicate base names the first entry in sorted walk order wins.
    pub fn build(root: &Path) -> Result<Self> {
        if !root.exists() {
            fs::create_dir_all(root).with_context(|| format!("create {}", root.display()))?;
        }
        let mut entries = BTreeMap::new();
        walk(root, &mut entries)?;
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn walk(dir: &Path, entries: &mut BTreeMap<String, PathBuf>) -> Result<()> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .with_context(|| format!("read {}", dir.display()))?;
    children.sort();
    for child in children {
        if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
            entries
                .entry(name.to_string())
                .or_insert_with(|| child.clone());
        }
        if child.is_dir() {
            walk(&child, entries)?;
        }
    }
    Ok(())
}

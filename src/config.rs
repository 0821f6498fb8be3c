//! Crate-info YAML loading.
//!
//! Every crate ships a workflow-information YAML next to the manifest. Its
//! file name is not fixed (`ro-crate-info.yaml` is common but not
//! guaranteed), so the first `.yaml` entry in the crate root wins.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct CrateInfo {
    #[serde(default, rename = "COMPSs Workflow Information")]
    pub workflow: WorkflowInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkflowInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_persistence: Option<bool>,
}

impl CrateInfo {
    pub fn load(crate_root: &Path) -> Result<Self> {
        let path = find_info_yaml(crate_root)?;
        let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let info: CrateInfo =
            serde_yaml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        Ok(info)
    }

    /// Whether the crate was packed with its datasets included. Crates
    /// without the key predate the flag and are treated as not persistent.
    pub fn data_persistent(&self) -> bool {
        self.workflow.data_persistence.unwrap_or(false)
    }
}

fn find_info_yaml(crate_root: &Path) -> Result<PathBuf> {
    let mut names: Vec<PathBuf> = fs::read_dir(crate_root)
        .with_context(|| format!("read {}", crate_root.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("yaml"))
        .collect();
    names.sort();
    names
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no workflow-information YAML found in {}", crate_root.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_data_persistence_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("ro-crate-info.yaml"),
            "COMPSs Workflow Information:\n  name: matmul\n  data_persistence: true\nAuthors:\n  - name: someone\n",
        )
        .expect("write yaml");
        let info = CrateInfo::load(dir.path()).expect("load info");
        assert!(info.data_persistent());
        assert_eq!(info.workflow.name.as_deref(), Some("matmul"));
    }

    #[test]
    fn missing_flag_reads_as_not_persistent() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("info.yaml"),
            "COMPSs Workflow Information:\n  name: kmeans\n",
        )
        .expect("write yaml");
        let info = CrateInfo::load(dir.path()).expect("load info");
        assert!(!info.data_persistent());
    }

    #[test]
    fn missing_yaml_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(CrateInfo::load(dir.path()).is_err());
    }
}

//! Remote dataset handling: downloading `http`-identified objects into the
//! crate's `remote_dataset/` area and checking their recorded sizes.

use crate::catalog::EntityCatalog;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Download every remote object into `<crate>/remote_dataset/<name>`.
///
/// Returns the fetched objects as name → identifier; an empty map means
/// the run has no remote dataset and the category stays inactive.
pub fn fetch_remote_objects(
    catalog: &EntityCatalog,
    crate_dir: &Path,
) -> Result<BTreeMap<String, String>> {
    let mut fetched = BTreeMap::new();
    let dest_root = crate_dir.join("remote_dataset");
    for entry in catalog.objects.iter().filter(|entry| entry.is_remote()) {
        fs::create_dir_all(&dest_root)
            .with_context(|| format!("create {}", dest_root.display()))?;
        let dest = dest_root.join(&entry.name);
        tracing::info!(name = %entry.name, url = %entry.identifier, "downloading remote object");
        download(&entry.identifier, &dest)
            .with_context(|| format!("download remote object {}", entry.name))?;

        match entry.content_size {
            Some(expected) => {
                let actual = fs::metadata(&dest)
                    .with_context(|| format!("stat {}", dest.display()))?
                    .len();
                if actual == expected {
                    tracing::info!(name = %entry.name, size = actual, "remote object size verified");
                } else {
                    tracing::warn!(
                        name = %entry.name,
                        expected,
                        actual,
                        "remote object size differs from the recorded size"
                    );
                }
            }
            None => {
                tracing::info!(
                    name = %entry.name,
                    "remote object downloaded; no recorded size to verify against"
                );
            }
        }
        fetched.insert(entry.name.clone(), entry.identifier.clone());
    }
    Ok(fetched)
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let mut response = ureq::get(url).call().with_context(|| format!("fetch {url}"))?;
    // Stream into a sibling temp file, then rename, so an interrupted
    // download never leaves a half-written object behind.
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download");
    let tmp_path = dest
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.tmp"));
    let mut file =
        fs::File::create(&tmp_path).with_context(|| format!("create {}", tmp_path.display()))?;
    std::io::copy(&mut response.body_mut().as_reader(), &mut file)
        .with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, dest).with_context(|| format!("publish {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InstrumentEntry, ObjectEntry};

    #[test]
    fn no_remote_objects_means_no_fetching() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let catalog = EntityCatalog {
            instrument: InstrumentEntry {
                identifier: "application_sources/main.py".into(),
                content_size: None,
            },
            objects: vec![ObjectEntry {
                name: "in.txt".into(),
                identifier: "dataset/in.txt".into(),
                content_size: None,
                date_modified: None,
            }],
            results: Vec::new(),
            data_persistent: true,
        };
        let fetched = fetch_remote_objects(&catalog, tmp.path()).expect("fetch");
        assert!(fetched.is_empty());
        assert!(!tmp.path().join("remote_dataset").exists());
    }
}

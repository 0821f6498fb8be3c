//! Read-only entity catalog over an RO-Crate provenance manifest.
//!
//! The manifest (`ro-crate-metadata.json`) is JSON-LD: a flat `@graph` of
//! entities keyed by `@id`. The catalog exposes only what reconstruction and
//! verification need: the `CreateAction`'s instrument, its object entries
//! (inputs) and result entries (outputs), each joined with the per-entity
//! `name`, `contentSize` and `dateModified` fields.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const METADATA_FILE: &str = "ro-crate-metadata.json";

/// Errors raised while loading or interpreting the manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("manifest has no @graph entity list")]
    MissingGraph,

    #[error("manifest has no CreateAction entity")]
    MissingCreateAction,

    #[error("manifest CreateAction has no instrument")]
    MissingInstrument,
}

/// The recorded application entry point.
#[derive(Debug, Clone)]
pub struct InstrumentEntry {
    pub identifier: String,
    pub content_size: Option<u64>,
}

/// One recorded input of the workflow run.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub name: String,
    pub identifier: String,
    pub content_size: Option<u64>,
    pub date_modified: Option<String>,
}

/// One recorded output of the workflow run.
#[derive(Debug, Clone)]
pub struct ResultEntry {
    pub name: String,
    pub identifier: String,
}

/// Immutable view over the manifest, owned by the caller and passed by
/// reference into the engine.
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    pub instrument: InstrumentEntry,
    pub objects: Vec<ObjectEntry>,
    pub results: Vec<ResultEntry>,
    pub data_persistent: bool,
}

impl ObjectEntry {
    /// Remote objects live behind an `http(s)` identifier and are never
    /// expected under the staged crate.
    pub fn is_remote(&self) -> bool {
        self.identifier.starts_with("http")
    }

    /// The identifier with any `file://<host>` prefix removed, leaving the
    /// absolute path recorded on the original machine.
    pub fn host_path(&self) -> String {
        strip_file_scheme(&self.identifier)
    }
}

impl EntityCatalog {
    /// Load the catalog from `<crate_root>/ro-crate-metadata.json`.
    ///
    /// `data_persistent` comes from the crate-info YAML, not the manifest;
    /// the caller supplies it so the catalog is complete once built.
    pub fn load(crate_root: &Path, data_persistent: bool) -> Result<Self, ManifestError> {
        let path = crate_root.join(METADATA_FILE);
        let raw = fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        let root: Value =
            serde_json::from_str(&raw).map_err(|source| ManifestError::Parse { path, source })?;
        Self::from_graph(&root, data_persistent)
    }

    fn from_graph(root: &Value, data_persistent: bool) -> Result<Self, ManifestError> {
        let graph = root
            .get("@graph")
            .and_then(Value::as_array)
            .ok_or(ManifestError::MissingGraph)?;

        let create_action = graph
            .iter()
            .find(|entity| type_matches(entity, "CreateAction"))
            .ok_or(ManifestError::MissingCreateAction)?;

        let instrument_id = create_action
            .get("instrument")
            .and_then(entity_ref_id)
            .ok_or(ManifestError::MissingInstrument)?;
        let instrument = InstrumentEntry {
            content_size: lookup(graph, &instrument_id).and_then(content_size_of),
            identifier: instrument_id,
        };

        let mut objects = Vec::new();
        for id in entity_ref_list(create_action.get("object")) {
            let Some(entity) = lookup(graph, &id) else {
                objects.push(entry_without_metadata(&id));
                continue;
            };
            // Composite objects carry their real parts under hasPart.
            let parts = entity_ref_list(entity.get("hasPart"));
            if parts.is_empty() {
                objects.push(object_entry(graph, &id));
            } else {
                for part in parts {
                    objects.push(object_entry(graph, &part));
                }
            }
        }

        let results = entity_ref_list(create_action.get("result"))
            .into_iter()
            .map(|id| ResultEntry {
                name: name_of(graph, &id),
                identifier: id,
            })
            .collect();

        Ok(EntityCatalog {
            instrument,
            objects,
            results,
            data_persistent,
        })
    }

    /// True when at least one object must be fetched over the network.
    pub fn has_remote_objects(&self) -> bool {
        self.objects.iter().any(ObjectEntry::is_remote)
    }
}

fn lookup<'a>(graph: &'a [Value], id: &str) -> Option<&'a Value> {
    graph
        .iter()
        .find(|entity| entity.get("@id").and_then(Value::as_str) == Some(id))
}

/// `@type` may be a single string or an array of strings.
fn type_matches(entity: &Value, wanted: &str) -> bool {
    match entity.get("@type") {
        Some(Value::String(ty)) => ty == wanted,
        Some(Value::Array(types)) => types.iter().any(|ty| ty.as_str() == Some(wanted)),
        _ => false,
    }
}

/// An entity reference is either `{"@id": "..."}` or a bare string.
fn entity_ref_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(_) => value
            .get("@id")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// A reference list may be absent, a single reference, or an array.
fn entity_ref_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(entity_ref_id).collect(),
        Some(single) => entity_ref_id(single).into_iter().collect(),
        None => Vec::new(),
    }
}

fn object_entry(graph: &[Value], id: &str) -> ObjectEntry {
    let entity = lookup(graph, id);
    ObjectEntry {
        name: entity
            .and_then(|e| e.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| basename_of(id)),
        identifier: id.to_string(),
        content_size: entity.and_then(content_size_of),
        date_modified: entity
            .and_then(|e| e.get("dateModified").and_then(Value::as_str))
            .map(str::to_string),
    }
}

fn entry_without_metadata(id: &str) -> ObjectEntry {
    ObjectEntry {
        name: basename_of(id),
        identifier: id.to_string(),
        content_size: None,
        date_modified: None,
    }
}

fn name_of(graph: &[Value], id: &str) -> String {
    lookup(graph, id)
        .and_then(|e| e.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| basename_of(id))
}

/// Crates in the wild record `contentSize` as either a number or a string.
fn content_size_of(entity: &Value) -> Option<u64> {
    match entity.get("contentSize") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn basename_of(id: &str) -> String {
    strip_file_scheme(id)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(id)
        .to_string()
}

fn strip_file_scheme(id: &str) -> String {
    match id.strip_prefix("file://") {
        Some(rest) => {
            // Drop the authority component, keep the absolute path.
            match rest.find('/') {
                Some(slash) => rest[slash..].to_string(),
                None => String::new(),
            }
        }
        None => id.to_string(),
    }
}

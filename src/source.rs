//! Where batches come from
//!
//! Registrations are stored as batched JSON blobs in a blob store; the most
//! recent blob under a prefix is the current batch. The store itself is an
//! opaque collaborator behind [`BlobStore`]; [`FsBlobStore`] backs it with a
//! local directory.

use crate::error::{ArtifactContext, ExportError, Result};
use crate::types::Batch;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const REGISTRATIONS_PREFIX: &str = "source/registrations";
pub const FORMS_PREFIX: &str = "source/surveys/folders";
pub const ATTACHMENTS_PREFIX: &str = "attachments";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A listed blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub name: String,
    pub content_type: Option<String>,
}

/// Read access to a blob store
pub trait BlobStore {
    /// Blobs whose name starts with `prefix`, ordered by name
    fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>>;

    fn read(&self, name: &str) -> Result<Vec<u8>>;
}

/// A blob store over a local directory; blob names are `/`-separated paths
/// relative to the root
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsBlobStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collect(&self, dir: &Path, names: &mut Vec<String>) -> Result<()> {
        for entry in std::fs::read_dir(dir).artifact(dir)? {
            let path = entry.artifact(dir)?.path();
            if path.is_dir() {
                self.collect(&path, names)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>> {
        let mut names = Vec::new();
        if self.root.is_dir() {
            self.collect(&self.root, &mut names)?;
        }
        names.retain(|name| name.starts_with(prefix));
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| BlobMeta {
                content_type: guess_content_type(&name).map(String::from),
                name,
            })
            .collect())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(name);
        std::fs::read(&path).artifact(path)
    }
}

fn guess_content_type(name: &str) -> Option<&'static str> {
    let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "json" => Some("application/json"),
        "csv" => Some("text/csv"),
        "zip" => Some("application/zip"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Decode a JSON blob, trying the SIMD parser first
pub fn decode_document(bytes: &[u8], name: &str) -> Result<Value> {
    // simd-json parses in place and leaves the buffer unusable on failure
    let mut scratch = bytes.to_vec();
    match simd_json::serde::from_slice::<Value>(&mut scratch) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_slice(bytes)
            .map_err(|e| ExportError::malformed_with(format!("blob {name} is not JSON"), e)),
    }
}

/// Decode the most recent blob under `prefix`
pub fn latest_document(store: &dyn BlobStore, prefix: &str) -> Result<Value> {
    let blobs = store.list(prefix)?;
    let Some(latest) = blobs.last() else {
        return Err(ExportError::registrations_not_found(prefix));
    };

    info!(blob = %latest.name, "downloading latest batch");
    let bytes = store.read(&latest.name)?;
    decode_document(&bytes, &latest.name)
}

/// Load the current batch of registrations of a survey
pub fn load_batch(store: &dyn BlobStore, survey_id: &str) -> Result<Batch> {
    let prefix = format!("{REGISTRATIONS_PREFIX}/{survey_id}");
    let document = latest_document(store, &prefix)?;
    let batch = Batch::from_document(document, &prefix)?;
    debug!(survey = survey_id, registrations = batch.len(), "loaded batch");
    Ok(batch)
}

/// One survey form available for export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSummary {
    pub survey_id: String,
    pub name: String,
    pub has_images: bool,
    pub description_text: String,
}

/// List every form per folder, with whether it has stored attachments
pub fn list_forms(store: &dyn BlobStore) -> Result<IndexMap<String, Vec<FormSummary>>> {
    let document = latest_document(store, FORMS_PREFIX)?;
    let Value::Object(folders) = document else {
        return Err(ExportError::malformed("forms document is not a mapping"));
    };
    if folders.is_empty() {
        return Err(ExportError::registrations_not_found(FORMS_PREFIX));
    }

    let mut forms = IndexMap::new();
    for (folder, entries) in folders.iter() {
        let Value::Array(entries) = entries else {
            return Err(ExportError::malformed(format!(
                "forms of folder {folder} are not a sequence"
            )));
        };

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            let properties = entry
                .get("properties")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    ExportError::malformed(format!("form in folder {folder} has no properties"))
                })?;
            let survey_id = properties
                .get("view_id")
                .and_then(scalar_text)
                .ok_or_else(|| {
                    ExportError::malformed(format!("form in folder {folder} has no view_id"))
                })?;

            summaries.push(FormSummary {
                has_images: has_attachments(store, &survey_id)?,
                name: properties
                    .get("label_text")
                    .and_then(scalar_text)
                    .unwrap_or_default(),
                description_text: properties
                    .get("description_text")
                    .and_then(scalar_text)
                    .unwrap_or_default(),
                survey_id,
            });
        }
        forms.insert(folder.clone(), summaries);
    }

    Ok(forms)
}

/// Attachment blobs of a survey, or of one registration, mapped to their
/// content type
pub fn list_attachments(
    store: &dyn BlobStore,
    survey_id: &str,
    registration_id: Option<&str>,
) -> Result<IndexMap<String, String>> {
    let prefix = format!(
        "{ATTACHMENTS_PREFIX}/{survey_id}/{}",
        registration_id.unwrap_or_default()
    );

    let attachments: IndexMap<String, String> = store
        .list(&prefix)?
        .into_iter()
        .map(|blob| {
            let content_type = blob
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
            (blob.name, content_type)
        })
        .collect();

    if attachments.is_empty() {
        return Err(ExportError::attachments_not_found(prefix));
    }
    Ok(attachments)
}

pub fn has_attachments(store: &dyn BlobStore, view_id: &str) -> Result<bool> {
    let prefix = format!("{ATTACHMENTS_PREFIX}/{view_id}");
    Ok(!store.list(&prefix)?.is_empty())
}

/// Text form of a string or number value
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

//! # Survey Export - Registrations to CSV and ZIP
//!
//! Turns batches of survey registrations (nested JSON documents whose shape
//! varies per registration) into flat tabular artifacts.
//!
//! ## Modules
//!
//! - **flatten**: classify fields and collapse nested mappings into dotted paths
//! - **subform**: per-field tables with an evolving column schema
//! - **export**: the CSV and ZIP renderers and their scoped temp directory
//! - **source**: loading the latest batch from a blob store
//! - **listing**: registration overviews per form
//!
//! ## Quick Start
//!
//! ```rust
//! use survey_export::{Batch, ExportScope, SurveyExporter};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let batch = Batch::from_document(
//!     json!({
//!         "elements": [{
//!             "meta": {"serialNumber": "s1"},
//!             "data": {
//!                 "siteID": "UT-1",
//!                 "location": {"city": "Utrecht", "street": "Main"},
//!                 "masts": [{"code": "A", "height": 30}]
//!             }
//!         }]
//!     }),
//!     "source/registrations/7",
//! )?;
//!
//! let exporter = SurveyExporter::default();
//! let csv = exporter.render_csv(&batch)?;
//!
//! let scope = ExportScope::fresh(&std::env::temp_dir())?;
//! let archive = exporter.render_zip(&batch, &scope)?;
//! // surveys_main.csv + masts.csv, gone once `scope` is dropped
//! # let _ = (csv, archive);
//! # Ok(())
//! # }
//! ```

use std::io::Write;

pub mod error;
pub mod export;
pub mod flatten;
pub mod listing;
pub mod source;
pub mod subform;
pub mod types;

pub use error::{ExportError, Result};
pub use export::{ExportScope, SurveyExporter};
pub use flatten::{classify, FieldShape, ListKeys, PathFlattener};
pub use listing::{registration_list, RegistrationSummary};
pub use source::{load_batch, BlobStore, FsBlobStore};
pub use subform::{ColumnSchema, SubformAccumulator, SubformWriter};
pub use types::{Batch, ExportConfig, Registration};

/// Export a survey's latest batch as CSV into `writer`
pub fn export_csv<W: Write>(
    store: &dyn BlobStore,
    survey_id: &str,
    config: ExportConfig,
    mut writer: W,
) -> Result<()> {
    let batch = load_batch(store, survey_id)?;
    let bytes = SurveyExporter::new(config).render_csv(&batch)?;
    writer
        .write_all(&bytes)
        .map_err(|source| ExportError::Artifact {
            path: "<output>".into(),
            source,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_csv_from_store() {
        let root = tempfile::tempdir().unwrap();
        let blob = root.path().join("source/registrations/7/batch.json");
        std::fs::create_dir_all(blob.parent().unwrap()).unwrap();
        std::fs::write(
            &blob,
            r#"{"elements": [{"meta": {"serialNumber": "s1"}, "data": {"a": 1, "b": "x"}}]}"#,
        )
        .unwrap();

        let mut out = Vec::new();
        export_csv(&FsBlobStore::new(root.path()), "7", ExportConfig::default(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a;b\n1;x\n");
    }
}

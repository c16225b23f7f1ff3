//! Batch export: a flat CSV, or a ZIP of the main table plus subform tables
//!
//! `render_csv` keeps every field inline in one table. `render_zip` keeps
//! scalars and uniform mappings in the main table and moves heterogeneous
//! mappings and lists of mappings into subform tables joined back on the
//! serial number.

pub mod scope;
pub mod table;

pub use scope::ExportScope;
pub use table::MainTable;

use crate::error::{ArtifactContext, ExportError, Result};
use crate::flatten::classify::{classify, FieldShape};
use crate::flatten::paths::{FlatRow, ListKeys, PathFlattener};
use crate::subform::accumulator::AssembledSubform;
use crate::subform::writer::SubformWriter;
use crate::types::{Batch, ExportConfig};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Renders batches of registrations into tabular artifacts
pub struct SurveyExporter {
    config: ExportConfig,
    flattener: PathFlattener,
    csv_flattener: PathFlattener,
}

impl Default for SurveyExporter {
    fn default() -> Self {
        SurveyExporter::new(ExportConfig::default())
    }
}

impl SurveyExporter {
    pub fn new(config: ExportConfig) -> Self {
        SurveyExporter {
            flattener: PathFlattener::from_config(&config),
            csv_flattener: PathFlattener::from_config(&config)
                .with_list_keys(ListKeys::ItemsSegment),
            config,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Render the whole batch as one CSV with every field flattened inline
    ///
    /// Lists of mappings expand below their field (`masts.items__0.code`).
    pub fn render_csv(&self, batch: &Batch) -> Result<Vec<u8>> {
        ensure_registrations(batch)?;

        let mut table = MainTable::new();
        for (_, registration) in batch.iter() {
            let mut row = FlatRow::new();
            for (key, value) in registration.data()?.iter() {
                self.csv_flattener.flatten_field(key, value, &mut row);
            }
            table.push(row);
        }

        let mut out = Vec::new();
        table.write_to(&mut out, self.config.main_delimiter)?;
        info!(
            registrations = table.len(),
            columns = table.columns().len(),
            "rendered csv export"
        );
        Ok(out)
    }

    /// Render the batch into a ZIP archive inside `scope`
    ///
    /// The returned path points into the scope and is removed with it.
    pub fn render_zip(&self, batch: &Batch, scope: &ExportScope) -> Result<PathBuf> {
        ensure_registrations(batch)?;

        let serial_column = &self.config.serial_column;
        let mut subforms = SubformWriter::new(scope.path("parts"), &self.config)?;
        let mut table = MainTable::new();

        for (serial_number, registration) in batch.iter() {
            let mut row = FlatRow::new();
            row.insert(serial_column.clone(), Value::String(serial_number.clone()));

            for (key, value) in registration.data()?.iter() {
                match (classify(value), value) {
                    (FieldShape::Scalar, _) => {
                        if key != serial_column {
                            row.insert(key.clone(), value.clone());
                        }
                    }
                    (FieldShape::UniformMapping, _) => {
                        self.flattener.flatten_field(key, value, &mut row);
                    }
                    (FieldShape::HeterogeneousMapping, Value::Object(obj)) => {
                        subforms.write_mapping(key, serial_number, obj)?;
                    }
                    (FieldShape::SequenceOfMappings, Value::Array(items)) => {
                        for item in items.iter() {
                            if let Value::Object(obj) = item {
                                subforms.write_mapping(key, serial_number, obj)?;
                            }
                        }
                    }
                    (FieldShape::SequenceOfScalars, _) => {}
                    (shape, _) => {
                        return Err(ExportError::malformed(format!(
                            "field {key} of registration {serial_number} classified as {shape:?}"
                        )));
                    }
                }
            }
            table.push(row);
        }

        let main_path = scope.path(&self.config.main_file_name);
        let file = File::create(&main_path).artifact(&main_path)?;
        let mut main_writer = BufWriter::new(file);
        table.write_to(&mut main_writer, self.config.main_delimiter)?;
        main_writer.flush().artifact(&main_path)?;

        let assembled = subforms.finish(&scope.path("subforms"))?;

        let archive_path = scope.path(&self.config.archive_file_name);
        self.write_archive(&archive_path, &main_path, &assembled)?;

        info!(
            scope = scope.id(),
            registrations = table.len(),
            subforms = assembled.len(),
            "rendered zip export"
        );
        Ok(archive_path)
    }

    fn write_archive(
        &self,
        archive_path: &Path,
        main_path: &Path,
        subforms: &[AssembledSubform],
    ) -> Result<()> {
        let file = File::create(archive_path).artifact(archive_path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        // subform stems never produce the main file name
        let mut entries = vec![(self.config.main_file_name.clone(), main_path.to_path_buf())];
        for subform in subforms {
            entries.push((format!("{}.csv", subform.name), subform.path.clone()));
        }

        for (entry, source) in entries {
            zip.start_file(entry, options)?;
            let mut reader = BufReader::new(File::open(&source).artifact(&source)?);
            std::io::copy(&mut reader, &mut zip).artifact(archive_path)?;
        }

        let mut file = zip.finish()?;
        file.flush().artifact(archive_path)?;
        Ok(())
    }
}

fn ensure_registrations(batch: &Batch) -> Result<()> {
    if batch.is_empty() {
        return Err(ExportError::registrations_not_found("empty batch"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Registration;
    use serde_json::json;

    fn batch(documents: Vec<serde_json::Value>) -> Batch {
        Batch::from_registrations(
            documents
                .into_iter()
                .map(|doc| serde_json::from_value::<Registration>(doc).unwrap()),
        )
    }

    #[test]
    fn test_render_csv_flattens_inline() {
        let batch = batch(vec![
            json!({
                "meta": {"serialNumber": "s1"},
                "data": {
                    "siteID": "77",
                    "location": {"city": "Utrecht", "count": 3},
                    "tags": ["a", "b"]
                }
            }),
            json!({
                "meta": {"serialNumber": "s2"},
                "data": {"siteID": "78", "answers": [{"q": 1}, {"q": 2}]}
            }),
        ]);

        let csv = String::from_utf8(SurveyExporter::default().render_csv(&batch).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "siteID;location.city;location.count;tags;answers.items__0.q;answers.items__1.q"
        );
        assert_eq!(lines[1], "77;Utrecht;3;a | b;;");
        assert_eq!(lines[2], "78;;;;1;2");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_empty_batch_is_not_found() {
        let exporter = SurveyExporter::default();
        assert!(matches!(
            exporter.render_csv(&Batch::new()),
            Err(ExportError::RegistrationsNotFound { .. })
        ));

        let root = tempfile::tempdir().unwrap();
        let scope = ExportScope::fresh(root.path()).unwrap();
        assert!(matches!(
            exporter.render_zip(&Batch::new(), &scope),
            Err(ExportError::RegistrationsNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_data_block_is_not_found() {
        let batch = batch(vec![json!({"meta": {"serialNumber": "s1"}})]);
        assert!(matches!(
            SurveyExporter::default().render_csv(&batch),
            Err(ExportError::RegistrationsNotFound { .. })
        ));
    }

    #[test]
    fn test_render_csv_without_columns_keeps_one_line_per_registration() {
        let batch = batch(vec![
            json!({"meta": {"serialNumber": "s1"}, "data": {}}),
            json!({"meta": {"serialNumber": "s2"}, "data": {"empty": {}}}),
        ]);

        let bytes = SurveyExporter::default().render_csv(&batch).unwrap();
        let records = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_reader(bytes.as_slice())
            .records()
            .count();
        assert_eq!(records, 2);
    }
}

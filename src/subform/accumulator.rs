use crate::error::{ArtifactContext, Result};
use crate::flatten::paths::{render_cell, FlatRow};
use crate::subform::schema::ColumnSchema;
use crate::types::ExportConfig;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

/// File-system and archive safe form of a subform name
pub fn sanitize_name(name: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(name, "_");
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        format!("_{cleaned}")
    } else {
        cleaned.into_owned()
    }
}

/// Per-subform state: the evolving schema plus its two artifacts
struct SubformTable {
    schema: ColumnSchema,
    header_path: PathBuf,
    data_path: PathBuf,
    data: csv::Writer<File>,
    rows: usize,
}

/// A subform CSV produced by [`SubformAccumulator::assemble`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSubform {
    /// File stem, also the archive entry name without `.csv`
    pub name: String,
    pub path: PathBuf,
    /// Width of the final header
    pub columns: usize,
    pub rows: usize,
}

/// Owns every subform touched during one export run
///
/// Each subform keeps its header and its data in separate files under
/// `parts_dir`. New columns widen the schema and rewrite the header file;
/// rows already appended keep the width they were written with, so the
/// assembled file may contain short rows behind a wider header.
///
/// Every distinct field name gets its own file stem. When sanitizing makes
/// two names equal, or a name would produce the main table's file, the later
/// one gets a numeric suffix (`a_b`, `a_b_2`).
pub struct SubformAccumulator {
    parts_dir: PathBuf,
    serial_column: String,
    delimiter: u8,
    reserved_file: String,
    stems: HashMap<String, String>,
    taken: HashSet<String>,
    tables: IndexMap<String, SubformTable>,
}

impl SubformAccumulator {
    pub fn new(parts_dir: impl Into<PathBuf>, config: &ExportConfig) -> Result<Self> {
        let parts_dir = parts_dir.into();
        std::fs::create_dir_all(&parts_dir).artifact(&parts_dir)?;

        Ok(SubformAccumulator {
            parts_dir,
            serial_column: config.serial_column.clone(),
            delimiter: config.subform_delimiter,
            reserved_file: config.main_file_name.clone(),
            stems: HashMap::new(),
            taken: HashSet::new(),
            tables: IndexMap::new(),
        })
    }

    /// The file stem of a subform, assigning a free one on first use
    fn stem_for(&mut self, subform_name: &str) -> String {
        if let Some(stem) = self.stems.get(subform_name) {
            return stem.clone();
        }

        let base = sanitize_name(subform_name);
        let mut stem = base.clone();
        let mut suffix = 2;
        while self.taken.contains(&stem) || format!("{stem}.csv") == self.reserved_file {
            stem = format!("{base}_{suffix}");
            suffix += 1;
        }

        self.taken.insert(stem.clone());
        self.stems.insert(subform_name.to_string(), stem.clone());
        stem
    }

    /// Widen the subform's schema with the row's unseen keys and append the
    /// row laid out on the resulting schema
    pub fn reconcile_and_append(&mut self, subform_name: &str, row: &FlatRow) -> Result<()> {
        let stem = self.stem_for(subform_name);

        let table = match self.tables.entry(stem) {
            indexmap::map::Entry::Occupied(entry) => {
                let table = entry.into_mut();
                let added = table.schema.extend(row.keys());
                if !added.is_empty() {
                    debug!(subform = subform_name, added = ?added, "widening subform schema");
                    write_header(&table.header_path, &table.schema, self.delimiter)?;
                }
                table
            }
            indexmap::map::Entry::Vacant(entry) => {
                let mut schema = ColumnSchema::with_leading(&self.serial_column);
                schema.extend(row.keys());

                let header_path = self.parts_dir.join(format!("{}.header.csv", entry.key()));
                let data_path = self.parts_dir.join(format!("{}.data.csv", entry.key()));
                write_header(&header_path, &schema, self.delimiter)?;

                let file = File::create(&data_path).artifact(&data_path)?;
                let data = csv::WriterBuilder::new()
                    .delimiter(self.delimiter)
                    .has_headers(false)
                    .flexible(true)
                    .from_writer(file);

                debug!(subform = subform_name, columns = schema.len(), "new subform");
                entry.insert(SubformTable {
                    schema,
                    header_path,
                    data_path,
                    data,
                    rows: 0,
                })
            }
        };

        let cells: Vec<String> = table
            .schema
            .columns()
            .iter()
            .map(|column| row.get(column).map(render_cell).unwrap_or_default())
            .collect();
        table.data.write_record(&cells)?;
        table.rows += 1;

        Ok(())
    }

    pub fn schema(&self, subform_name: &str) -> Option<&ColumnSchema> {
        self.stems
            .get(subform_name)
            .and_then(|stem| self.tables.get(stem))
            .map(|table| &table.schema)
    }

    /// Subform file stems in order of first appearance
    pub fn subform_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Concatenate header and data of every subform into `<name>.csv`
    /// under `out_dir`
    pub fn assemble(self, out_dir: &Path) -> Result<Vec<AssembledSubform>> {
        std::fs::create_dir_all(out_dir).artifact(out_dir)?;

        let mut assembled = Vec::with_capacity(self.tables.len());
        for (name, mut table) in self.tables.into_iter() {
            table.data.flush().artifact(&table.data_path)?;
            drop(table.data);

            let path = out_dir.join(format!("{name}.csv"));
            let mut out = File::create(&path).artifact(&path)?;
            for part in [&table.header_path, &table.data_path] {
                let mut reader = BufReader::new(File::open(part).artifact(part)?);
                std::io::copy(&mut reader, &mut out).artifact(&path)?;
            }
            out.flush().artifact(&path)?;

            assembled.push(AssembledSubform {
                name,
                path,
                columns: table.schema.len(),
                rows: table.rows,
            });
        }

        Ok(assembled)
    }
}

/// Truncate and rewrite a header artifact
fn write_header(path: &Path, schema: &ColumnSchema, delimiter: u8) -> Result<()> {
    let file = File::create(path).artifact(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(file);
    writer.write_record(schema.columns())?;
    writer.flush().artifact(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> FlatRow {
        value.as_object().unwrap().clone()
    }


    #[test]
    fn test_schema_grows_in_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut acc =
            SubformAccumulator::new(dir.path().join("parts"), &ExportConfig::default()).unwrap();

        acc.reconcile_and_append("items", &row(json!({"serialNumber": "r1", "a": 1, "b": 2})))
            .unwrap();
        acc.reconcile_and_append("items", &row(json!({"serialNumber": "r2", "b": 3, "c": 4})))
            .unwrap();

        let columns: Vec<&str> = acc
            .schema("items")
            .unwrap()
            .columns()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(columns, vec!["serialNumber", "a", "b", "c"]);
    }

    #[test]
    fn test_header_rewritten_rows_left_ragged() {
        let dir = tempfile::tempdir().unwrap();
        let mut acc =
            SubformAccumulator::new(dir.path().join("parts"), &ExportConfig::default()).unwrap();

        acc.reconcile_and_append("s", &row(json!({"serialNumber": "s1", "x": 1})))
            .unwrap();
        acc.reconcile_and_append("s", &row(json!({"serialNumber": "s2", "x": 2, "y": 3})))
            .unwrap();

        let assembled = acc.assemble(&dir.path().join("out")).unwrap();
        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled[0].columns, 3);
        assert_eq!(assembled[0].rows, 2);

        let content = std::fs::read_to_string(&assembled[0].path).unwrap();
        assert_eq!(content, "serialNumber,x,y\ns1,1\ns2,2,3\n");
    }

    #[test]
    fn test_serial_number_forced_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut acc =
            SubformAccumulator::new(dir.path().join("parts"), &ExportConfig::default()).unwrap();

        acc.reconcile_and_append("s", &row(json!({"z": "last", "serialNumber": "s1"})))
            .unwrap();
        let assembled = acc.assemble(&dir.path().join("out")).unwrap();

        let content = std::fs::read_to_string(&assembled[0].path).unwrap();
        assert_eq!(content, "serialNumber,z\ns1,last\n");
    }

    #[test]
    fn test_colliding_names_get_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut acc =
            SubformAccumulator::new(dir.path().join("parts"), &ExportConfig::default()).unwrap();

        for name in ["a b", "a/b", "surveys_main", "a b"] {
            acc.reconcile_and_append(name, &row(json!({"serialNumber": "s1", "v": name})))
                .unwrap();
        }

        let stems: Vec<&str> = acc.subform_names().collect();
        assert_eq!(stems, vec!["a_b", "a_b_2", "surveys_main_2"]);
        assert_eq!(acc.schema("a/b").unwrap().len(), 2);

        let assembled = acc.assemble(&dir.path().join("out")).unwrap();
        let content = std::fs::read_to_string(&assembled[0].path).unwrap();
        assert_eq!(content, "serialNumber,v\ns1,a b\ns1,a b\n");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("locationSearch"), "locationSearch");
        assert_eq!(sanitize_name("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_name("a b"), "a_b");
        assert_eq!(sanitize_name(".."), "_..");
        assert_eq!(sanitize_name(""), "_");
    }
}

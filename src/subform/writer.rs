use crate::error::Result;
use crate::flatten::paths::{FlatRow, PathFlattener};
use crate::subform::accumulator::{AssembledSubform, SubformAccumulator};
use crate::types::ExportConfig;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Writes subform rows, one subform CSV per field name
pub struct SubformWriter {
    accumulator: SubformAccumulator,
    flattener: PathFlattener,
    serial_column: String,
}

impl SubformWriter {
    /// Create a writer keeping its header and data artifacts in `parts_dir`
    pub fn new(parts_dir: impl Into<PathBuf>, config: &ExportConfig) -> Result<Self> {
        Ok(SubformWriter {
            accumulator: SubformAccumulator::new(parts_dir, config)?,
            flattener: PathFlattener::from_config(config),
            serial_column: config.serial_column.clone(),
        })
    }

    /// Write a row that is already flattened and carries its serial number
    pub fn write_row(&mut self, subform_name: &str, row: &FlatRow) -> Result<()> {
        self.accumulator.reconcile_and_append(subform_name, row)
    }

    /// Flatten one mapping of a registration and write it tagged with the
    /// registration's serial number
    ///
    /// The owning serial number wins over a same-named key in the mapping.
    pub fn write_mapping(
        &mut self,
        subform_name: &str,
        serial_number: &str,
        obj: &Map<String, Value>,
    ) -> Result<()> {
        let mut row = FlatRow::new();
        row.insert(
            self.serial_column.clone(),
            Value::String(serial_number.to_string()),
        );
        for (key, value) in self.flattener.flatten_mapping(obj) {
            if key != self.serial_column {
                row.insert(key, value);
            }
        }

        self.write_row(subform_name, &row)
    }

    pub fn accumulator(&self) -> &SubformAccumulator {
        &self.accumulator
    }

    /// Assemble every subform into `out_dir`
    pub fn finish(self, out_dir: &Path) -> Result<Vec<AssembledSubform>> {
        self.accumulator.assemble(out_dir)
    }
}

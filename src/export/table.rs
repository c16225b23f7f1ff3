use crate::error::Result;
use crate::flatten::paths::{render_cell, FlatRow};
use crate::subform::schema::ColumnSchema;
use std::io::Write;

/// The main table: one row per registration, columns the union of all keys
#[derive(Debug, Default)]
pub struct MainTable {
    schema: ColumnSchema,
    rows: Vec<FlatRow>,
}

impl MainTable {
    pub fn new() -> Self {
        MainTable::default()
    }

    pub fn push(&mut self, row: FlatRow) {
        self.schema.extend(row.keys());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        self.schema.columns()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write header plus every row laid out on the full column union
    ///
    /// Every row yields one line, even when no row has any column.
    pub fn write_to<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_writer(writer);

        csv_writer.write_record(self.schema.columns())?;
        for row in &self.rows {
            let cells = self
                .schema
                .columns()
                .iter()
                .map(|column| row.get(column).map(render_cell).unwrap_or_default());
            csv_writer.write_record(cells)?;
        }
        csv_writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

//! Subform tables: normalized CSVs for repeated or heterogeneous fields
//!
//! Every subform owns a column schema that only ever grows. The header and
//! the data rows live in separate artifacts so that widening the schema
//! rewrites the header alone; rows already on disk stay as they were written.

pub mod accumulator;
pub mod schema;
pub mod writer;

pub use accumulator::{AssembledSubform, SubformAccumulator};
pub use schema::ColumnSchema;
pub use writer::SubformWriter;

//! Turning irregular nested documents into flat rows
//!
//! `classify` decides per top-level field how it ends up in tabular form,
//! `paths` collapses nested mappings into dotted-path keys.

pub mod classify;
pub mod paths;

pub use classify::{classify, FieldShape, JsonType};
pub use paths::{FlatRow, ListKeys, PathFlattener};

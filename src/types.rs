use crate::error::{ExportError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One survey submission document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub meta: RegistrationMeta,

    #[serde(default)]
    pub info: FormInfo,

    /// The answers: field name to scalar, mapping or sequence
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationMeta {
    #[serde(rename = "serialNumber")]
    pub serial_number: String,

    /// Epoch timestamp, delivered either as a number or a numeric string
    #[serde(rename = "registrationDate", default)]
    pub registration_date: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormInfo {
    #[serde(rename = "formId", default)]
    pub form_id: Option<Value>,

    #[serde(rename = "formName", default)]
    pub form_name: Option<String>,
}

impl Registration {
    pub fn serial_number(&self) -> &str {
        &self.meta.serial_number
    }

    /// The `data` block, which every export needs
    pub fn data(&self) -> Result<&Map<String, Value>> {
        self.data.as_ref().ok_or_else(|| {
            ExportError::registrations_not_found(format!(
                "data of registration {}",
                self.meta.serial_number
            ))
        })
    }
}

/// All registrations of one survey, keyed by serial number in arrival order
#[derive(Debug, Clone, Default)]
pub struct Batch {
    registrations: IndexMap<String, Registration>,
}

impl Batch {
    pub fn new() -> Self {
        Batch::default()
    }

    /// Add a registration; a repeated serial number replaces the earlier
    /// document but keeps its position
    pub fn insert(&mut self, registration: Registration) {
        self.registrations
            .insert(registration.meta.serial_number.clone(), registration);
    }

    pub fn from_registrations(registrations: impl IntoIterator<Item = Registration>) -> Self {
        let mut batch = Batch::new();
        for registration in registrations {
            batch.insert(registration);
        }
        batch
    }

    /// Build a batch from a batched blob of the shape `{"elements": [...]}`
    ///
    /// `prefix` only names the origin in errors.
    pub fn from_document(document: Value, prefix: &str) -> Result<Self> {
        let Value::Object(mut document) = document else {
            return Err(ExportError::malformed(format!(
                "batch under {prefix} is not a mapping"
            )));
        };

        let elements = match document.remove("elements") {
            Some(Value::Array(elements)) if !elements.is_empty() => elements,
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                return Err(ExportError::registrations_not_found(prefix));
            }
            Some(_) => {
                return Err(ExportError::malformed(format!(
                    "elements under {prefix} is not a sequence"
                )));
            }
        };

        let mut batch = Batch::new();
        for (index, element) in elements.into_iter().enumerate() {
            let registration: Registration = serde_json::from_value(element).map_err(|e| {
                ExportError::malformed_with(format!("registration {index} under {prefix}"), e)
            })?;
            batch.insert(registration);
        }
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn get(&self, serial_number: &str) -> Option<&Registration> {
        self.registrations.get(serial_number)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Registration)> {
        self.registrations.iter()
    }
}

/// Configuration for the export process
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Field delimiter of the main table
    pub main_delimiter: u8,

    /// Field delimiter of the subform tables
    pub subform_delimiter: u8,

    /// Joins nested keys, e.g. `location.city`
    pub path_separator: String,

    /// Joins the items of a list of scalars into one cell
    pub list_separator: String,

    /// Join column between the main row and its subform rows
    pub serial_column: String,

    /// Name of the main table inside the archive
    pub main_file_name: String,

    /// Name of the archive written into the export scope
    pub archive_file_name: String,

    /// Directory under which export scopes are created
    pub temp_root: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            main_delimiter: b';',
            subform_delimiter: b',',
            path_separator: String::from("."),
            list_separator: String::from(" | "),
            serial_column: String::from("serialNumber"),
            main_file_name: String::from("surveys_main.csv"),
            archive_file_name: String::from("surveys.zip"),
            temp_root: std::env::temp_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_from_document_keeps_order() {
        let document = json!({
            "elements": [
                {"meta": {"serialNumber": "b"}, "data": {"x": 1}},
                {"meta": {"serialNumber": "a"}, "data": {"x": 2}}
            ]
        });

        let batch = Batch::from_document(document, "source/registrations/7").unwrap();
        let serials: Vec<&String> = batch.iter().map(|(serial, _)| serial).collect();
        assert_eq!(serials, vec!["b", "a"]);
    }

    #[test]
    fn test_batch_without_elements_is_not_found() {
        let err = Batch::from_document(json!({"elements": []}), "p").unwrap_err();
        assert!(matches!(err, ExportError::RegistrationsNotFound { .. }));

        let err = Batch::from_document(json!({}), "p").unwrap_err();
        assert!(matches!(err, ExportError::RegistrationsNotFound { .. }));
    }

    #[test]
    fn test_batch_rejects_malformed_elements() {
        let err = Batch::from_document(json!({"elements": "nope"}), "p").unwrap_err();
        assert!(matches!(err, ExportError::Malformed { source: None, .. }));

        let err = Batch::from_document(json!({"elements": [{"meta": {}}]}), "p").unwrap_err();
        assert!(matches!(err, ExportError::Malformed { source: Some(_), .. }));
    }

    #[test]
    fn test_missing_data_is_not_found() {
        let registration: Registration =
            serde_json::from_value(json!({"meta": {"serialNumber": "s1"}})).unwrap();
        assert!(matches!(
            registration.data(),
            Err(ExportError::RegistrationsNotFound { .. })
        ));
    }
}

use crate::source::scalar_text;
use crate::types::{Batch, Registration};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding the structured site location
const LOCATION_FIELD: &str = "tMNLLocationID";
const LOCATION_CITY: &str = "CITY";
const SITE_FIELD: &str = "siteID";

/// Overview line of one registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSummary {
    pub serial_number: String,
    pub date_of_registration: Option<i64>,
    pub site_location: String,
    pub site_id: String,
}

impl RegistrationSummary {
    pub fn from_registration(registration: &Registration) -> Self {
        let data = registration.data.as_ref();

        let site_location = data
            .and_then(|data| data.get(LOCATION_FIELD))
            .and_then(|location| location.get(LOCATION_CITY))
            .and_then(scalar_text)
            .unwrap_or_default();

        // without an explicit site the form name carries its number
        let site_id = data
            .and_then(|data| data.get(SITE_FIELD))
            .and_then(scalar_text)
            .unwrap_or_else(|| {
                registration
                    .info
                    .form_name
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect()
            });

        RegistrationSummary {
            serial_number: registration.meta.serial_number.clone(),
            date_of_registration: registration
                .meta
                .registration_date
                .as_ref()
                .and_then(parse_timestamp),
            site_location,
            site_id,
        }
    }
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Summaries of every registration grouped by form id, in batch order
pub fn registration_list(batch: &Batch) -> IndexMap<String, Vec<RegistrationSummary>> {
    let mut forms: IndexMap<String, Vec<RegistrationSummary>> = IndexMap::new();
    for (_, registration) in batch.iter() {
        let form_id = registration
            .info
            .form_id
            .as_ref()
            .and_then(scalar_text)
            .unwrap_or_default();
        forms
            .entry(form_id)
            .or_default()
            .push(RegistrationSummary::from_registration(registration));
    }
    forms
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summaries_grouped_by_form() {
        let batch = Batch::from_document(
            json!({
                "elements": [
                    {
                        "meta": {"serialNumber": "s1", "registrationDate": "1580000000"},
                        "info": {"formId": 7, "formName": "Schouw 12"},
                        "data": {"tMNLLocationID": {"CITY": "Utrecht"}, "siteID": "UT-1"}
                    },
                    {
                        "meta": {"serialNumber": "s2", "registrationDate": 1580000001},
                        "info": {"formId": 7, "formName": "Schouw 12"},
                        "data": {}
                    }
                ]
            }),
            "test",
        )
        .unwrap();

        let list = registration_list(&batch);
        let summaries = &list["7"];
        assert_eq!(summaries.len(), 2);

        assert_eq!(summaries[0].date_of_registration, Some(1580000000));
        assert_eq!(summaries[0].site_location, "Utrecht");
        assert_eq!(summaries[0].site_id, "UT-1");

        assert_eq!(summaries[1].date_of_registration, Some(1580000001));
        assert_eq!(summaries[1].site_location, "");
        assert_eq!(summaries[1].site_id, "12");
    }
}

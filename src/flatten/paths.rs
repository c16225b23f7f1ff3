use crate::types::ExportConfig;
use serde_json::{Map, Value};

/// A single-level row keyed by dotted paths
pub type FlatRow = Map<String, Value>;

/// How the elements of a list holding mappings are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListKeys {
    /// Element `i` lives under its field name prefixed with `i_`
    /// (`answers.0_items.code`)
    #[default]
    IndexPrefix,
    /// Element `i` lives one level below its field, under `items__i`
    /// (`answers.items.items__0.code`)
    ItemsSegment,
}

/// Collapses nested mappings into dotted-path keys
///
/// A list holding mappings is expanded per element, keyed as [`ListKeys`]
/// says. Any other list is joined into a single cell with the list separator.
#[derive(Debug, Clone)]
pub struct PathFlattener {
    separator: String,
    list_separator: String,
    list_keys: ListKeys,
}

impl Default for PathFlattener {
    fn default() -> Self {
        PathFlattener::from_config(&ExportConfig::default())
    }
}

impl PathFlattener {
    pub fn new(separator: impl Into<String>, list_separator: impl Into<String>) -> Self {
        PathFlattener {
            separator: separator.into(),
            list_separator: list_separator.into(),
            list_keys: ListKeys::default(),
        }
    }

    pub fn with_list_keys(mut self, list_keys: ListKeys) -> Self {
        self.list_keys = list_keys;
        self
    }

    pub fn list_keys(&self) -> ListKeys {
        self.list_keys
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        PathFlattener::new(config.path_separator.clone(), config.list_separator.clone())
    }

    /// Flatten the fields of a mapping, keys relative to the mapping itself
    pub fn flatten_mapping(&self, obj: &Map<String, Value>) -> FlatRow {
        let mut row = FlatRow::new();
        for (key, value) in obj.iter() {
            self.flatten_into("", key, value, &mut row);
        }
        row
    }

    /// Flatten one named field into `row`, e.g. `location` -> `location.city`
    pub fn flatten_field(&self, name: &str, value: &Value, row: &mut FlatRow) {
        self.flatten_into("", name, value, row);
    }

    fn flatten_into(&self, parent: &str, key: &str, value: &Value, row: &mut FlatRow) {
        match value {
            Value::Object(obj) => {
                let path = self.join(parent, key);
                for (child, nested) in obj.iter() {
                    self.flatten_into(&path, child, nested, row);
                }
            }
            Value::Array(arr) if arr.iter().any(Value::is_object) => {
                match self.list_keys {
                    ListKeys::IndexPrefix => {
                        for (index, item) in arr.iter().enumerate() {
                            let indexed = format!("{index}_{key}");
                            self.flatten_into(parent, &indexed, item, row);
                        }
                    }
                    ListKeys::ItemsSegment => {
                        let path = self.join(parent, key);
                        for (index, item) in arr.iter().enumerate() {
                            self.flatten_into(&path, &format!("items__{index}"), item, row);
                        }
                    }
                }
            }
            Value::Array(arr) => {
                let joined = arr
                    .iter()
                    .map(render_cell)
                    .collect::<Vec<_>>()
                    .join(&self.list_separator);
                row.insert(self.join(parent, key), Value::String(joined));
            }
            scalar => {
                row.insert(self.join(parent, key), scalar.clone());
            }
        }
    }

    fn join(&self, parent: &str, key: &str) -> String {
        if parent.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", parent, self.separator, key)
        }
    }
}

/// Render a flattened value as CSV cell text
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // nested lists inside a joined list have no better flat form
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(row: &FlatRow) -> Vec<&str> {
        row.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_nested_mapping() {
        let flattener = PathFlattener::default();
        let mut row = FlatRow::new();
        flattener.flatten_field(
            "location",
            &json!({"city": "Utrecht", "geo": {"lat": 52.1, "lon": 5.1}}),
            &mut row,
        );

        assert_eq!(keys(&row), vec!["location.city", "location.geo.lat", "location.geo.lon"]);
        assert_eq!(row["location.geo.lat"], json!(52.1));
    }

    #[test]
    fn test_scalar_list_is_joined() {
        let flattener = PathFlattener::default();
        let row = flattener.flatten_mapping(
            json!({"tags": ["a", "b", 3], "empty": []}).as_object().unwrap(),
        );

        assert_eq!(row["tags"], json!("a | b | 3"));
        assert_eq!(row["empty"], json!(""));
    }

    #[test]
    fn test_list_of_mappings_is_indexed() {
        let flattener = PathFlattener::default();
        let row = flattener.flatten_mapping(
            json!({
                "mast": "x3",
                "another": [{"code": "A"}, {"code": "B", "extra": {"y": 1}}]
            })
            .as_object()
            .unwrap(),
        );

        assert_eq!(
            keys(&row),
            vec!["mast", "0_another.code", "1_another.code", "1_another.extra.y"]
        );
        assert_eq!(row["1_another.code"], json!("B"));
    }

    #[test]
    fn test_index_prefixes_the_last_segment() {
        let flattener = PathFlattener::default();
        let mut row = FlatRow::new();
        flattener.flatten_field("outer", &json!({"inner": [{"v": 1}]}), &mut row);
        assert_eq!(keys(&row), vec!["outer.0_inner.v"]);
    }

    #[test]
    fn test_items_segment_keys() {
        let flattener = PathFlattener::default().with_list_keys(ListKeys::ItemsSegment);
        let row = flattener.flatten_mapping(
            json!({
                "locationSearch": {"mast": "x3", "another": [{"code": "A"}, {"code": "B"}]},
                "visits": [{"by": "ann"}, "loose"],
                "tags": ["a", "b"]
            })
            .as_object()
            .unwrap(),
        );

        assert_eq!(
            keys(&row),
            vec![
                "locationSearch.mast",
                "locationSearch.another.items__0.code",
                "locationSearch.another.items__1.code",
                "visits.items__0.by",
                "visits.items__1",
                "tags",
            ]
        );
        assert_eq!(row["visits.items__1"], json!("loose"));
        assert_eq!(row["tags"], json!("a | b"));
    }

    #[test]
    fn test_empty_mapping_contributes_nothing() {
        let flattener = PathFlattener::default();
        let mut row = FlatRow::new();
        flattener.flatten_field("nothing", &json!({}), &mut row);
        assert!(row.is_empty());
    }

    #[test]
    fn test_render_cell() {
        assert_eq!(render_cell(&Value::Null), "");
        assert_eq!(render_cell(&json!(false)), "false");
        assert_eq!(render_cell(&json!(12)), "12");
        assert_eq!(render_cell(&json!("x;y")), "x;y");
    }
}

use serde_json::Value;

/// Type identifier for JSON values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    JsonType::Integer
                } else {
                    JsonType::Number
                }
            }
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }
}

/// How a top-level field of a registration is represented in tabular form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// Copied as-is into the main row
    Scalar,
    /// Mapping whose values all share one type; kept inline in the main row
    UniformMapping,
    /// Mapping with mixed value types; promoted to a subform
    HeterogeneousMapping,
    /// Sequence holding at least one mapping; one subform row per mapping
    SequenceOfMappings,
    /// Sequence without mappings (including the empty one)
    SequenceOfScalars,
}

impl FieldShape {
    /// Whether the field is written to a subform in the archive export
    pub fn is_subform(self) -> bool {
        matches!(
            self,
            FieldShape::HeterogeneousMapping | FieldShape::SequenceOfMappings
        )
    }
}

/// Classify one top-level field value by its runtime shape alone
pub fn classify(value: &Value) -> FieldShape {
    match value {
        Value::Object(obj) => {
            let mut types = obj.values().map(JsonType::from_value);
            match types.next() {
                Some(first) if types.all(|t| t == first) => FieldShape::UniformMapping,
                // an empty mapping has no single type
                _ => FieldShape::HeterogeneousMapping,
            }
        }
        Value::Array(arr) => {
            if arr.iter().any(Value::is_object) {
                FieldShape::SequenceOfMappings
            } else {
                FieldShape::SequenceOfScalars
            }
        }
        _ => FieldShape::Scalar,
    }
}

//! Type inference for JSON values

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::formats::Format;
use crate::models::FieldMetadata;

/// Inferred JSON type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InferredType {
    Null,
    Boolean,
    /// Whole numbers
    Integer,
    Number,
    /// String type with optional format
    String { format: Option<Format> },
    Array { items: Box<InferredType> },
    Object {
        properties: BTreeMap<String, InferredField>,
    },
    /// Mixed types (oneOf in JSON Schema)
    Mixed { types: Vec<InferredType> },
    /// No samples
    Unknown,
}

impl InferredType {
    /// Infer the shallow type of a value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => InferredType::Null,
            Value::Bool(_) => InferredType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => InferredType::Integer,
            Value::Number(_) => InferredType::Number,
            Value::String(s) => InferredType::String {
                format: super::formats::detect_format(s),
            },
            Value::Array(_) => InferredType::Array {
                items: Box::new(InferredType::Unknown),
            },
            Value::Object(_) => InferredType::Object {
                properties: BTreeMap::new(),
            },
        }
    }

    /// Get the JSON Schema type name
    pub fn type_name(&self) -> &'static str {
        match self {
            InferredType::Null => "null",
            InferredType::Boolean => "boolean",
            InferredType::Integer => "integer",
            InferredType::Number => "number",
            InferredType::String { .. } => "string",
            InferredType::Array { .. } => "array",
            InferredType::Object { .. } => "object",
            InferredType::Mixed { .. } => "mixed",
            InferredType::Unknown => "unknown",
        }
    }

    /// Merge this type with another type
    pub fn merge_with(self, other: InferredType) -> InferredType {
        if self == other {
            return self;
        }

        match (self, other) {
            // Nullability is tracked on the field
            (InferredType::Null, other) | (other, InferredType::Null) => other,
            (InferredType::Unknown, other) | (other, InferredType::Unknown) => other,

            (InferredType::Integer, InferredType::Number)
            | (InferredType::Number, InferredType::Integer) => InferredType::Number,

            // Conflicting formats drop the format
            (InferredType::String { format: f1 }, InferredType::String { format: f2 }) => {
                InferredType::String {
                    format: if f1 == f2 { f1 } else { None },
                }
            }

            (InferredType::Array { items: a }, InferredType::Array { items: b }) => {
                InferredType::Array {
                    items: Box::new((*a).merge_with(*b)),
                }
            }

            (
                InferredType::Object { properties: mut p1 },
                InferredType::Object { properties: p2 },
            ) => {
                for (key, field2) in p2 {
                    match p1.remove(&key) {
                        Some(field1) => {
                            p1.insert(key, field1.merge_with(field2));
                        }
                        None => {
                            p1.insert(key, field2);
                        }
                    }
                }
                InferredType::Object { properties: p1 }
            }

            (InferredType::Mixed { mut types }, other)
            | (other, InferredType::Mixed { mut types }) => {
                if !types.iter().any(|t| t.type_name() == other.type_name()) {
                    types.push(other);
                }
                InferredType::Mixed { types }
            }

            (a, b) => InferredType::Mixed { types: vec![a, b] },
        }
    }

    fn write_json_schema(&self, schema: &mut Value) {
        match self {
            InferredType::Null
            | InferredType::Boolean
            | InferredType::Integer
            | InferredType::Number => {
                schema["type"] = json!(self.type_name());
            }
            InferredType::String { format } => {
                schema["type"] = json!("string");
                if let Some(fmt) = format {
                    schema["format"] = json!(fmt.keyword());
                }
            }
            InferredType::Array { items } => {
                schema["type"] = json!("array");
                let mut items_schema = json!({});
                items.write_json_schema(&mut items_schema);
                schema["items"] = items_schema;
            }
            InferredType::Object { properties } => {
                schema["type"] = json!("object");
                let mut props = serde_json::Map::new();
                let mut required = Vec::new();

                for (name, field) in properties {
                    let mut prop_schema = json!({});
                    field.field_type.write_json_schema(&mut prop_schema);
                    if !field.examples.is_empty() {
                        prop_schema["examples"] = json!(field.examples);
                    }
                    props.insert(name.clone(), prop_schema);

                    if field.required && !field.nullable {
                        required.push(Value::String(name.clone()));
                    }
                }

                schema["properties"] = Value::Object(props);
                if !required.is_empty() {
                    schema["required"] = Value::Array(required);
                }
            }
            InferredType::Mixed { types } => {
                let one_of: Vec<Value> = types
                    .iter()
                    .map(|t| {
                        let mut sub_schema = json!({});
                        t.write_json_schema(&mut sub_schema);
                        sub_schema
                    })
                    .collect();
                schema["oneOf"] = json!(one_of);
            }
            // Empty schema accepts anything
            InferredType::Unknown => {}
        }
    }
}

/// An inferred field in a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredField {
    pub field_type: InferredType,
    /// Present in every record containing the parent
    pub required: bool,
    pub nullable: bool,
    pub occurrences: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
}

impl InferredField {
    pub fn new(field_type: InferredType) -> Self {
        Self {
            field_type,
            required: true,
            nullable: false,
            occurrences: 1,
            examples: Vec::new(),
        }
    }

    pub fn merge_with(self, other: InferredField) -> InferredField {
        let mut examples = self.examples;
        for ex in other.examples {
            if !examples.contains(&ex) {
                examples.push(ex);
            }
        }
        InferredField {
            field_type: self.field_type.merge_with(other.field_type),
            required: self.required && other.required,
            nullable: self.nullable || other.nullable,
            occurrences: self.occurrences + other.occurrences,
            examples,
        }
    }
}

/// Complete inferred schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredSchema {
    /// Root type (an object for row data)
    pub root: InferredType,
    /// Number of records analyzed
    pub record_count: usize,
    /// Per-path occurrence statistics, nested paths joined with '.'
    pub field_metadata: BTreeMap<String, FieldMetadata>,
}

impl InferredSchema {
    /// Convert to a JSON Schema document
    pub fn to_json_schema(&self) -> Value {
        let mut schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema"
        });
        self.root.write_json_schema(&mut schema);
        schema
    }

    /// Top-level property names
    pub fn field_names(&self) -> Vec<String> {
        match &self.root {
            InferredType::Object { properties } => properties.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_merge_integer_number() {
        assert_eq!(
            InferredType::Integer.merge_with(InferredType::Number),
            InferredType::Number
        );
    }

    #[test]
    fn test_type_merge_null() {
        let merged = InferredType::Null.merge_with(InferredType::String { format: None });
        assert_eq!(merged, InferredType::String { format: None });
    }

    #[test]
    fn test_type_merge_mixed() {
        let merged = InferredType::Boolean.merge_with(InferredType::String { format: None });
        match merged {
            InferredType::Mixed { types } => assert_eq!(types.len(), 2),
            other => panic!("Expected Mixed type, got {:?}", other),
        }
    }

    #[test]
    fn test_string_format_conflict_drops_format() {
        let merged = InferredType::String {
            format: Some(Format::Date),
        }
        .merge_with(InferredType::String { format: None });
        assert_eq!(merged, InferredType::String { format: None });
    }

    #[test]
    fn test_to_json_schema() {
        let mut properties = BTreeMap::new();
        properties.insert(
            "title".to_string(),
            InferredField::new(InferredType::String { format: None }),
        );
        let mut optional = InferredField::new(InferredType::String {
            format: Some(Format::Date),
        });
        optional.required = false;
        properties.insert("date".to_string(), optional);

        let schema = InferredSchema {
            root: InferredType::Object { properties },
            record_count: 2,
            field_metadata: BTreeMap::new(),
        };
        let json_schema = schema.to_json_schema();
        assert_eq!(json_schema["type"], "object");
        assert_eq!(json_schema["properties"]["date"]["format"], "date");
        assert_eq!(json_schema["required"], json!(["title"]));
    }
}

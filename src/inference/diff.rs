//! Comparing JSON Schema documents
//!
//! Schemas are flattened to `path -> allowed type names` so that versions
//! can be diffed and rows checked without a full JSON Schema validator.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::error::InferenceError;
use crate::models::{Row, SchemaSummary, TypeChange};
use crate::transform::get_path;

/// Type name used for properties whose schema accepts anything
pub const ANY_TYPE: &str = "any";

/// Flattened view of a JSON Schema: dotted path -> allowed type names
pub type FieldTypes = BTreeMap<String, BTreeSet<String>>;

/// Flatten the properties of an object schema
pub fn schema_field_types(schema: &Value) -> Result<FieldTypes, InferenceError> {
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| InferenceError::MalformedSchema("missing properties".to_string()))?;
    let mut out = FieldTypes::new();
    collect_types(properties, "", &mut out);
    Ok(out)
}

fn collect_types(
    properties: &serde_json::Map<String, Value>,
    prefix: &str,
    out: &mut FieldTypes,
) {
    for (name, prop) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        out.insert(path.clone(), types_of(prop));
        if let Some(nested) = prop.get("properties").and_then(Value::as_object) {
            collect_types(nested, &path, out);
        }
    }
}

fn types_of(prop: &Value) -> BTreeSet<String> {
    let mut types = BTreeSet::new();
    match prop.get("type") {
        Some(Value::String(t)) => {
            types.insert(t.clone());
        }
        Some(Value::Array(list)) => {
            types.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
        }
        _ => {}
    }
    if let Some(one_of) = prop.get("oneOf").and_then(Value::as_array) {
        for member in one_of {
            types.extend(types_of(member));
        }
    }
    if types.is_empty() {
        types.insert(ANY_TYPE.to_string());
    }
    types
}

/// Whether every value valid under `from` stays valid under `to`
pub fn is_widening(from: &BTreeSet<String>, to: &BTreeSet<String>) -> bool {
    to.contains(ANY_TYPE)
        || from
            .iter()
            .all(|t| to.contains(t) || (t == "integer" && to.contains("number")))
}

fn join(types: &BTreeSet<String>) -> String {
    types.iter().cloned().collect::<Vec<_>>().join("|")
}

/// Diff `current` against `previous`; with no previous schema every field is new
pub fn diff_schemas(
    previous: Option<&Value>,
    current: &Value,
) -> Result<SchemaSummary, InferenceError> {
    let current_types = schema_field_types(current)?;
    let previous_types = match previous {
        Some(schema) => schema_field_types(schema)?,
        None => FieldTypes::new(),
    };

    let mut summary = SchemaSummary {
        total_fields: current_types.len(),
        ..Default::default()
    };

    for (path, types) in &current_types {
        match previous_types.get(path) {
            None => summary.new_fields.push(path.clone()),
            Some(old) if old != types => summary.type_changes.push(TypeChange {
                path: path.clone(),
                from: join(old),
                to: join(types),
                compatible: is_widening(old, types),
            }),
            Some(_) => {}
        }
    }
    summary.removed_fields = previous_types
        .keys()
        .filter(|path| !current_types.contains_key(*path))
        .cloned()
        .collect();

    Ok(summary)
}

/// Checks rows against a stored schema, producing warnings rather than errors
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    field_types: FieldTypes,
    required: Vec<String>,
}

impl SchemaValidator {
    pub fn new(schema: &Value) -> Result<Self, InferenceError> {
        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        Ok(Self {
            field_types: schema_field_types(schema)?,
            required,
        })
    }

    /// Mismatches between `row` and the schema
    pub fn validate(&self, row: &Row) -> Vec<String> {
        let mut warnings = Vec::new();

        for field in &self.required {
            if get_path(row, field).is_none_or(Value::is_null) {
                warnings.push(format!("Required field '{}' is missing", field));
            }
        }

        for (path, allowed) in &self.field_types {
            let Some(value) = get_path(row, path) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let actual = json_type_name(value);
            let accepted = allowed.contains(ANY_TYPE)
                || allowed.contains(actual)
                || (actual == "integer" && allowed.contains("number"));
            if !accepted {
                warnings.push(format!(
                    "Field '{}' expected {}, found {}",
                    path,
                    join(allowed),
                    actual
                ));
            }
        }

        for key in row.keys() {
            if !self.field_types.contains_key(key) {
                warnings.push(format!("Field '{}' is not part of the dataset schema", key));
            }
        }

        warnings
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

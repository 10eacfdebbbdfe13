//! Transform descriptors as stored on a dataset

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value types a cast can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Array,
    Object,
    Null,
}

impl FieldType {
    /// JSON type of a value; dates are strings at this level
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => FieldType::Null,
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
            Value::Number(_) => FieldType::Number,
            Value::String(_) => FieldType::String,
            Value::Array(_) => FieldType::Array,
            Value::Object(_) => FieldType::Object,
        }
    }

    /// Whether a value of type `actual` already satisfies `self`
    pub fn accepts(&self, actual: FieldType) -> bool {
        *self == actual || (*self == FieldType::Number && actual == FieldType::Integer)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Null => "null",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" | "text" => Ok(FieldType::String),
            "number" | "float" | "double" => Ok(FieldType::Number),
            "integer" | "int" => Ok(FieldType::Integer),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "date" | "datetime" | "date-time" => Ok(FieldType::Date),
            "array" => Ok(FieldType::Array),
            "object" => Ok(FieldType::Object),
            "null" => Ok(FieldType::Null),
            _ => Err(format!("Unknown field type: {}", s)),
        }
    }
}

/// How a cast converts values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastStrategy {
    /// Parse textual values into the target type
    #[default]
    Parse,
    /// Lenient coercion between scalar types
    Cast,
    /// No conversion; anything not already the target type fails
    Reject,
}

/// What happens to a row whose cast fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CastFailurePolicy {
    /// Keep the unconverted value and flag a warning
    #[default]
    KeepOriginal,
    /// Replace the value with null and flag a warning
    SetNull,
    /// Exclude the row from event creation
    RejectRow,
}

fn default_active() -> bool {
    true
}

/// One configured import transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ImportTransform {
    /// Move a value to a new key; the source key does not survive
    Rename {
        from: String,
        to: String,
        #[serde(default = "default_active")]
        active: bool,
    },
    /// Convert the value at `from` to `to_type`
    #[serde(rename_all = "camelCase")]
    TypeCast {
        from: String,
        from_type: FieldType,
        to_type: FieldType,
        #[serde(default)]
        strategy: CastStrategy,
        #[serde(default)]
        on_failure: CastFailurePolicy,
        #[serde(default = "default_active")]
        active: bool,
    },
}

impl ImportTransform {
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        ImportTransform::Rename {
            from: from.into(),
            to: to.into(),
            active: true,
        }
    }

    pub fn type_cast(
        from: impl Into<String>,
        from_type: FieldType,
        to_type: FieldType,
        strategy: CastStrategy,
    ) -> Self {
        ImportTransform::TypeCast {
            from: from.into(),
            from_type,
            to_type,
            strategy,
            on_failure: CastFailurePolicy::default(),
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            ImportTransform::Rename { active, .. } | ImportTransform::TypeCast { active, .. } => {
                *active
            }
        }
    }
}

/// Dataset-level type correction, applied after the import transforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTransformation {
    pub field_path: String,
    pub from_type: FieldType,
    pub to_type: FieldType,
    #[serde(default)]
    pub strategy: CastStrategy,
    #[serde(default)]
    pub on_failure: CastFailurePolicy,
    #[serde(default = "default_active")]
    pub enabled: bool,
}

//! Schema inference engine

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::config::InferenceConfig;
use super::error::InferenceError;
use super::types::{InferredField, InferredSchema, InferredType};
use crate::models::{FieldMetadata, Row};

/// Deepest `a.b.c` path a row may carry
pub const MAX_NESTING_DEPTH: usize = 10;

/// Schema inference engine
///
/// Analyzes rows and builds a schema definition plus per-field occurrence
/// statistics. Paths are tracked as `a`, `a.b`, `a.b[]`.
pub struct SchemaInferrer {
    config: InferenceConfig,
    /// path -> observed types
    field_types: HashMap<String, Vec<InferredType>>,
    field_occurrences: HashMap<String, usize>,
    field_nulls: HashMap<String, usize>,
    field_examples: HashMap<String, Vec<Value>>,
    record_count: usize,
}

impl SchemaInferrer {
    /// Create a new schema inferrer with default configuration
    pub fn new() -> Self {
        Self::with_config(InferenceConfig::default())
    }

    pub fn with_config(config: InferenceConfig) -> Self {
        Self {
            config,
            field_types: HashMap::new(),
            field_occurrences: HashMap::new(),
            field_nulls: HashMap::new(),
            field_examples: HashMap::new(),
            record_count: 0,
        }
    }

    /// Whether the sample limit has been reached
    pub fn is_full(&self) -> bool {
        self.config.sample_size > 0 && self.record_count >= self.config.sample_size
    }

    /// Add a row for analysis
    pub fn add_row(&mut self, row: &Row) -> Result<(), InferenceError> {
        if self.is_full() {
            return Ok(());
        }
        self.record_count += 1;
        for (key, value) in row {
            self.analyze_value(value, key, 1)?;
        }
        Ok(())
    }

    /// Add a parsed JSON value for analysis; the root must be an object
    pub fn add_value(&mut self, value: &Value) -> Result<(), InferenceError> {
        match value {
            Value::Object(row) => self.add_row(row),
            other => Err(InferenceError::InvalidStructure(
                InferredType::of(other).type_name().to_string(),
            )),
        }
    }

    fn analyze_value(
        &mut self,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<(), InferenceError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(InferenceError::MaxDepthExceeded {
                depth,
                max: MAX_NESTING_DEPTH,
            });
        }

        *self.field_occurrences.entry(path.to_string()).or_insert(0) += 1;
        self.field_types
            .entry(path.to_string())
            .or_default()
            .push(InferredType::of(value));

        match value {
            Value::Null => {
                *self.field_nulls.entry(path.to_string()).or_insert(0) += 1;
            }
            Value::Object(obj) => {
                for (key, child) in obj {
                    self.analyze_value(child, &format!("{}.{}", path, key), depth + 1)?;
                }
            }
            Value::Array(items) => {
                let item_path = format!("{}[]", path);
                for item in items {
                    self.analyze_value(item, &item_path, depth + 1)?;
                }
            }
            scalar => {
                if self.config.collect_examples {
                    let examples = self.field_examples.entry(path.to_string()).or_default();
                    if examples.len() < self.config.max_examples && !examples.contains(scalar) {
                        examples.push(scalar.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Finalize inference and generate schema
    pub fn finalize(self) -> Result<InferredSchema, InferenceError> {
        if self.record_count == 0 {
            return Err(InferenceError::NoRecords);
        }

        let root = InferredType::Object {
            properties: self.build_properties(None, self.record_count),
        };

        let mut field_metadata = BTreeMap::new();
        for (path, occurrences) in &self.field_occurrences {
            if path.contains("[]") {
                continue;
            }
            let mut types: BTreeMap<String, usize> = BTreeMap::new();
            for t in self.field_types.get(path).into_iter().flatten() {
                *types.entry(t.type_name().to_string()).or_insert(0) += 1;
            }
            field_metadata.insert(
                path.clone(),
                FieldMetadata {
                    occurrences: *occurrences,
                    occurrence_percent: *occurrences as f64 * 100.0 / self.record_count as f64,
                    null_count: self.field_nulls.get(path).copied().unwrap_or(0),
                    types,
                },
            );
        }

        Ok(InferredSchema {
            root,
            record_count: self.record_count,
            field_metadata,
        })
    }

    /// Properties of the object at `parent` (root when `None`)
    fn build_properties(
        &self,
        parent: Option<&str>,
        parent_occurrences: usize,
    ) -> BTreeMap<String, InferredField> {
        let mut properties = BTreeMap::new();

        for (path, types) in &self.field_types {
            let name = match parent {
                None => path.as_str(),
                Some(parent) => match path
                    .strip_prefix(parent)
                    .and_then(|rest| rest.strip_prefix('.'))
                {
                    Some(rest) => rest,
                    None => continue,
                },
            };
            // Only direct children
            if name.contains('.') || name.contains('[') {
                continue;
            }

            let mut field_type = self.merged_type(types);
            match &mut field_type {
                InferredType::Object { properties } => {
                    let occurrences = self.field_occurrences.get(path).copied().unwrap_or(0);
                    *properties = self.build_properties(Some(path), occurrences);
                }
                InferredType::Array { items } => {
                    let item_path = format!("{}[]", path);
                    if let Some(item_types) = self.field_types.get(&item_path) {
                        let mut item_type = self.merged_type(item_types);
                        if let InferredType::Object { properties } = &mut item_type {
                            let occurrences =
                                self.field_occurrences.get(&item_path).copied().unwrap_or(0);
                            *properties = self.build_properties(Some(&item_path), occurrences);
                        }
                        *items = Box::new(item_type);
                    }
                }
                _ => {}
            }

            let occurrences = self.field_occurrences.get(path).copied().unwrap_or(0);
            let null_count = self.field_nulls.get(path).copied().unwrap_or(0);

            let mut field = InferredField::new(field_type);
            field.required = occurrences >= parent_occurrences;
            field.nullable = null_count > 0;
            field.occurrences = occurrences;
            if let Some(examples) = self.field_examples.get(path) {
                field.examples = examples.clone();
            }

            properties.insert(name.to_string(), field);
        }

        properties
    }

    fn merged_type(&self, types: &[InferredType]) -> InferredType {
        types
            .iter()
            .cloned()
            .fold(InferredType::Unknown, InferredType::merge_with)
    }

    /// Get the number of records processed
    pub fn record_count(&self) -> usize {
        self.record_count
    }
}

impl Default for SchemaInferrer {
    fn default() -> Self {
        Self::new()
    }
}

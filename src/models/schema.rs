//! Versioned dataset schemas

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-field occurrence statistics captured with a schema version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub occurrences: usize,
    /// Share of sampled records containing the field (0-100)
    pub occurrence_percent: f64,
    pub null_count: usize,
    /// Observed type name -> count
    #[serde(default)]
    pub types: BTreeMap<String, usize>,
}

/// A type change between two schema versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeChange {
    pub path: String,
    pub from: String,
    pub to: String,
    /// Whether existing data stays valid under the new type
    pub compatible: bool,
}

/// Difference of a schema against its predecessor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSummary {
    pub total_fields: usize,
    pub new_fields: Vec<String>,
    pub removed_fields: Vec<String>,
    pub type_changes: Vec<TypeChange>,
}

impl SchemaSummary {
    pub fn has_changes(&self) -> bool {
        !self.new_fields.is_empty()
            || !self.removed_fields.is_empty()
            || !self.type_changes.is_empty()
    }

    /// Type changes existing events would not satisfy
    pub fn breaking_changes(&self) -> Vec<&TypeChange> {
        self.type_changes.iter().filter(|c| !c.compatible).collect()
    }

    /// Only new fields, nothing removed or retyped
    pub fn is_additive(&self) -> bool {
        self.removed_fields.is_empty() && self.type_changes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaApproval {
    pub approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub auto_approved: bool,
}

/// What produced a schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchemaSource {
    /// Regenerated from events already stored
    Inferred { events_sampled: usize },
    /// Detected from an import job and approved
    Import { job_id: Uuid },
}

/// A schema version before the store assigns its id and version number
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDatasetSchema {
    pub dataset_id: Uuid,
    /// JSON Schema definition
    pub schema: serde_json::Value,
    pub field_metadata: BTreeMap<String, FieldMetadata>,
    pub schema_summary: SchemaSummary,
    pub event_count_at_creation: u64,
    pub approval: SchemaApproval,
    pub source: SchemaSource,
}

/// An immutable schema version; regeneration appends a new one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSchema {
    pub id: Uuid,
    pub dataset_id: Uuid,
    /// Strictly increasing per dataset
    pub version_number: u32,
    pub schema: serde_json::Value,
    pub field_metadata: BTreeMap<String, FieldMetadata>,
    pub schema_summary: SchemaSummary,
    pub event_count_at_creation: u64,
    pub approval: SchemaApproval,
    pub source: SchemaSource,
    pub created_at: DateTime<Utc>,
}

impl DatasetSchema {
    /// Materialize a pending schema with its assigned version
    pub fn from_new(new: NewDatasetSchema, version_number: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_id: new.dataset_id,
            version_number,
            schema: new.schema,
            field_metadata: new.field_metadata,
            schema_summary: new.schema_summary,
            event_count_at_creation: new.event_count_at_creation,
            approval: new.approval,
            source: new.source,
            created_at,
        }
    }
}

//! Dataset configuration consumed by the pipeline

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transform::{ImportTransform, TypeTransformation};

/// How rows sharing a dedup key are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateStrategy {
    /// Skip repeats within the file and rows already present in the dataset
    #[default]
    Skip,
    /// Within the file the earliest occurrence wins; prior imports are not consulted
    KeepFirst,
    /// Within the file the latest occurrence wins; prior imports are not consulted
    KeepLast,
}

impl DuplicateStrategy {
    /// Whether rows are also checked against events already in the dataset
    pub fn checks_existing_events(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

impl std::str::FromStr for DuplicateStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "keep-first" | "keep_first" | "first" => Ok(Self::KeepFirst),
            "keep-last" | "keep_last" | "last" => Ok(Self::KeepLast),
            _ => Err(format!(
                "Invalid duplicate strategy: {}. Expected: skip, keep-first, keep-last",
                s
            )),
        }
    }
}

/// Source of a row's dedup key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IdStrategyKind {
    /// Fingerprint of the full row content
    #[default]
    Auto,
    /// Value found at a path in the row
    External { path: String },
    /// Fingerprint over a subset of fields
    Computed { fields: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdStrategy {
    #[serde(default)]
    pub kind: IdStrategyKind,
    #[serde(default)]
    pub duplicate_strategy: DuplicateStrategy,
}

/// Schema evolution controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    /// Every schema change needs an explicit approval
    pub locked: bool,
    /// Additive changes are approved automatically
    pub auto_grow: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            locked: false,
            auto_grow: true,
        }
    }
}

/// Administrator-pinned field roles, applied over detection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingOverrides {
    pub title_path: Option<String>,
    pub description_path: Option<String>,
    pub timestamp_path: Option<String>,
    pub location_path: Option<String>,
    pub latitude_path: Option<String>,
    pub longitude_path: Option<String>,
}

/// A dataset and the import configuration its administrators maintain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: Uuid,
    pub catalog_id: Option<Uuid>,
    pub name: String,
    /// ISO 639 language code driving field-name vocabularies
    pub language: String,
    /// Ordered transforms applied to every row before interpretation
    #[serde(default)]
    pub import_transforms: Vec<ImportTransform>,
    /// Type corrections applied after the import transforms
    #[serde(default)]
    pub type_transformations: Vec<TypeTransformation>,
    #[serde(default)]
    pub id_strategy: IdStrategy,
    #[serde(default)]
    pub schema_config: SchemaConfig,
    #[serde(default)]
    pub field_mapping_overrides: FieldMappingOverrides,
    #[serde(default = "default_geocoding_enabled")]
    pub geocoding_enabled: bool,
}

fn default_geocoding_enabled() -> bool {
    true
}

impl Dataset {
    /// Create a dataset with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            catalog_id: None,
            name: name.into(),
            language: "eng".to_string(),
            import_transforms: Vec::new(),
            type_transformations: Vec::new(),
            id_strategy: IdStrategy::default(),
            schema_config: SchemaConfig::default(),
            field_mapping_overrides: FieldMappingOverrides::default(),
            geocoding_enabled: true,
        }
    }

    pub fn with_catalog(mut self, catalog_id: Uuid) -> Self {
        self.catalog_id = Some(catalog_id);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_import_transforms(mut self, transforms: Vec<ImportTransform>) -> Self {
        self.import_transforms = transforms;
        self
    }

    pub fn with_type_transformations(mut self, transformations: Vec<TypeTransformation>) -> Self {
        self.type_transformations = transformations;
        self
    }

    pub fn with_id_strategy(mut self, id_strategy: IdStrategy) -> Self {
        self.id_strategy = id_strategy;
        self
    }

    pub fn with_schema_config(mut self, schema_config: SchemaConfig) -> Self {
        self.schema_config = schema_config;
        self
    }

    pub fn with_field_mapping_overrides(mut self, overrides: FieldMappingOverrides) -> Self {
        self.field_mapping_overrides = overrides;
        self
    }

    pub fn with_geocoding(mut self, enabled: bool) -> Self {
        self.geocoding_enabled = enabled;
        self
    }
}

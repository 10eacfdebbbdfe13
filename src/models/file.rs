//! Uploaded source files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status rollup of an import file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFileStatus {
    /// Uploaded, no job has run yet
    Pending,
    /// At least one job is still moving through the pipeline
    Processing,
    /// Every job finished
    Completed,
    /// At least one job failed
    Failed,
    /// Skipped before processing (duplicate resubmission)
    Skipped,
}

impl std::fmt::Display for ImportFileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Tabular format of the uploaded bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Comma separated values with a header row
    #[default]
    Csv,
    /// A JSON array of objects
    Json,
}

impl std::str::FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown file format: {}", s)),
        }
    }
}

/// A raw upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFile {
    pub id: Uuid,
    /// Catalog the upload belongs to
    pub catalog_id: Option<Uuid>,
    /// Identity of a recurring source (scheduled URL, feed name)
    pub source_key: Option<String>,
    /// Original file name, informational only
    pub file_name: String,
    pub format: FileFormat,
    /// Raw bytes as uploaded
    #[serde(skip)]
    pub content: Vec<u8>,
    /// SHA-256 of `content`, set when jobs are created
    pub content_hash: Option<String>,
    pub status: ImportFileStatus,
    pub is_duplicate: bool,
    pub skip_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportFile {
    /// Create a pending file from uploaded bytes
    pub fn new(file_name: impl Into<String>, format: FileFormat, content: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            catalog_id: None,
            source_key: None,
            file_name: file_name.into(),
            format,
            content,
            content_hash: None,
            status: ImportFileStatus::Pending,
            is_duplicate: false,
            skip_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the file to a catalog
    pub fn with_catalog(mut self, catalog_id: Uuid) -> Self {
        self.catalog_id = Some(catalog_id);
        self
    }

    /// Mark the file as coming from a recurring source
    pub fn with_source_key(mut self, source_key: impl Into<String>) -> Self {
        self.source_key = Some(source_key.into());
        self
    }

    /// Mark the file as a byte-identical resubmission
    pub fn mark_duplicate(&mut self, original: &ImportFile, now: DateTime<Utc>) {
        self.is_duplicate = true;
        self.status = ImportFileStatus::Skipped;
        self.skip_reason = Some(format!(
            "Duplicate of import {} (identical content)",
            original.id
        ));
        self.updated_at = now;
    }
}

/// Pairing of one sheet of a file with the dataset it feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetAssignment {
    pub sheet_index: usize,
    pub dataset_id: Uuid,
}

impl SheetAssignment {
    pub fn new(sheet_index: usize, dataset_id: Uuid) -> Self {
        Self {
            sheet_index,
            dataset_id,
        }
    }
}

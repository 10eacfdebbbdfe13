//! Domain records shared by the import pipeline
//!
//! These are the persisted shapes the pipeline reads and writes through an
//! [`ImportStore`](crate::store::ImportStore): uploaded files, the jobs that
//! process them, dataset configuration, versioned dataset schemas, and the
//! events the pipeline produces.

pub mod dataset;
pub mod event;
pub mod file;
pub mod job;
pub mod schema;

pub use dataset::{
    Dataset, DuplicateStrategy, FieldMappingOverrides, IdStrategy, IdStrategyKind, SchemaConfig,
};
pub use event::{Event, GeoPoint, LocationSource};
pub use file::{FileFormat, ImportFile, ImportFileStatus, SheetAssignment};
pub use job::{
    ErrorLog, GeocodingState, ImportJob, JobCounters, JobProgress, RowError, SchemaValidation,
    StageTransition, TransitionReason,
};
pub use schema::{
    DatasetSchema, FieldMetadata, NewDatasetSchema, SchemaApproval, SchemaSource, SchemaSummary,
    TypeChange,
};

/// A single tabular row, keyed by column name.
///
/// Values stay semi-structured until the create-events boundary.
pub type Row = serde_json::Map<String, serde_json::Value>;

//! Event Ingest - stage-based import pipeline for tabular event data
//!
//! Provides:
//! - Sheet parsing for CSV and JSON uploads
//! - Ordered rename/type-cast transforms applied before interpretation
//! - Schema inference, versioning and freshness checks
//! - Language-aware field role detection
//! - Row and whole-file duplicate detection
//! - Batched geocoding through a pluggable geocoder
//! - A retryable stage state machine with error recovery and progress reporting

pub mod dedup;
pub mod geocoding;
pub mod inference;
pub mod ingest;
pub mod mapping;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod transform;

// Re-export commonly used types
pub use geocoding::{Geocoder, GeocodingError, GeocodingResult};
pub use inference::{InferOptions, SchemaFreshness, SchemaInferenceOutcome, SchemaService};
pub use mapping::{FieldMappingDetector, FieldMappings};
pub use models::{
    Dataset, DatasetSchema, Event, FileFormat, ImportFile, ImportFileStatus, ImportJob, Row,
    SheetAssignment,
};
pub use pipeline::{
    ErrorRecoveryService, ImportStage, PipelineConfig, PipelineError, PipelineResult,
    StagePipelineController, StepOutcome,
};
pub use progress::{ImportProgressReport, ProgressTracker};
pub use store::{ImportStore, MemoryStore, StoreError};
pub use transform::{ImportTransform, TransformPipeline};

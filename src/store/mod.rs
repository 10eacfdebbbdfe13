//! Persistence abstraction
//!
//! Defines the [`ImportStore`] trait the pipeline runs against. The datastore
//! only needs atomic single-record read-modify-write and filtered queries;
//! nothing here relies on cross-record transactions.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Dataset, DatasetSchema, Event, ImportFile, ImportJob, NewDatasetSchema};
use crate::pipeline::ImportStage;

pub mod memory;

pub use memory::MemoryStore;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Datastore used by the pipeline
#[async_trait]
pub trait ImportStore: Send + Sync {
    /// Load a dataset
    async fn get_dataset(&self, id: Uuid) -> StoreResult<Option<Dataset>>;

    /// Insert or replace a dataset
    async fn save_dataset(&self, dataset: &Dataset) -> StoreResult<()>;

    /// Load an import file
    async fn get_file(&self, id: Uuid) -> StoreResult<Option<ImportFile>>;

    /// Insert or replace an import file
    async fn save_file(&self, file: &ImportFile) -> StoreResult<()>;

    /// Completed files whose content hash equals `content_hash`
    async fn find_completed_files_by_hash(&self, content_hash: &str)
    -> StoreResult<Vec<ImportFile>>;

    /// Load a job
    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ImportJob>>;

    /// Insert or replace a job
    async fn save_job(&self, job: &ImportJob) -> StoreResult<()>;

    /// Jobs currently at `stage`, oldest first
    async fn find_jobs_by_stage(&self, stage: ImportStage) -> StoreResult<Vec<ImportJob>>;

    /// Jobs derived from one file, oldest first
    async fn find_jobs_for_file(&self, file_id: Uuid) -> StoreResult<Vec<ImportJob>>;

    /// Highest version for a dataset
    async fn latest_schema(&self, dataset_id: Uuid) -> StoreResult<Option<DatasetSchema>>;

    /// Append a schema version; the store assigns `previous max + 1` atomically
    async fn append_schema(
        &self,
        schema: NewDatasetSchema,
        created_at: DateTime<Utc>,
    ) -> StoreResult<DatasetSchema>;

    /// All versions for a dataset, ascending
    async fn list_schemas(&self, dataset_id: Uuid) -> StoreResult<Vec<DatasetSchema>>;

    /// Number of events in a dataset
    async fn count_events(&self, dataset_id: Uuid) -> StoreResult<u64>;

    /// Up to `limit` events spread across the dataset
    async fn sample_events(&self, dataset_id: Uuid, limit: usize) -> StoreResult<Vec<Event>>;

    /// Insert unless an event with the same id exists; returns whether it was inserted
    async fn insert_event(&self, event: &Event) -> StoreResult<bool>;

    /// Delete an event; returns whether it existed
    async fn delete_event(&self, dataset_id: Uuid, event_id: Uuid) -> StoreResult<bool>;

    /// Subset of `unique_ids` already used by events of the dataset
    async fn existing_unique_ids(
        &self,
        dataset_id: Uuid,
        unique_ids: &[String],
    ) -> StoreResult<HashSet<String>>;

    /// All events of a dataset in insertion order
    async fn list_events(&self, dataset_id: Uuid) -> StoreResult<Vec<Event>>;
}

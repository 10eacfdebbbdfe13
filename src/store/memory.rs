//! In-process [`ImportStore`] backed by maps behind a `tokio` lock

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ImportStore, StoreResult};
use crate::models::{
    Dataset, DatasetSchema, Event, ImportFile, ImportFileStatus, ImportJob, NewDatasetSchema,
};
use crate::pipeline::ImportStage;

#[derive(Debug, Default)]
struct MemoryState {
    datasets: HashMap<Uuid, Dataset>,
    files: HashMap<Uuid, ImportFile>,
    jobs: HashMap<Uuid, ImportJob>,
    schemas: HashMap<Uuid, Vec<DatasetSchema>>,
    events: HashMap<Uuid, Vec<Event>>,
    event_ids: HashSet<Uuid>,
}

/// Store for tests, the CLI, and single-process deployments
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_jobs<'a>(jobs: impl Iterator<Item = &'a ImportJob>) -> Vec<ImportJob> {
    let mut jobs: Vec<ImportJob> = jobs.cloned().collect();
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    jobs
}

#[async_trait]
impl ImportStore for MemoryStore {
    async fn get_dataset(&self, id: Uuid) -> StoreResult<Option<Dataset>> {
        Ok(self.state.read().await.datasets.get(&id).cloned())
    }

    async fn save_dataset(&self, dataset: &Dataset) -> StoreResult<()> {
        self.state
            .write()
            .await
            .datasets
            .insert(dataset.id, dataset.clone());
        Ok(())
    }

    async fn get_file(&self, id: Uuid) -> StoreResult<Option<ImportFile>> {
        Ok(self.state.read().await.files.get(&id).cloned())
    }

    async fn save_file(&self, file: &ImportFile) -> StoreResult<()> {
        self.state.write().await.files.insert(file.id, file.clone());
        Ok(())
    }

    async fn find_completed_files_by_hash(
        &self,
        content_hash: &str,
    ) -> StoreResult<Vec<ImportFile>> {
        let state = self.state.read().await;
        let mut files: Vec<ImportFile> = state
            .files
            .values()
            .filter(|f| {
                f.status == ImportFileStatus::Completed
                    && f.content_hash.as_deref() == Some(content_hash)
            })
            .cloned()
            .collect();
        files.sort_by_key(|f| f.created_at);
        Ok(files)
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ImportJob>> {
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn save_job(&self, job: &ImportJob) -> StoreResult<()> {
        self.state.write().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_jobs_by_stage(&self, stage: ImportStage) -> StoreResult<Vec<ImportJob>> {
        let state = self.state.read().await;
        Ok(sorted_jobs(state.jobs.values().filter(|j| j.stage == stage)))
    }

    async fn find_jobs_for_file(&self, file_id: Uuid) -> StoreResult<Vec<ImportJob>> {
        let state = self.state.read().await;
        Ok(sorted_jobs(
            state.jobs.values().filter(|j| j.import_file_id == file_id),
        ))
    }

    async fn latest_schema(&self, dataset_id: Uuid) -> StoreResult<Option<DatasetSchema>> {
        let state = self.state.read().await;
        Ok(state
            .schemas
            .get(&dataset_id)
            .and_then(|versions| versions.iter().max_by_key(|s| s.version_number))
            .cloned())
    }

    async fn append_schema(
        &self,
        schema: NewDatasetSchema,
        created_at: DateTime<Utc>,
    ) -> StoreResult<DatasetSchema> {
        let mut state = self.state.write().await;
        let versions = state.schemas.entry(schema.dataset_id).or_default();
        let next_version = versions
            .iter()
            .map(|s| s.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        let stored = DatasetSchema::from_new(schema, next_version, created_at);
        versions.push(stored.clone());
        Ok(stored)
    }

    async fn list_schemas(&self, dataset_id: Uuid) -> StoreResult<Vec<DatasetSchema>> {
        let state = self.state.read().await;
        let mut versions = state.schemas.get(&dataset_id).cloned().unwrap_or_default();
        versions.sort_by_key(|s| s.version_number);
        Ok(versions)
    }

    async fn count_events(&self, dataset_id: Uuid) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.events.get(&dataset_id).map_or(0, |e| e.len() as u64))
    }

    async fn sample_events(&self, dataset_id: Uuid, limit: usize) -> StoreResult<Vec<Event>> {
        let state = self.state.read().await;
        let Some(events) = state.events.get(&dataset_id) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        if events.len() <= limit {
            return Ok(events.clone());
        }
        let step = events.len() / limit;
        Ok(events.iter().step_by(step).take(limit).cloned().collect())
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if !state.event_ids.insert(event.id) {
            return Ok(false);
        }
        state
            .events
            .entry(event.dataset_id)
            .or_default()
            .push(event.clone());
        Ok(true)
    }

    async fn delete_event(&self, dataset_id: Uuid, event_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let removed = match state.events.get_mut(&dataset_id) {
            Some(events) => {
                let before = events.len();
                events.retain(|e| e.id != event_id);
                events.len() != before
            }
            None => false,
        };
        if removed {
            state.event_ids.remove(&event_id);
        }
        Ok(removed)
    }

    async fn existing_unique_ids(
        &self,
        dataset_id: Uuid,
        unique_ids: &[String],
    ) -> StoreResult<HashSet<String>> {
        let state = self.state.read().await;
        let wanted: HashSet<&str> = unique_ids.iter().map(String::as_str).collect();
        Ok(state
            .events
            .get(&dataset_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| wanted.contains(e.unique_id.as_str()))
                    .map(|e| e.unique_id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_events(&self, dataset_id: Uuid) -> StoreResult<Vec<Event>> {
        let state = self.state.read().await;
        Ok(state.events.get(&dataset_id).cloned().unwrap_or_default())
    }
}

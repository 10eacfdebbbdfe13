//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use event_ingest::geocoding::{Geocoder, GeocodingError, GeocodingResult};
use event_ingest::models::{
    Dataset, DatasetSchema, Event, FileFormat, ImportFile, ImportJob, NewDatasetSchema,
    SheetAssignment,
};
use event_ingest::pipeline::{
    ErrorRecoveryService, FixedClock, ImportStage, MAX_STAGE_STEPS, PipelineConfig,
    StagePipelineController, StepOutcome,
};
use event_ingest::store::{ImportStore, MemoryStore, StoreError, StoreResult};

pub const EVENTS_CSV: &str = "\
title,description,date,location
Spring Concert,Open air concert,2024-05-01,Marktplatz 1 Berlin
Poetry Night,Readings,2024-05-03,Hauptstr. 5 Hamburg
Farmers Market,Local produce,2024-05-04,Marktplatz 1 Berlin
Film Evening,Classic films,2024-05-10,Kinoweg 2 Koeln
";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Controller, store and clock wired together
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub controller: StagePipelineController,
    pub config: PipelineConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_geocoder(config: PipelineConfig, geocoder: Arc<dyn Geocoder>) -> Self {
        Self::build(config, Some(geocoder))
    }

    fn build(config: PipelineConfig, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(start_time()));
        let mut controller =
            StagePipelineController::new(store.clone(), clock.clone(), config.clone())
                .expect("valid config");
        if let Some(geocoder) = geocoder {
            controller = controller.with_geocoder(geocoder);
        }
        Self {
            store,
            clock,
            controller,
            config,
        }
    }

    pub fn recovery(&self) -> ErrorRecoveryService {
        ErrorRecoveryService::new(self.store.clone(), self.clock.clone(), self.config.recovery)
    }

    pub async fn add_dataset(&self, dataset: Dataset) -> Dataset {
        self.store.save_dataset(&dataset).await.unwrap();
        dataset
    }

    pub async fn upload(&self, file: ImportFile) -> ImportFile {
        self.store.save_file(&file).await.unwrap();
        file
    }

    pub async fn upload_csv(&self, content: &str) -> ImportFile {
        self.upload(csv_file(content)).await
    }

    /// Create jobs for sheet 0 and drive each one as far as it goes
    pub async fn import(&self, file: &ImportFile, dataset: &Dataset) -> Vec<(ImportJob, StepOutcome)> {
        let jobs = self
            .controller
            .create_jobs(file.id, &[SheetAssignment::new(0, dataset.id)])
            .await
            .unwrap();
        let mut results = Vec::new();
        for job in jobs {
            let outcome = self.controller.drive(job.id, MAX_STAGE_STEPS).await.unwrap();
            results.push((self.job(job.id).await, outcome));
        }
        results
    }

    pub async fn job(&self, id: uuid::Uuid) -> ImportJob {
        self.store.get_job(id).await.unwrap().expect("job exists")
    }

    pub async fn file(&self, id: uuid::Uuid) -> ImportFile {
        self.store.get_file(id).await.unwrap().expect("file exists")
    }
}

pub fn csv_file(content: &str) -> ImportFile {
    ImportFile::new("events.csv", FileFormat::Csv, content.as_bytes().to_vec())
}

/// Geocoder answering from a fixed table
pub struct StaticGeocoder {
    known: HashMap<String, (f64, f64)>,
    calls: AtomicUsize,
}

impl StaticGeocoder {
    pub fn new(known: &[(&str, f64, f64)]) -> Self {
        Self {
            known: known
                .iter()
                .map(|(address, lat, lon)| (address.to_string(), (*lat, *lon)))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodingResult, GeocodingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.known.get(address) {
            Some((latitude, longitude)) => Ok(GeocodingResult {
                latitude: *latitude,
                longitude: *longitude,
                confidence: 0.9,
                provider: "static".to_string(),
                normalized_address: address.to_uppercase(),
                components: BTreeMap::new(),
                from_cache: false,
            }),
            None => Err(GeocodingError::AllProvidersFailed {
                address: address.to_string(),
                attempts: vec!["static".to_string()],
            }),
        }
    }
}

/// Store whose event inserts start failing after a set number of writes
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    inserts_left: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            inserts_left: AtomicUsize::new(usize::MAX),
        }
    }

    /// Allow `count` more inserts, then fail every later one
    pub fn fail_inserts_after(&self, count: usize) {
        self.inserts_left.store(count, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.inserts_left.store(usize::MAX, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImportStore for FlakyStore {
    async fn get_dataset(&self, id: uuid::Uuid) -> StoreResult<Option<Dataset>> {
        self.inner.get_dataset(id).await
    }

    async fn save_dataset(&self, dataset: &Dataset) -> StoreResult<()> {
        self.inner.save_dataset(dataset).await
    }

    async fn get_file(&self, id: uuid::Uuid) -> StoreResult<Option<ImportFile>> {
        self.inner.get_file(id).await
    }

    async fn save_file(&self, file: &ImportFile) -> StoreResult<()> {
        self.inner.save_file(file).await
    }

    async fn find_completed_files_by_hash(
        &self,
        content_hash: &str,
    ) -> StoreResult<Vec<ImportFile>> {
        self.inner.find_completed_files_by_hash(content_hash).await
    }

    async fn get_job(&self, id: uuid::Uuid) -> StoreResult<Option<ImportJob>> {
        self.inner.get_job(id).await
    }

    async fn save_job(&self, job: &ImportJob) -> StoreResult<()> {
        self.inner.save_job(job).await
    }

    async fn find_jobs_by_stage(&self, stage: ImportStage) -> StoreResult<Vec<ImportJob>> {
        self.inner.find_jobs_by_stage(stage).await
    }

    async fn find_jobs_for_file(&self, file_id: uuid::Uuid) -> StoreResult<Vec<ImportJob>> {
        self.inner.find_jobs_for_file(file_id).await
    }

    async fn latest_schema(&self, dataset_id: uuid::Uuid) -> StoreResult<Option<DatasetSchema>> {
        self.inner.latest_schema(dataset_id).await
    }

    async fn append_schema(
        &self,
        schema: NewDatasetSchema,
        created_at: DateTime<Utc>,
    ) -> StoreResult<DatasetSchema> {
        self.inner.append_schema(schema, created_at).await
    }

    async fn list_schemas(&self, dataset_id: uuid::Uuid) -> StoreResult<Vec<DatasetSchema>> {
        self.inner.list_schemas(dataset_id).await
    }

    async fn count_events(&self, dataset_id: uuid::Uuid) -> StoreResult<u64> {
        self.inner.count_events(dataset_id).await
    }

    async fn sample_events(&self, dataset_id: uuid::Uuid, limit: usize) -> StoreResult<Vec<Event>> {
        self.inner.sample_events(dataset_id, limit).await
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<bool> {
        let allowed = self
            .inserts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                usize::MAX => Some(usize::MAX),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok();
        if !allowed {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.insert_event(event).await
    }

    async fn delete_event(&self, dataset_id: uuid::Uuid, event_id: uuid::Uuid) -> StoreResult<bool> {
        self.inner.delete_event(dataset_id, event_id).await
    }

    async fn existing_unique_ids(
        &self,
        dataset_id: uuid::Uuid,
        unique_ids: &[String],
    ) -> StoreResult<HashSet<String>> {
        self.inner.existing_unique_ids(dataset_id, unique_ids).await
    }

    async fn list_events(&self, dataset_id: uuid::Uuid) -> StoreResult<Vec<Event>> {
        self.inner.list_events(dataset_id).await
    }
}

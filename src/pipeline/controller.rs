//! Stage pipeline controller
//!
//! Stateless between calls: every [`StagePipelineController::process_job`]
//! loads the job, runs exactly one stage handler, and persists the outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineResult};
use super::stage::ImportStage;
use super::stages::{self, StageContext, StageStatus};
use crate::dedup::file_content_hash;
use crate::geocoding::Geocoder;
use crate::ingest::sheet_count;
use crate::models::{ErrorLog, ImportFile, ImportFileStatus, ImportJob, SheetAssignment};
use crate::progress::{ImportProgressReport, ProgressTracker};
use crate::store::ImportStore;

/// Result of one controller step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StepOutcome {
    /// The handler succeeded and the job moved forward
    Advanced { from: ImportStage, to: ImportStage },
    /// Waiting for schema approval
    Suspended,
    /// A scheduled retry is not due yet
    Deferred { until: DateTime<Utc> },
    /// The handler failed and the job is now `failed`
    Failed { stage: ImportStage, message: String },
    /// Nothing to do; the job is terminal
    Idle,
}

/// Drives import jobs through the stage table
pub struct StagePipelineController {
    store: Arc<dyn ImportStore>,
    geocoder: Option<Arc<dyn Geocoder>>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl StagePipelineController {
    /// Create a controller; fails on invalid configuration
    pub fn new(
        store: Arc<dyn ImportStore>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::ConfigError)?;
        Ok(Self {
            store,
            geocoder: None,
            clock,
            config,
        })
    }

    /// Attach the geocoding collaborator
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ImportStore> {
        &self.store
    }

    /// Create one job per sheet assignment, unless the file is a resubmission
    ///
    /// A file whose content matches a completed file of the same recurring
    /// source (or, without a source key, the same catalog) is marked as a
    /// duplicate and no jobs are created.
    pub async fn create_jobs(
        &self,
        file_id: Uuid,
        sheets: &[SheetAssignment],
    ) -> PipelineResult<Vec<ImportJob>> {
        let mut file = self
            .store
            .get_file(file_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Import file", file_id))?;

        if sheets.is_empty() {
            return Err(PipelineError::Validation(
                "At least one sheet assignment is required".to_string(),
            ));
        }
        let available = sheet_count(&file);
        if let Some(sheet) = sheets.iter().find(|s| s.sheet_index >= available) {
            return Err(PipelineError::Validation(format!(
                "Sheet {} does not exist",
                sheet.sheet_index
            )));
        }

        let now = self.clock.now();
        let hash = file_content_hash(&file.content);
        file.content_hash = Some(hash.clone());

        let original = self
            .store
            .find_completed_files_by_hash(&hash)
            .await?
            .into_iter()
            .find(|candidate| candidate.id != file.id && same_source(candidate, &file));
        if let Some(original) = original {
            file.mark_duplicate(&original, now);
            self.store.save_file(&file).await?;
            info!(
                file_id = %file.id,
                original_id = %original.id,
                "Skipping byte-identical resubmission"
            );
            return Ok(Vec::new());
        }

        let mut jobs = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            if self.store.get_dataset(sheet.dataset_id).await?.is_none() {
                return Err(PipelineError::not_found("Dataset", sheet.dataset_id));
            }
            jobs.push(ImportJob::new(
                file.id,
                sheet.dataset_id,
                sheet.sheet_index,
                now,
            ));
        }
        for job in &jobs {
            self.store.save_job(job).await?;
        }

        file.status = ImportFileStatus::Processing;
        file.updated_at = now;
        self.store.save_file(&file).await?;

        info!(file_id = %file.id, jobs = jobs.len(), "Created import jobs");
        Ok(jobs)
    }

    /// Run the handler for the job's current stage and persist the result
    pub async fn process_job(&self, job_id: Uuid) -> PipelineResult<StepOutcome> {
        let mut job = self.load_job(job_id).await?;
        if job.is_terminal() {
            return Ok(StepOutcome::Idle);
        }

        let now = self.clock.now();
        if let Some(until) = job.next_retry_at {
            if until > now {
                return Ok(StepOutcome::Deferred { until });
            }
            job.next_retry_at = None;
        }

        let stage = job.stage;
        let span = info_span!("import_step", job_id = %job.id, stage = stage.name());
        let result = self.run_stage(&mut job).instrument(span).await;

        let outcome = match result {
            Ok(StageStatus::Suspended) => {
                job.updated_at = self.clock.now();
                self.store.save_job(&job).await?;
                info!(job_id = %job.id, "Awaiting schema approval");
                StepOutcome::Suspended
            }
            Ok(StageStatus::Done) => {
                let next = stage
                    .next()
                    .ok_or_else(|| PipelineError::stage(stage, "Stage has no successor"))?;
                job.advance_to(next, self.clock.now())?;
                self.store.save_job(&job).await?;
                info!(job_id = %job.id, from = %stage, to = %next, "Stage transition");
                StepOutcome::Advanced {
                    from: stage,
                    to: next,
                }
            }
            Err(e) => {
                error!(job_id = %job.id, stage = %stage, error = %e, "Stage handler failed");
                // Drop uncommitted in-memory work; resume from what was persisted
                let mut persisted = self.store.get_job(job_id).await?.unwrap_or(job);
                let failed_at = self.clock.now();
                persisted.fail(ErrorLog::from_error(&e, stage, failed_at), failed_at)?;
                self.store.save_job(&persisted).await?;
                info!(
                    job_id = %persisted.id,
                    from = %stage,
                    to = ImportStage::Failed.name(),
                    "Stage transition"
                );
                job = persisted;
                StepOutcome::Failed {
                    stage,
                    message: e.sanitized_message(),
                }
            }
        };

        roll_up_file_status(self.store.as_ref(), job.import_file_id, self.clock.now()).await?;
        Ok(outcome)
    }

    /// Step a job until it stops advancing or `max_steps` is reached
    pub async fn drive(&self, job_id: Uuid, max_steps: usize) -> PipelineResult<StepOutcome> {
        let mut last = StepOutcome::Idle;
        for _ in 0..max_steps {
            last = self.process_job(job_id).await?;
            if !matches!(last, StepOutcome::Advanced { .. }) {
                break;
            }
        }
        Ok(last)
    }

    /// Drive every job of a file; jobs run independently of each other
    pub async fn drive_file(
        &self,
        file_id: Uuid,
        max_steps: usize,
    ) -> PipelineResult<Vec<(Uuid, StepOutcome)>> {
        let jobs = self.store.find_jobs_for_file(file_id).await?;
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            let outcome = self.drive(job.id, max_steps).await?;
            outcomes.push((job.id, outcome));
        }
        Ok(outcomes)
    }

    /// Record the external approval of a job's detected schema
    pub async fn approve_schema(
        &self,
        job_id: Uuid,
        approved_by: impl Into<String>,
    ) -> PipelineResult<ImportJob> {
        let mut job = self.load_job(job_id).await?;
        if !matches!(
            job.stage,
            ImportStage::ValidateSchema | ImportStage::AwaitApproval
        ) {
            return Err(PipelineError::Validation(format!(
                "Job is not awaiting schema approval (current stage: {})",
                job.stage
            )));
        }

        let now = self.clock.now();
        let approved_by = approved_by.into();
        job.schema_validation.approved = true;
        job.schema_validation.approved_by = Some(approved_by.clone());
        job.schema_validation.approved_at = Some(now);
        job.updated_at = now;
        self.store.save_job(&job).await?;

        info!(job_id = %job.id, %approved_by, "Schema approved");
        Ok(job)
    }

    /// Progress read model for an import file
    pub async fn progress(&self, file_id: Uuid) -> PipelineResult<ImportProgressReport> {
        let file = self
            .store
            .get_file(file_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Import file", file_id))?;
        let jobs = self.store.find_jobs_for_file(file_id).await?;
        Ok(ProgressTracker::new(&self.config).report(&file, &jobs, self.clock.now()))
    }

    async fn load_job(&self, job_id: Uuid) -> PipelineResult<ImportJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Import job", job_id))
    }

    async fn run_stage(&self, job: &mut ImportJob) -> PipelineResult<StageStatus> {
        let file = self
            .store
            .get_file(job.import_file_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Import file", job.import_file_id))?;
        let dataset = self
            .store
            .get_dataset(job.dataset_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Dataset", job.dataset_id))?;

        let ctx = StageContext {
            store: self.store.as_ref(),
            geocoder: self.geocoder.as_deref(),
            clock: self.clock.as_ref(),
            config: &self.config,
            dataset: &dataset,
            file: &file,
        };
        stages::run(&ctx, job).await
    }
}

fn same_source(candidate: &ImportFile, file: &ImportFile) -> bool {
    match &file.source_key {
        Some(key) => candidate.source_key.as_ref() == Some(key),
        None => candidate.source_key.is_none() && candidate.catalog_id == file.catalog_id,
    }
}

/// Derive a file's status from its jobs
pub(crate) async fn roll_up_file_status(
    store: &dyn ImportStore,
    file_id: Uuid,
    now: DateTime<Utc>,
) -> PipelineResult<()> {
    let Some(mut file) = store.get_file(file_id).await? else {
        warn!(%file_id, "Job references a missing import file");
        return Ok(());
    };
    if file.status == ImportFileStatus::Skipped {
        return Ok(());
    }

    let jobs = store.find_jobs_for_file(file_id).await?;
    let status = if jobs.is_empty() {
        file.status
    } else if jobs.iter().any(|j| j.stage == ImportStage::Failed) {
        ImportFileStatus::Failed
    } else if jobs.iter().all(|j| j.stage == ImportStage::Completed) {
        ImportFileStatus::Completed
    } else {
        ImportFileStatus::Processing
    };

    if status != file.status {
        info!(%file_id, from = %file.status, to = %status, "Import file status changed");
        file.status = status;
        file.updated_at = now;
        store.save_file(&file).await?;
    }
    Ok(())
}

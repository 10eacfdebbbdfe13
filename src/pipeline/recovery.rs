//! Error recovery: retry scheduling, manual reset, recommendations
//!
//! Retry counters live on the job; the retry cap and backoff curve come from
//! [`RecoveryConfig`] and "now" from the injected [`Clock`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::config::RecoveryConfig;
use super::controller::roll_up_file_status;
use super::error::{ErrorKind, PipelineError, PipelineResult};
use super::stage::ImportStage;
use crate::models::ImportJob;
use crate::store::ImportStore;

/// What a recovery call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// The job was not failed; nothing changed
    NotFailed,
    /// The retry cap is reached; a manual reset is required
    MaxRetriesExceeded,
    /// The job re-entered the pipeline with a scheduled retry time
    RetryScheduled,
    /// An administrator moved the job
    ManualReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub job_id: Uuid,
    pub success: bool,
    pub action: RecoveryAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_scheduled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecoveryResult {
    fn rejected(job_id: Uuid, action: RecoveryAction, error: String) -> Self {
        Self {
            job_id,
            success: false,
            action,
            retry_scheduled: None,
            next_retry_at: None,
            error: Some(error),
        }
    }
}

/// Suggested next step for a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Retry,
    ManualReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecommendation {
    pub job_id: Uuid,
    pub import_file_id: Uuid,
    pub dataset_id: Uuid,
    /// Stage whose handler failed
    pub failed_stage: Option<ImportStage>,
    pub error_kind: Option<ErrorKind>,
    pub last_error: Option<String>,
    pub retry_attempts: u32,
    pub max_retries: u32,
    pub retryable: bool,
    pub action: RecommendedAction,
    pub message: String,
}

/// Outcome of a sweep over failed jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRetrySummary {
    /// Failed jobs looked at
    pub examined: usize,
    /// Jobs that received a retry
    pub scheduled: Vec<Uuid>,
    /// Jobs left for a manual reset
    pub exhausted: Vec<Uuid>,
}

/// Retries, resets and classifies failed jobs
pub struct ErrorRecoveryService {
    store: Arc<dyn ImportStore>,
    clock: Arc<dyn Clock>,
    config: RecoveryConfig,
}

impl ErrorRecoveryService {
    pub fn new(store: Arc<dyn ImportStore>, clock: Arc<dyn Clock>, config: RecoveryConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Schedule a retry for a failed job
    ///
    /// The job re-enters at the stage that failed, keeping that stage's
    /// committed batch progress; `nextRetryAt` follows the backoff policy.
    pub async fn recover_failed_job(&self, job_id: Uuid) -> PipelineResult<RecoveryResult> {
        let mut job = self.load_job(job_id).await?;

        if job.stage != ImportStage::Failed {
            return Ok(RecoveryResult::rejected(
                job_id,
                RecoveryAction::NotFailed,
                format!(
                    "Job {} is not in failed state (current stage: {})",
                    job_id, job.stage
                ),
            ));
        }
        if job.retry_attempts >= self.config.max_retries {
            warn!(
                %job_id,
                attempts = job.retry_attempts,
                "Retry refused, manual reset required"
            );
            return Ok(RecoveryResult::rejected(
                job_id,
                RecoveryAction::MaxRetriesExceeded,
                format!(
                    "Maximum retry attempts ({}) exceeded; manual reset required",
                    self.config.max_retries
                ),
            ));
        }

        let now = self.clock.now();
        let target = reentry_stage(&job);
        job.retry_attempts += 1;
        job.last_retry_at = Some(now);
        let next_retry_at = now
            .checked_add_signed(self.config.backoff.delay_for_attempt(job.retry_attempts))
            .ok_or_else(|| PipelineError::ConfigError("Retry time is out of range".to_string()))?;
        job.next_retry_at = Some(next_retry_at);
        job.reenter(target, now)?;
        self.store.save_job(&job).await?;
        roll_up_file_status(self.store.as_ref(), job.import_file_id, now).await?;

        info!(
            %job_id,
            attempt = job.retry_attempts,
            stage = %target,
            %next_retry_at,
            "Scheduled retry"
        );
        Ok(RecoveryResult {
            job_id,
            success: true,
            action: RecoveryAction::RetryScheduled,
            retry_scheduled: Some(true),
            next_retry_at: Some(next_retry_at),
            error: None,
        })
    }

    /// Move a job to any stage, ignoring the stage order
    pub async fn reset_job_to_stage(
        &self,
        job_id: Uuid,
        target: ImportStage,
        clear_retries: bool,
    ) -> PipelineResult<RecoveryResult> {
        let mut job = self.load_job(job_id).await?;
        let now = self.clock.now();
        let from = job.stage;

        job.reset_to(target, now);
        if clear_retries {
            job.retry_attempts = 0;
        }
        job.last_retry_at = Some(now);
        job.next_retry_at = None;
        self.store.save_job(&job).await?;
        roll_up_file_status(self.store.as_ref(), job.import_file_id, now).await?;

        info!(%job_id, %from, to = %target, clear_retries, "Job reset");
        Ok(RecoveryResult {
            job_id,
            success: true,
            action: RecoveryAction::ManualReset,
            retry_scheduled: Some(false),
            next_retry_at: None,
            error: None,
        })
    }

    /// One recommendation per failed job
    pub async fn get_recovery_recommendations(
        &self,
    ) -> PipelineResult<Vec<RecoveryRecommendation>> {
        let failed = self.store.find_jobs_by_stage(ImportStage::Failed).await?;
        Ok(failed.iter().map(|job| self.recommend(job)).collect())
    }

    /// Schedule a retry for every failed job with attempts left
    pub async fn process_pending_retries(&self) -> PipelineResult<PendingRetrySummary> {
        let failed = self.store.find_jobs_by_stage(ImportStage::Failed).await?;
        let mut summary = PendingRetrySummary {
            examined: failed.len(),
            ..Default::default()
        };

        for job in failed {
            let result = self.recover_failed_job(job.id).await?;
            match result.action {
                RecoveryAction::RetryScheduled => summary.scheduled.push(job.id),
                RecoveryAction::MaxRetriesExceeded => summary.exhausted.push(job.id),
                RecoveryAction::NotFailed | RecoveryAction::ManualReset => {}
            }
        }

        info!(
            examined = summary.examined,
            scheduled = summary.scheduled.len(),
            exhausted = summary.exhausted.len(),
            "Processed pending retries"
        );
        Ok(summary)
    }

    fn recommend(&self, job: &ImportJob) -> RecoveryRecommendation {
        let max_retries = self.config.max_retries;
        let retryable = job.retry_attempts < max_retries;
        let (action, message) = if retryable {
            (
                RecommendedAction::Retry,
                format!(
                    "Automatic retry available (attempt {} of {})",
                    job.retry_attempts + 1,
                    max_retries
                ),
            )
        } else {
            (
                RecommendedAction::ManualReset,
                format!(
                    "Job has reached max retries ({}); reset it to a stage manually",
                    max_retries
                ),
            )
        };

        RecoveryRecommendation {
            job_id: job.id,
            import_file_id: job.import_file_id,
            dataset_id: job.dataset_id,
            failed_stage: job.error_log.as_ref().and_then(|e| e.stage),
            error_kind: job.error_log.as_ref().map(|e| e.kind),
            last_error: job.error_log.as_ref().map(|e| e.last_error.clone()),
            retry_attempts: job.retry_attempts,
            max_retries,
            retryable,
            action,
            message,
        }
    }

    async fn load_job(&self, job_id: Uuid) -> PipelineResult<ImportJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Import job", job_id))
    }
}

/// The stage a retry resumes at
fn reentry_stage(job: &ImportJob) -> ImportStage {
    job.error_log
        .as_ref()
        .and_then(|e| e.stage)
        .filter(|stage| !stage.is_terminal())
        .unwrap_or(ImportStage::DetectSchema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorLog;

    #[test]
    fn test_reentry_stage() {
        let mut job = ImportJob::new(Uuid::new_v4(), Uuid::new_v4(), 0, Utc::now());
        assert_eq!(reentry_stage(&job), ImportStage::DetectSchema);

        let err = PipelineError::stage(ImportStage::GeocodeBatch, "timeout");
        job.error_log = Some(ErrorLog::from_error(&err, ImportStage::GeocodeBatch, Utc::now()));
        assert_eq!(reentry_stage(&job), ImportStage::GeocodeBatch);

        job.error_log = Some(ErrorLog::from_error(&err, ImportStage::Completed, Utc::now()));
        assert_eq!(reentry_stage(&job), ImportStage::DetectSchema);
    }
}

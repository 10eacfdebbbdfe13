//! Import jobs: one pipeline run for one sheet/dataset pairing

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schema::{FieldMetadata, SchemaSummary, TypeChange};
use crate::dedup::DuplicateSummary;
use crate::geocoding::GeocodeOutcome;
use crate::mapping::FieldMappings;
use crate::pipeline::{ErrorKind, ImportStage, PipelineError, PipelineResult};
use crate::progress::GeocodingStats;

/// Batch position within the stage that currently owns it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    /// Stage the counters below belong to
    pub stage: Option<ImportStage>,
    pub current: u64,
    pub total: u64,
    pub batch_number: u32,
}

impl JobProgress {
    /// Start tracking a stage from zero
    pub fn begin(&mut self, stage: ImportStage, total: u64) {
        self.stage = Some(stage);
        self.current = 0;
        self.total = total;
        self.batch_number = 0;
    }

    /// Whether the counters belong to `stage`
    pub fn is_for(&self, stage: ImportStage) -> bool {
        self.stage == Some(stage)
    }

    /// Record a committed batch of `processed` items
    pub fn commit_batch(&mut self, processed: u64) {
        self.current += processed;
        self.batch_number += 1;
    }

    /// Completed fraction of the owning stage (0.0 - 1.0)
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Aggregate row counters for a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounters {
    pub total_rows: u64,
    pub processed_rows: u64,
    pub geocoded_rows: u64,
    pub created_events: u64,
    pub skipped_duplicates: u64,
    pub rejected_rows: u64,
    pub transform_warnings: u64,
}

/// Outcome of comparing the detected schema with the dataset's schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaValidation {
    /// Set once validate-schema has run
    pub validated: bool,
    pub is_compatible: bool,
    pub requires_approval: bool,
    pub approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub auto_approved: bool,
    pub summary: SchemaSummary,
    pub breaking_changes: Vec<TypeChange>,
}

/// Geocoding results accumulated across batches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodingState {
    /// Address -> outcome
    pub results: BTreeMap<String, GeocodeOutcome>,
    pub stats: GeocodingStats,
}

impl GeocodingState {
    /// Drop failed outcomes so the addresses are attempted again
    ///
    /// Returns how many were dropped; they are taken back out of the stats.
    pub fn forget_failures(&mut self) -> u64 {
        let before = self.results.len();
        self.results.retain(|_, outcome| outcome.result().is_some());
        let dropped = (before - self.results.len()) as u64;
        self.stats.failed = self.stats.failed.saturating_sub(dropped);
        self.stats.total_addresses = self.stats.total_addresses.saturating_sub(dropped);
        dropped
    }

    pub fn is_resolved(&self, address: &str) -> bool {
        self.results
            .get(address)
            .is_some_and(|outcome| outcome.result().is_some())
    }
}

/// Last fatal error of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLog {
    /// Sanitized, user-visible message
    pub last_error: String,
    pub timestamp: DateTime<Utc>,
    /// Stage whose handler failed
    pub stage: Option<ImportStage>,
    pub kind: ErrorKind,
}

impl ErrorLog {
    pub fn from_error(err: &PipelineError, stage: ImportStage, timestamp: DateTime<Utc>) -> Self {
        Self {
            last_error: err.sanitized_message(),
            timestamp,
            stage: Some(stage),
            kind: err.kind(),
        }
    }
}

/// A non-fatal, per-row problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row_index: usize,
    pub field: Option<String>,
    pub message: String,
    pub kind: ErrorKind,
}

/// Why a stage changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Advance,
    Failure,
    RetryReentry,
    ManualReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub from: ImportStage,
    pub to: ImportStage,
    pub at: DateTime<Utc>,
    pub reason: TransitionReason,
}

/// One pipeline run for one sheet/dataset pairing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub import_file_id: Uuid,
    pub dataset_id: Uuid,
    pub sheet_index: usize,
    pub stage: ImportStage,
    pub retry_attempts: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub progress: JobProgress,
    pub counters: JobCounters,
    pub schema_validation: SchemaValidation,
    /// JSON Schema detected from the sheet
    pub detected_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub detected_field_metadata: BTreeMap<String, FieldMetadata>,
    #[serde(default)]
    pub detected_field_mappings: FieldMappings,
    #[serde(default)]
    pub duplicates: DuplicateSummary,
    #[serde(default)]
    pub geocoding: GeocodingState,
    /// Recorded per-row problems, capped by configuration
    #[serde(default)]
    pub row_errors: Vec<RowError>,
    pub error_log: Option<ErrorLog>,
    /// Dataset schema version this job's events were validated against
    pub dataset_schema_version: Option<u32>,
    #[serde(default)]
    pub stage_history: Vec<StageTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Create a job at the first stage
    pub fn new(
        import_file_id: Uuid,
        dataset_id: Uuid,
        sheet_index: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            import_file_id,
            dataset_id,
            sheet_index,
            stage: ImportStage::DetectSchema,
            retry_attempts: 0,
            last_retry_at: None,
            next_retry_at: None,
            progress: JobProgress::default(),
            counters: JobCounters::default(),
            schema_validation: SchemaValidation::default(),
            detected_schema: None,
            detected_field_metadata: BTreeMap::new(),
            detected_field_mappings: FieldMappings::default(),
            duplicates: DuplicateSummary::default(),
            geocoding: GeocodingState::default(),
            row_errors: Vec::new(),
            error_log: None,
            dataset_schema_version: None,
            stage_history: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move forward along the stage table
    pub fn advance_to(&mut self, next: ImportStage, now: DateTime<Utc>) -> PipelineResult<()> {
        if !self.stage.can_advance_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: self.stage,
                to: next,
            });
        }
        self.record_transition(next, TransitionReason::Advance, now);
        if next == ImportStage::Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Divert to `failed` with the error recorded
    pub fn fail(&mut self, error_log: ErrorLog, now: DateTime<Utc>) -> PipelineResult<()> {
        if self.stage.is_terminal() {
            return Err(PipelineError::IllegalTransition {
                from: self.stage,
                to: ImportStage::Failed,
            });
        }
        self.error_log = Some(error_log);
        self.next_retry_at = None;
        self.record_transition(ImportStage::Failed, TransitionReason::Failure, now);
        Ok(())
    }

    /// Leave `failed` for a retry; batch progress of the target stage is kept
    pub fn reenter(&mut self, stage: ImportStage, now: DateTime<Utc>) -> PipelineResult<()> {
        if self.stage != ImportStage::Failed || stage.is_terminal() {
            return Err(PipelineError::IllegalTransition {
                from: self.stage,
                to: stage,
            });
        }
        self.record_transition(stage, TransitionReason::RetryReentry, now);
        Ok(())
    }

    /// Administrative override: any stage, ordering ignored
    pub fn reset_to(&mut self, stage: ImportStage, now: DateTime<Utc>) {
        self.progress = JobProgress::default();
        self.completed_at = None;
        self.record_transition(stage, TransitionReason::ManualReset, now);
    }

    /// Append a row problem unless the cap is reached
    pub fn record_row_error(&mut self, error: RowError, cap: usize) {
        if self.row_errors.len() < cap {
            self.row_errors.push(error);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    fn record_transition(&mut self, to: ImportStage, reason: TransitionReason, now: DateTime<Utc>) {
        self.stage_history.push(StageTransition {
            from: self.stage,
            to,
            at: now,
            reason,
        });
        self.stage = to;
        self.updated_at = now;
    }
}

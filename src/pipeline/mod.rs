//! Stage-based import pipeline
//!
//! An [`ImportJob`](crate::models::ImportJob) moves through a fixed sequence
//! of stages, one handler invocation at a time:
//!
//! 1. **detect-schema**: parse the sheet, apply transforms, infer a schema, detect field roles
//! 2. **validate-schema**: diff against the dataset's latest schema version
//! 3. **await-approval**: suspended until the schema is approved
//! 4. **analyze-duplicates**: resolve rows sharing a dedup key
//! 5. **geocode-batch**: resolve addresses in committed batches
//! 6. **create-events**: write events in committed batches
//!
//! Any handler error diverts the job to **failed**, from which the
//! [`ErrorRecoveryService`] may schedule a retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use event_ingest::pipeline::{PipelineConfig, StagePipelineController, SystemClock};
//! use event_ingest::store::MemoryStore;
//!
//! let controller = StagePipelineController::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SystemClock),
//!     PipelineConfig::default(),
//! )?;
//!
//! let jobs = controller.create_jobs(file.id, &[SheetAssignment::new(0, dataset.id)]).await?;
//! for job in &jobs {
//!     controller.drive(job.id, 16).await?;
//! }
//! let report = controller.progress(file.id).await?;
//! ```

mod clock;
mod config;
mod controller;
mod error;
mod recovery;
mod stage;
mod stages;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BackoffPolicy, MAX_BACKOFF_SECONDS, PipelineConfig, RecoveryConfig};
pub use controller::{StagePipelineController, StepOutcome};
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use recovery::{
    ErrorRecoveryService, PendingRetrySummary, RecommendedAction, RecoveryAction,
    RecoveryRecommendation, RecoveryResult,
};
pub use stage::ImportStage;

use uuid::Uuid;

use crate::models::SheetAssignment;

/// Steps after which a single job has certainly stopped advancing
pub const MAX_STAGE_STEPS: usize = 16;

/// Create jobs for a file and drive each of them as far as it goes
///
/// Convenience for callers without an external task queue. Returns one
/// outcome per created job; a duplicate resubmission yields none.
pub async fn run_import(
    controller: &StagePipelineController,
    file_id: Uuid,
    sheets: &[SheetAssignment],
) -> PipelineResult<Vec<(Uuid, StepOutcome)>> {
    let jobs = controller.create_jobs(file_id, sheets).await?;
    let mut outcomes = Vec::with_capacity(jobs.len());
    for job in jobs {
        let outcome = controller.drive(job.id, MAX_STAGE_STEPS).await?;
        outcomes.push((job.id, outcome));
    }
    Ok(outcomes)
}

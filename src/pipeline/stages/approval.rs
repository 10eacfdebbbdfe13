//! await-approval: hold the job until its schema is approved, then version it

use tracing::{debug, info};

use super::{StageContext, StageStatus};
use crate::models::{ImportJob, NewDatasetSchema, SchemaApproval, SchemaSource};
use crate::pipeline::{ImportStage, PipelineError, PipelineResult};

pub(super) async fn run(ctx: &StageContext<'_>, job: &mut ImportJob) -> PipelineResult<StageStatus> {
    let validation = &job.schema_validation;
    if !validation.approved {
        debug!(job_id = %job.id, "Schema not yet approved");
        return Ok(StageStatus::Suspended);
    }

    let latest = ctx.store.latest_schema(job.dataset_id).await?;

    // A retry after the append must not add a second version
    if let Some(existing) = latest
        .as_ref()
        .filter(|s| s.source == SchemaSource::Import { job_id: job.id })
    {
        job.dataset_schema_version = Some(existing.version_number);
        return Ok(StageStatus::Done);
    }

    if latest.is_some() && !validation.summary.has_changes() {
        job.dataset_schema_version = latest.map(|s| s.version_number);
        return Ok(StageStatus::Done);
    }

    let schema = job.detected_schema.clone().ok_or_else(|| {
        PipelineError::stage(ImportStage::AwaitApproval, "No detected schema on job")
    })?;
    let event_count = ctx.store.count_events(job.dataset_id).await?;
    let stored = ctx
        .store
        .append_schema(
            NewDatasetSchema {
                dataset_id: job.dataset_id,
                schema,
                field_metadata: job.detected_field_metadata.clone(),
                schema_summary: validation.summary.clone(),
                event_count_at_creation: event_count,
                approval: SchemaApproval {
                    approved: true,
                    approved_by: validation.approved_by.clone(),
                    approved_at: validation.approved_at,
                    auto_approved: validation.auto_approved,
                },
                source: SchemaSource::Import { job_id: job.id },
            },
            ctx.clock.now(),
        )
        .await?;

    info!(
        job_id = %job.id,
        dataset_id = %job.dataset_id,
        version = stored.version_number,
        "Appended dataset schema version"
    );
    job.dataset_schema_version = Some(stored.version_number);
    Ok(StageStatus::Done)
}

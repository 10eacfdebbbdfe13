//! geocode-batch: resolve location addresses in fixed-size batches
//!
//! Results and progress are persisted after every batch, so a retry resumes
//! at the last committed batch and never re-geocodes a resolved address.
//! Addresses that failed are attempted again whenever the stage is re-entered.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::{StageContext, StageStatus, row_coordinates, text_at, transformed_rows};
use crate::geocoding::{BatchGeocodeSummary, GeocodeOutcome};
use crate::models::ImportJob;
use crate::pipeline::{ImportStage, PipelineResult};

pub(super) async fn run(ctx: &StageContext<'_>, job: &mut ImportJob) -> PipelineResult<StageStatus> {
    let Some(geocoder) = ctx.geocoder else {
        debug!(job_id = %job.id, "No geocoder configured, skipping geocoding");
        return Ok(StageStatus::Done);
    };
    if !ctx.dataset.geocoding_enabled {
        debug!(job_id = %job.id, "Geocoding disabled for dataset");
        return Ok(StageStatus::Done);
    }
    let Some(location_path) = job.detected_field_mappings.location_path.clone() else {
        debug!(job_id = %job.id, "No location field detected, skipping geocoding");
        return Ok(StageStatus::Done);
    };

    let rows = transformed_rows(ctx, job)?;

    // Address of every row that needs one, in row order
    let mut row_addresses = Vec::new();
    for (index, transformed) in rows.iter().enumerate() {
        if transformed.rejected || job.duplicates.is_skipped(index) {
            continue;
        }
        if row_coordinates(&transformed.row, &job.detected_field_mappings).is_some() {
            continue;
        }
        if let Some(address) = text_at(&transformed.row, &location_path) {
            row_addresses.push(address);
        }
    }

    let mut seen = HashSet::new();
    let unique: Vec<String> = row_addresses
        .iter()
        .filter(|a| seen.insert(a.as_str()))
        .cloned()
        .collect();

    let retrying = job.geocoding.forget_failures();
    if retrying > 0 {
        debug!(job_id = %job.id, retrying, "Retrying previously failed addresses");
    }

    if !job.progress.is_for(ImportStage::GeocodeBatch) {
        job.progress.begin(ImportStage::GeocodeBatch, unique.len() as u64);
    }
    let total = unique.len();
    let pending: Vec<String> = unique
        .into_iter()
        .filter(|a| !job.geocoding.is_resolved(a))
        .collect();
    job.progress.current = (total - pending.len()) as u64;

    info!(
        job_id = %job.id,
        pending = pending.len(),
        resolved = job.geocoding.results.len(),
        "Geocoding addresses"
    );

    let min_confidence = ctx.config.min_geocoding_confidence;
    for chunk in pending.chunks(ctx.config.geocode_batch_size) {
        let batch = geocoder
            .batch_geocode(chunk, ctx.config.geocode_concurrency)
            .await;

        let mut summary = BatchGeocodeSummary::default();
        let mut providers = Vec::new();
        for (address, result) in batch.results {
            let result = result.and_then(|r| r.validate(min_confidence).map(|()| r));
            summary.total += 1;
            match &result {
                Ok(r) => {
                    summary.successful += 1;
                    if r.from_cache {
                        summary.cached += 1;
                    }
                    providers.push(r.provider.clone());
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(job_id = %job.id, %address, error = %e, "Address could not be geocoded");
                }
            }
            job.geocoding.results.insert(address, GeocodeOutcome::from(result));
        }

        job.geocoding
            .stats
            .record_batch(&summary, providers.iter().map(String::as_str));
        job.counters.geocoded_rows = row_addresses
            .iter()
            .filter(|a| job.geocoding.is_resolved(a))
            .count() as u64;
        job.progress.commit_batch(chunk.len() as u64);
        job.updated_at = ctx.clock.now();
        ctx.store.save_job(job).await?;

        debug!(
            job_id = %job.id,
            batch = job.progress.batch_number,
            successful = summary.successful,
            failed = summary.failed,
            "Committed geocoding batch"
        );
    }

    Ok(StageStatus::Done)
}

//! create-events: write one event per surviving row, in batches
//!
//! Event ids derive from the job and row index and inserts skip existing
//! ids, so re-running a batch after a crash never duplicates events. An id
//! that already exists was written by this job, so it still counts as created.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{StageContext, StageStatus, row_coordinates, text_at, timestamp_at, transformed_rows};
use crate::dedup::{dedup_key, row_fingerprint};
use crate::inference::SchemaValidator;
use crate::models::{Event, GeoPoint, IdStrategyKind, ImportJob, LocationSource, Row, RowError};
use crate::pipeline::{ErrorKind, ImportStage, PipelineResult};

pub(super) async fn run(ctx: &StageContext<'_>, job: &mut ImportJob) -> PipelineResult<StageStatus> {
    let rows = transformed_rows(ctx, job)?;

    let latest = ctx.store.latest_schema(job.dataset_id).await?;
    let validator = match &latest {
        Some(schema) => Some(SchemaValidator::new(&schema.schema)?),
        None => None,
    };
    if job.dataset_schema_version.is_none() {
        job.dataset_schema_version = latest.as_ref().map(|s| s.version_number);
    }

    let candidates: Vec<usize> = (0..rows.len())
        .filter(|i| !job.duplicates.is_skipped(*i))
        .collect();
    if !job.progress.is_for(ImportStage::CreateEvents) {
        job.progress.begin(ImportStage::CreateEvents, candidates.len() as u64);
        reset_create_counters(job);
    }
    let start = (job.progress.current as usize).min(candidates.len());
    let cap = ctx.config.max_recorded_row_errors;

    for batch in candidates[start..].chunks(ctx.config.create_batch_size) {
        let now = ctx.clock.now();
        let mut created = 0u64;

        for &index in batch {
            let transformed = &rows[index];
            job.counters.processed_rows += 1;

            for warning in &transformed.warnings {
                job.counters.transform_warnings += 1;
                job.record_row_error(
                    RowError {
                        row_index: index,
                        field: Some(warning.field.clone()),
                        message: warning.message.clone(),
                        kind: ErrorKind::Transform,
                    },
                    cap,
                );
            }
            if transformed.rejected {
                job.counters.rejected_rows += 1;
                continue;
            }

            let mut event = build_event(
                job,
                index,
                &transformed.row,
                &ctx.dataset.id_strategy.kind,
                now,
            );
            if let Some(validator) = &validator {
                event.validation_warnings = validator.validate(&transformed.row);
            }

            if !ctx.store.insert_event(&event).await? {
                debug!(job_id = %job.id, row = index, "Event already written");
            }
            created += 1;
        }

        job.counters.created_events += created;
        job.progress.commit_batch(batch.len() as u64);
        job.updated_at = now;
        ctx.store.save_job(job).await?;

        debug!(
            job_id = %job.id,
            batch = job.progress.batch_number,
            created,
            "Committed event batch"
        );
    }

    info!(
        job_id = %job.id,
        created = job.counters.created_events,
        rejected = job.counters.rejected_rows,
        skipped = job.counters.skipped_duplicates,
        "Created events"
    );
    Ok(StageStatus::Done)
}

/// Counters owned by this stage start over with its progress
fn reset_create_counters(job: &mut ImportJob) {
    job.counters.processed_rows = 0;
    job.counters.created_events = 0;
    job.counters.rejected_rows = 0;
    job.counters.transform_warnings = 0;
    job.row_errors.retain(|e| e.kind != ErrorKind::Transform);
}

fn build_event(
    job: &ImportJob,
    row_index: usize,
    row: &Row,
    id_strategy: &IdStrategyKind,
    now: DateTime<Utc>,
) -> Event {
    let mappings = &job.detected_field_mappings;

    let (location, location_source) = match row_coordinates(row, mappings) {
        Some(point) => (Some(point), Some(LocationSource::Provided)),
        None => mappings
            .location_path
            .as_deref()
            .and_then(|path| text_at(row, path))
            .and_then(|address| job.geocoding.results.get(&address))
            .and_then(|outcome| outcome.result())
            .map(|r| {
                (
                    Some(GeoPoint::new(r.latitude, r.longitude)),
                    Some(LocationSource::Geocoded {
                        provider: r.provider.clone(),
                        confidence: r.confidence,
                        normalized_address: r.normalized_address.clone(),
                    }),
                )
            })
            .unwrap_or((None, None)),
    };

    Event {
        id: Event::id_for(job.id, row_index),
        dataset_id: job.dataset_id,
        import_job_id: job.id,
        import_file_id: job.import_file_id,
        row_index,
        unique_id: dedup_key(row, id_strategy),
        content_hash: row_fingerprint(row),
        data: row.clone(),
        location,
        location_source,
        event_timestamp: mappings
            .timestamp_path
            .as_deref()
            .and_then(|path| timestamp_at(row, path)),
        title: mappings.title_path.as_deref().and_then(|path| text_at(row, path)),
        validation_warnings: Vec::new(),
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::{GeocodeOutcome, GeocodingResult};
    use crate::mapping::FieldMappings;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn job_with_mappings(mappings: FieldMappings) -> ImportJob {
        let mut job = ImportJob::new(Uuid::new_v4(), Uuid::new_v4(), 0, Utc::now());
        job.detected_field_mappings = mappings;
        job
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_build_event_with_provided_coordinates() {
        let job = job_with_mappings(FieldMappings {
            title_path: Some("name".to_string()),
            timestamp_path: Some("date".to_string()),
            latitude_path: Some("lat".to_string()),
            longitude_path: Some("lon".to_string()),
            ..Default::default()
        });
        let data = row(json!({
            "name": "Concert",
            "date": "2024-05-01",
            "lat": "52.5",
            "lon": "13.4"
        }));

        let event = build_event(&job, 2, &data, &IdStrategyKind::Auto, Utc::now());
        assert_eq!(event.id, Event::id_for(job.id, 2));
        assert_eq!(event.dataset_id, job.dataset_id);
        assert_eq!(event.title.as_deref(), Some("Concert"));
        assert_eq!(event.location, Some(GeoPoint::new(52.5, 13.4)));
        assert_eq!(event.location_source, Some(LocationSource::Provided));
        assert!(event.event_timestamp.is_some());
        assert_eq!(event.unique_id, row_fingerprint(&data));
    }

    #[test]
    fn test_build_event_uses_geocoding_result() {
        let mut job = job_with_mappings(FieldMappings {
            location_path: Some("address".to_string()),
            ..Default::default()
        });
        job.geocoding.results.insert(
            "Hauptstr. 1".to_string(),
            GeocodeOutcome::Success(GeocodingResult {
                latitude: 48.1,
                longitude: 11.5,
                confidence: 0.8,
                provider: "nominatim".to_string(),
                normalized_address: "Hauptstraße 1".to_string(),
                components: BTreeMap::new(),
                from_cache: false,
            }),
        );

        let data = row(json!({"address": "Hauptstr. 1"}));
        let event = build_event(&job, 0, &data, &IdStrategyKind::Auto, Utc::now());
        assert_eq!(event.location, Some(GeoPoint::new(48.1, 11.5)));
        assert!(matches!(
            event.location_source,
            Some(LocationSource::Geocoded { ref provider, .. }) if provider == "nominatim"
        ));

        let data = row(json!({"address": "Elsewhere"}));
        let event = build_event(&job, 1, &data, &IdStrategyKind::Auto, Utc::now());
        assert!(event.location.is_none());
    }
}

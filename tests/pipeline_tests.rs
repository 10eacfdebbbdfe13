//! End-to-end tests for the stage pipeline

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{EVENTS_CSV, Harness, StaticGeocoder, csv_file};
use event_ingest::models::{
    Dataset, DuplicateStrategy, FileFormat, IdStrategy, IdStrategyKind, ImportFile,
    ImportFileStatus, LocationSource, SchemaConfig,
};
use event_ingest::pipeline::{
    ErrorKind, ImportStage, MAX_STAGE_STEPS, PipelineConfig, PipelineError, StagePipelineController,
    StepOutcome,
};
use event_ingest::store::ImportStore;
use event_ingest::transform::{CastFailurePolicy, CastStrategy, FieldType, ImportTransform};

#[tokio::test]
async fn test_four_row_csv_creates_four_events() {
    let h = Harness::new();
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;

    let results = h.import(&file, &dataset).await;
    assert_eq!(results.len(), 1);
    let (job, outcome) = &results[0];
    assert_eq!(*outcome, StepOutcome::Idle);
    assert_eq!(job.stage, ImportStage::Completed);
    assert!(job.completed_at.is_some());
    assert_eq!(job.counters.total_rows, 4);
    assert_eq!(job.counters.created_events, 4);

    let events = h.store.list_events(dataset.id).await.unwrap();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.dataset_id == dataset.id));
    assert!(events.iter().all(|e| e.import_job_id == job.id));
    assert_eq!(events[0].title.as_deref(), Some("Spring Concert"));
    assert!(events.iter().all(|e| e.event_timestamp.is_some()));

    let mappings = &job.detected_field_mappings;
    assert_eq!(mappings.title_path.as_deref(), Some("title"));
    assert_eq!(mappings.description_path.as_deref(), Some("description"));
    assert_eq!(mappings.timestamp_path.as_deref(), Some("date"));
    assert_eq!(mappings.location_path.as_deref(), Some("location"));

    assert_eq!(h.file(file.id).await.status, ImportFileStatus::Completed);

    // The first import approves and stores the dataset's first schema
    let schema = h.store.latest_schema(dataset.id).await.unwrap().unwrap();
    assert_eq!(schema.version_number, 1);
    assert!(schema.approval.auto_approved);
    assert_eq!(job.dataset_schema_version, Some(1));

    let report = h.controller.progress(file.id).await.unwrap();
    assert_eq!(report.progress.percentage, 100.0);
    assert_eq!(report.stage, Some(ImportStage::Completed));
    assert_eq!(report.estimated_time_remaining, Some(0));
}

#[tokio::test]
async fn test_stage_history_follows_fixed_order() {
    let h = Harness::new();
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;

    let results = h.import(&file, &dataset).await;
    let visited: Vec<ImportStage> = results[0].0.stage_history.iter().map(|t| t.to).collect();
    assert_eq!(
        visited,
        vec![
            ImportStage::ValidateSchema,
            ImportStage::AwaitApproval,
            ImportStage::AnalyzeDuplicates,
            ImportStage::GeocodeBatch,
            ImportStage::CreateEvents,
            ImportStage::Completed,
        ]
    );
}

#[tokio::test]
async fn test_identical_resubmission_is_skipped() {
    let h = Harness::new();
    let dataset = h.add_dataset(Dataset::new("Events")).await;

    let first = h.upload(csv_file(EVENTS_CSV).with_source_key("city-feed")).await;
    h.import(&first, &dataset).await;

    let mut again = ImportFile::new(
        "events-2024-06-02.csv",
        FileFormat::Csv,
        EVENTS_CSV.as_bytes().to_vec(),
    )
    .with_source_key("city-feed");
    again = h.upload(again).await;

    let results = h.import(&again, &dataset).await;
    assert!(results.is_empty());

    let again = h.file(again.id).await;
    assert!(again.is_duplicate);
    assert_eq!(again.status, ImportFileStatus::Skipped);
    assert!(again.skip_reason.as_deref().unwrap().contains("Duplicate"));
    assert_eq!(again.content_hash, h.file(first.id).await.content_hash);

    assert_eq!(h.store.count_events(dataset.id).await.unwrap(), 4);

    let report = h.controller.progress(again.id).await.unwrap();
    assert_eq!(report.progress.percentage, 100.0);
    assert!(report.current_job.is_none());
}

#[tokio::test]
async fn test_same_content_from_other_source_is_deduplicated_by_row() {
    let h = Harness::new();
    let dataset = h.add_dataset(Dataset::new("Events")).await;

    let first = h.upload(csv_file(EVENTS_CSV).with_source_key("city-feed")).await;
    h.import(&first, &dataset).await;

    let other = h.upload(csv_file(EVENTS_CSV).with_source_key("tourism-feed")).await;
    let results = h.import(&other, &dataset).await;
    assert_eq!(results.len(), 1);

    let job = &results[0].0;
    assert_eq!(job.stage, ImportStage::Completed);
    assert_eq!(job.duplicates.external_duplicates, 4);
    assert_eq!(job.counters.skipped_duplicates, 4);
    assert_eq!(job.counters.created_events, 0);
    assert!(!h.file(other.id).await.is_duplicate);
    assert_eq!(h.store.count_events(dataset.id).await.unwrap(), 4);
}

#[tokio::test]
async fn test_rename_then_cast_and_mapping_sees_renamed_field() {
    let h = Harness::new();
    let dataset = h
        .add_dataset(
            Dataset::new("Veranstaltungen")
                .with_language("deu")
                .with_import_transforms(vec![
                    ImportTransform::rename("event_name", "titel"),
                    ImportTransform::rename("plaetze", "capacity"),
                    ImportTransform::type_cast(
                        "capacity",
                        FieldType::String,
                        FieldType::Integer,
                        CastStrategy::Parse,
                    ),
                ]),
        )
        .await;
    let file = h
        .upload_csv("event_name,plaetze,datum\nKonzert,120,01.05.2024\nLesung,40,03.05.2024\n")
        .await;

    let results = h.import(&file, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.stage, ImportStage::Completed);
    assert_eq!(
        job.detected_field_mappings.title_path.as_deref(),
        Some("titel")
    );
    assert_eq!(
        job.detected_field_mappings.timestamp_path.as_deref(),
        Some("datum")
    );

    let events = h.store.list_events(dataset.id).await.unwrap();
    assert_eq!(events.len(), 2);
    let first = &events[0];
    assert_eq!(first.data.get("titel"), Some(&json!("Konzert")));
    assert_eq!(first.data.get("capacity"), Some(&json!(120)));
    assert!(!first.data.contains_key("event_name"));
    assert!(!first.data.contains_key("plaetze"));
    assert_eq!(first.title.as_deref(), Some("Konzert"));
}

#[tokio::test]
async fn test_cast_failures_follow_policy() {
    let h = Harness::new();
    let dataset = h
        .add_dataset(Dataset::new("Events").with_import_transforms(vec![
            ImportTransform::TypeCast {
                from: "capacity".to_string(),
                from_type: FieldType::String,
                to_type: FieldType::Integer,
                strategy: CastStrategy::Parse,
                on_failure: CastFailurePolicy::RejectRow,
                active: true,
            },
        ]))
        .await;
    let file = h
        .upload_csv("title,capacity\nConcert,120\nTalk,lots\nWorkshop,15\n")
        .await;

    let results = h.import(&file, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.stage, ImportStage::Completed);
    assert_eq!(job.counters.rejected_rows, 1);
    assert_eq!(job.counters.created_events, 2);
    assert_eq!(job.row_errors.len(), 1);
    assert_eq!(job.row_errors[0].row_index, 1);
    assert_eq!(job.row_errors[0].field.as_deref(), Some("capacity"));
    assert_eq!(job.row_errors[0].kind, ErrorKind::Transform);
}

#[tokio::test]
async fn test_rejected_row_does_not_shadow_later_row_with_same_id() {
    let h = Harness::new();
    let dataset = h
        .add_dataset(
            Dataset::new("Events")
                .with_id_strategy(IdStrategy {
                    kind: IdStrategyKind::External {
                        path: "id".to_string(),
                    },
                    duplicate_strategy: DuplicateStrategy::Skip,
                })
                .with_import_transforms(vec![ImportTransform::TypeCast {
                    from: "capacity".to_string(),
                    from_type: FieldType::String,
                    to_type: FieldType::Integer,
                    strategy: CastStrategy::Parse,
                    on_failure: CastFailurePolicy::RejectRow,
                    active: true,
                }]),
        )
        .await;
    let file = h
        .upload_csv("id,title,capacity\nA-1,Concert,lots\nA-1,Concert,120\nB-2,Talk,15\n")
        .await;

    let results = h.import(&file, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.stage, ImportStage::Completed);
    assert!(job.duplicates.skipped_rows.is_empty());
    assert_eq!(job.counters.skipped_duplicates, 0);
    assert_eq!(job.counters.rejected_rows, 1);
    assert_eq!(job.counters.created_events, 2);

    let events = h.store.list_events(dataset.id).await.unwrap();
    let mut ids: Vec<&str> = events.iter().map(|e| e.unique_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["ext:A-1", "ext:B-2"]);
}

#[tokio::test]
async fn test_skipped_rows_keep_file_row_indices() {
    let h = Harness::new();
    let dataset = h
        .add_dataset(Dataset::new("Events").with_import_transforms(vec![
            ImportTransform::TypeCast {
                from: "capacity".to_string(),
                from_type: FieldType::String,
                to_type: FieldType::Integer,
                strategy: CastStrategy::Parse,
                on_failure: CastFailurePolicy::RejectRow,
                active: true,
            },
        ]))
        .await;
    let file = h
        .upload_csv("title,capacity\nTalk,lots\nConcert,120\nConcert,120\n")
        .await;

    let results = h.import(&file, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.duplicates.skipped_rows, vec![2]);
    assert_eq!(job.counters.created_events, 1);
}

#[tokio::test]
async fn test_keep_original_cast_failure_still_creates_event() {
    let h = Harness::new();
    let dataset = h
        .add_dataset(Dataset::new("Events").with_import_transforms(vec![
            ImportTransform::type_cast(
                "capacity",
                FieldType::String,
                FieldType::Integer,
                CastStrategy::Parse,
            ),
        ]))
        .await;
    let file = h.upload_csv("title,capacity\nConcert,120\nTalk,lots\n").await;

    let results = h.import(&file, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.counters.created_events, 2);
    assert_eq!(job.counters.transform_warnings, 1);

    let events = h.store.list_events(dataset.id).await.unwrap();
    assert_eq!(events[1].data.get("capacity"), Some(&json!("lots")));
}

#[tokio::test]
async fn test_locked_schema_waits_for_approval() {
    let h = Harness::new();
    let dataset = h
        .add_dataset(Dataset::new("Events").with_schema_config(SchemaConfig {
            locked: true,
            auto_grow: false,
        }))
        .await;
    let file = h.upload_csv(EVENTS_CSV).await;

    let results = h.import(&file, &dataset).await;
    let (job, outcome) = &results[0];
    assert_eq!(*outcome, StepOutcome::Suspended);
    assert_eq!(job.stage, ImportStage::AwaitApproval);
    assert!(job.schema_validation.requires_approval);
    assert!(!job.schema_validation.approved);
    assert_eq!(h.store.count_events(dataset.id).await.unwrap(), 0);
    assert!(h.store.latest_schema(dataset.id).await.unwrap().is_none());

    // Suspended jobs stay put until the approval is written
    assert_eq!(
        h.controller.process_job(job.id).await.unwrap(),
        StepOutcome::Suspended
    );

    h.controller.approve_schema(job.id, "admin").await.unwrap();
    let outcome = h.controller.drive(job.id, 16).await.unwrap();
    assert_eq!(outcome, StepOutcome::Idle);

    let job = h.job(job.id).await;
    assert_eq!(job.stage, ImportStage::Completed);
    assert_eq!(h.store.count_events(dataset.id).await.unwrap(), 4);

    let schema = h.store.latest_schema(dataset.id).await.unwrap().unwrap();
    assert_eq!(schema.version_number, 1);
    assert_eq!(schema.approval.approved_by.as_deref(), Some("admin"));
    assert!(!schema.approval.auto_approved);
}

#[tokio::test]
async fn test_additive_change_appends_schema_version() {
    let h = Harness::new();
    let dataset = h.add_dataset(Dataset::new("Events")).await;

    let first = h.upload_csv(EVENTS_CSV).await;
    h.import(&first, &dataset).await;

    let second = h
        .upload_csv("title,description,date,location,price\nJazz,Quartet,2024-07-01,Parkweg 1,12\n")
        .await;
    let results = h.import(&second, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.stage, ImportStage::Completed);
    assert_eq!(job.schema_validation.summary.new_fields, vec!["price"]);
    assert!(job.schema_validation.auto_approved);

    let versions = h.store.list_schemas(dataset.id).await.unwrap();
    assert_eq!(
        versions.iter().map(|s| s.version_number).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(job.dataset_schema_version, Some(2));
}

#[tokio::test]
async fn test_approval_rejected_outside_approval_stages() {
    let h = Harness::new();
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;
    let results = h.import(&file, &dataset).await;

    let err = h
        .controller
        .approve_schema(results[0].0.id, "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_geocoding_resolves_unique_addresses_in_batches() {
    let geocoder = Arc::new(StaticGeocoder::new(&[
        ("Marktplatz 1 Berlin", 52.52, 13.40),
        ("Hauptstr. 5 Hamburg", 53.55, 9.99),
    ]));
    let config = PipelineConfig::default().with_geocode_batch_size(1);
    let h = Harness::with_geocoder(config, geocoder.clone());
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;

    let results = h.import(&file, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.stage, ImportStage::Completed);

    // Marktplatz appears twice but is geocoded once
    assert_eq!(geocoder.calls(), 3);
    assert_eq!(job.geocoding.stats.total_addresses, 3);
    assert_eq!(job.geocoding.stats.successful, 2);
    assert_eq!(job.geocoding.stats.failed, 1);
    assert_eq!(job.geocoding.stats.provider_calls.get("static"), Some(&2));
    assert_eq!(job.counters.geocoded_rows, 3);

    let events = h.store.list_events(dataset.id).await.unwrap();
    assert_eq!(events.len(), 4);
    let located: Vec<_> = events.iter().filter(|e| e.location.is_some()).collect();
    assert_eq!(located.len(), 3);
    assert!(located.iter().all(|e| matches!(
        e.location_source,
        Some(LocationSource::Geocoded { ref provider, .. }) if provider == "static"
    )));
    assert!(events[3].location.is_none());

    let report = h.controller.progress(file.id).await.unwrap();
    assert_eq!(report.geocoding_stats.successful, 2);
}

#[tokio::test]
async fn test_failed_addresses_are_geocoded_again_after_reset() {
    let partial = Arc::new(StaticGeocoder::new(&[("Marktplatz 1 Berlin", 52.52, 13.40)]));
    let h = Harness::with_geocoder(PipelineConfig::default(), partial.clone());
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;

    let results = h.import(&file, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.geocoding.stats.failed, 2);
    assert_eq!(job.counters.geocoded_rows, 2);

    let complete = Arc::new(StaticGeocoder::new(&[
        ("Marktplatz 1 Berlin", 52.52, 13.40),
        ("Hauptstr. 5 Hamburg", 53.55, 9.99),
        ("Kinoweg 2 Koeln", 50.94, 6.96),
    ]));
    let controller = StagePipelineController::new(
        h.store.clone(),
        h.clock.clone(),
        h.config.clone(),
    )
    .unwrap()
    .with_geocoder(complete.clone());

    h.recovery()
        .reset_job_to_stage(job.id, ImportStage::GeocodeBatch, true)
        .await
        .unwrap();
    controller.drive(job.id, MAX_STAGE_STEPS).await.unwrap();

    // Berlin stays resolved; only the two failures are attempted again
    assert_eq!(complete.calls(), 2);
    let job = h.job(job.id).await;
    assert_eq!(job.stage, ImportStage::Completed);
    assert_eq!(job.counters.geocoded_rows, 4);
    assert_eq!(job.geocoding.stats.failed, 0);
    assert_eq!(job.geocoding.stats.successful, 3);
    assert_eq!(job.geocoding.stats.total_addresses, 3);
    assert!(job.geocoding.results.values().all(|o| o.result().is_some()));
}

#[tokio::test]
async fn test_rows_with_coordinates_skip_geocoding() {
    let geocoder = Arc::new(StaticGeocoder::new(&[]));
    let h = Harness::with_geocoder(PipelineConfig::default(), geocoder.clone());
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h
        .upload_csv("title,address,lat,lon\nConcert,Somewhere 1,52.5,13.4\n")
        .await;

    let results = h.import(&file, &dataset).await;
    assert_eq!(results[0].0.stage, ImportStage::Completed);
    assert_eq!(geocoder.calls(), 0);

    let events = h.store.list_events(dataset.id).await.unwrap();
    assert_eq!(events[0].location_source, Some(LocationSource::Provided));
}

#[tokio::test]
async fn test_malformed_file_fails_job_with_sanitized_error() {
    let h = Harness::new();
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h
        .upload(ImportFile::new(
            "broken.json",
            FileFormat::Json,
            b"{\"not\": \"an array\"".to_vec(),
        ))
        .await;

    let results = h.import(&file, &dataset).await;
    let (job, outcome) = &results[0];
    assert!(matches!(
        outcome,
        StepOutcome::Failed {
            stage: ImportStage::DetectSchema,
            ..
        }
    ));
    assert_eq!(job.stage, ImportStage::Failed);

    let error_log = job.error_log.as_ref().unwrap();
    assert_eq!(error_log.kind, ErrorKind::Validation);
    assert_eq!(error_log.stage, Some(ImportStage::DetectSchema));
    assert!(error_log.last_error.starts_with("Validation failed"));
    assert_eq!(h.file(file.id).await.status, ImportFileStatus::Failed);
}

#[tokio::test]
async fn test_rerunning_create_events_never_duplicates() {
    let config = PipelineConfig::default().with_create_batch_size(3);
    let h = Harness::with_config(config);
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;

    let results = h.import(&file, &dataset).await;
    let job = &results[0].0;
    assert_eq!(job.progress.batch_number, 2);

    h.recovery()
        .reset_job_to_stage(job.id, ImportStage::CreateEvents, false)
        .await
        .unwrap();
    h.controller.drive(job.id, 4).await.unwrap();

    let job = h.job(job.id).await;
    assert_eq!(job.stage, ImportStage::Completed);
    assert_eq!(job.counters.created_events, 4);
    assert_eq!(job.counters.processed_rows, 4);
    assert_eq!(h.store.count_events(dataset.id).await.unwrap(), 4);
}

#[tokio::test]
async fn test_create_jobs_validation() {
    let h = Harness::new();
    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;

    let err = h.controller.create_jobs(file.id, &[]).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let err = h
        .controller
        .create_jobs(
            file.id,
            &[event_ingest::models::SheetAssignment::new(1, dataset.id)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let err = h
        .controller
        .create_jobs(uuid::Uuid::new_v4(), &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

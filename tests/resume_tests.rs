//! Resuming at committed batch boundaries and isolation between sibling jobs

mod common;

use std::sync::Arc;

use chrono::Duration;

use common::{EVENTS_CSV, FlakyStore, Harness};
use event_ingest::models::{Dataset, Event, ImportFileStatus, SheetAssignment};
use event_ingest::pipeline::{
    ImportStage, MAX_STAGE_STEPS, PipelineConfig, StagePipelineController, StepOutcome,
};
use event_ingest::store::ImportStore;
use event_ingest::transform::{CastStrategy, FieldType, ImportTransform};

#[tokio::test]
async fn test_failed_batch_resumes_at_last_commit() {
    let h = Harness::with_config(PipelineConfig::default().with_create_batch_size(2));
    let flaky = Arc::new(FlakyStore::new(h.store.clone()));
    let controller =
        StagePipelineController::new(flaky.clone(), h.clock.clone(), h.config.clone()).unwrap();

    let dataset = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;
    let jobs = controller
        .create_jobs(file.id, &[SheetAssignment::new(0, dataset.id)])
        .await
        .unwrap();
    let job_id = jobs[0].id;

    // First batch commits, the second dies after writing one of its two rows
    flaky.fail_inserts_after(3);
    let outcome = controller.drive(job_id, MAX_STAGE_STEPS).await.unwrap();
    assert!(matches!(
        outcome,
        StepOutcome::Failed {
            stage: ImportStage::CreateEvents,
            ..
        }
    ));

    let job = h.job(job_id).await;
    assert_eq!(job.stage, ImportStage::Failed);
    assert_eq!(
        job.error_log.as_ref().unwrap().stage,
        Some(ImportStage::CreateEvents)
    );
    assert!(job.progress.is_for(ImportStage::CreateEvents));
    assert_eq!(job.progress.current, 2);
    assert_eq!(job.progress.batch_number, 1);
    assert_eq!(job.counters.created_events, 2);
    assert_eq!(job.counters.processed_rows, 2);
    assert_eq!(h.store.count_events(dataset.id).await.unwrap(), 3);

    flaky.heal();
    let result = h.recovery().recover_failed_job(job_id).await.unwrap();
    assert!(result.success);
    let job = h.job(job_id).await;
    assert_eq!(job.stage, ImportStage::CreateEvents);
    assert_eq!(job.progress.current, 2);

    h.clock.advance(Duration::minutes(1));
    let outcome = controller.drive(job_id, MAX_STAGE_STEPS).await.unwrap();
    assert_eq!(outcome, StepOutcome::Idle);

    let job = h.job(job_id).await;
    assert_eq!(job.stage, ImportStage::Completed);
    assert_eq!(job.progress.current, 4);
    assert_eq!(job.progress.batch_number, 2);
    assert_eq!(job.counters.created_events, 4);
    assert_eq!(job.counters.processed_rows, 4);

    let events = h.store.list_events(dataset.id).await.unwrap();
    assert_eq!(events.len(), 4);
    let mut rows: Vec<usize> = events.iter().map(|e| e.row_index).collect();
    rows.sort_unstable();
    assert_eq!(rows, vec![0, 1, 2, 3]);
    assert!(
        events
            .iter()
            .all(|e| e.id == Event::id_for(job_id, e.row_index))
    );
    assert_eq!(h.file(file.id).await.status, ImportFileStatus::Completed);
}

#[tokio::test]
async fn test_failing_job_leaves_sibling_jobs_untouched() {
    let h = Harness::new();
    let broken = h
        .add_dataset(Dataset::new("Broken").with_import_transforms(vec![
            ImportTransform::rename("title", "name"),
            ImportTransform::type_cast(
                "title",
                FieldType::String,
                FieldType::Integer,
                CastStrategy::Parse,
            ),
        ]))
        .await;
    let healthy = h.add_dataset(Dataset::new("Events")).await;
    let file = h.upload_csv(EVENTS_CSV).await;

    let jobs = h
        .controller
        .create_jobs(
            file.id,
            &[
                SheetAssignment::new(0, broken.id),
                SheetAssignment::new(0, healthy.id),
            ],
        )
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);

    let outcomes = h
        .controller
        .drive_file(file.id, MAX_STAGE_STEPS)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);

    let failed = h.job(jobs[0].id).await;
    assert_eq!(failed.stage, ImportStage::Failed);
    assert_eq!(
        failed.error_log.as_ref().unwrap().stage,
        Some(ImportStage::DetectSchema)
    );
    assert_eq!(h.store.count_events(broken.id).await.unwrap(), 0);

    let completed = h.job(jobs[1].id).await;
    assert_eq!(completed.stage, ImportStage::Completed);
    assert!(completed.error_log.is_none());
    assert_eq!(completed.counters.created_events, 4);
    assert_eq!(h.store.count_events(healthy.id).await.unwrap(), 4);

    assert_eq!(h.file(file.id).await.status, ImportFileStatus::Failed);
}

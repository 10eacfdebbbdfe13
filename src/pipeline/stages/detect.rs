//! detect-schema: infer the sheet's schema and the semantic field roles

use std::collections::HashSet;

use tracing::{debug, info};

use super::{StageContext, StageStatus};
use crate::ingest::parse_sheet;
use crate::inference::{InferenceConfig, SchemaInferrer};
use crate::mapping::FieldMappingDetector;
use crate::models::ImportJob;
use crate::pipeline::{ImportStage, PipelineResult};
use crate::transform::{TransformPipeline, leaf_paths};

pub(super) async fn run(ctx: &StageContext<'_>, job: &mut ImportJob) -> PipelineResult<StageStatus> {
    let pipeline = TransformPipeline::from_dataset(ctx.dataset);
    pipeline.validate()?;

    let rows = parse_sheet(ctx.file, job.sheet_index)?;
    let sample_size = ctx.config.detection_sample_size;

    let config = InferenceConfig::builder()
        .sample_size(sample_size)
        .collect_examples(true)
        .build();
    let mut inferrer = SchemaInferrer::with_config(config);

    // Mapping must see post-transform names
    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for row in rows.iter().take(sample_size) {
        let transformed = pipeline.apply(row.clone());
        inferrer.add_row(&transformed.row)?;
        for path in leaf_paths(&transformed.row) {
            if seen.insert(path.clone()) {
                fields.push(path);
            }
        }
    }
    let sampled = inferrer.record_count();
    let inferred = inferrer.finalize()?;

    let mut mappings = FieldMappingDetector::new().detect(&fields, &ctx.dataset.language);
    mappings.apply_overrides(&ctx.dataset.field_mapping_overrides);
    debug!(
        job_id = %job.id,
        roles = ?mappings.assigned(),
        "Detected field mappings"
    );

    let total = rows.len() as u64;
    job.detected_schema = Some(inferred.to_json_schema());
    job.detected_field_metadata = inferred.field_metadata;
    job.detected_field_mappings = mappings;
    job.counters.total_rows = total;
    job.progress.begin(ImportStage::DetectSchema, total);
    job.progress.commit_batch(total);

    info!(
        job_id = %job.id,
        rows = total,
        sampled,
        fields = fields.len(),
        "Detected sheet schema"
    );
    Ok(StageStatus::Done)
}

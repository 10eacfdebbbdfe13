//! analyze-duplicates: resolve rows sharing a dedup key

use std::collections::HashSet;

use tracing::info;

use super::{StageContext, StageStatus, transformed_rows};
use crate::dedup::{DuplicateAnalyzer, dedup_key};
use crate::models::ImportJob;
use crate::pipeline::PipelineResult;

pub(super) async fn run(ctx: &StageContext<'_>, job: &mut ImportJob) -> PipelineResult<StageStatus> {
    let rows = transformed_rows(ctx, job)?;
    let id_strategy = &ctx.dataset.id_strategy;

    // Rejected rows never become events and take no part in the analysis
    let (indices, keys): (Vec<usize>, Vec<String>) = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.rejected)
        .map(|(index, r)| (index, dedup_key(&r.row, &id_strategy.kind)))
        .unzip();

    let existing = if id_strategy.duplicate_strategy.checks_existing_events() {
        ctx.store.existing_unique_ids(job.dataset_id, &keys).await?
    } else {
        HashSet::new()
    };

    let mut summary =
        DuplicateAnalyzer::new(id_strategy.duplicate_strategy).analyze(&keys, &existing);
    summary.skipped_rows = summary
        .skipped_rows
        .iter()
        .map(|&position| indices[position])
        .collect();

    info!(
        job_id = %job.id,
        strategy = ?summary.strategy,
        unique = summary.unique_rows,
        internal = summary.internal_duplicates,
        external = summary.external_duplicates,
        "Analyzed duplicate rows"
    );

    job.counters.skipped_duplicates = summary.skipped_rows.len() as u64;
    job.duplicates = summary;
    Ok(StageStatus::Done)
}

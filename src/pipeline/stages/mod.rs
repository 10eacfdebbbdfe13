//! Stage handlers
//!
//! Each handler runs one stage for one job. Handlers mutate the job in
//! place; batch stages also persist it after every committed batch. The
//! controller owns the transition that follows.

mod approval;
mod create;
mod detect;
mod duplicates;
mod geocode;
mod validate;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use super::clock::Clock;
use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineResult};
use super::stage::ImportStage;
use crate::geocoding::Geocoder;
use crate::ingest::parse_sheet;
use crate::mapping::FieldMappings;
use crate::models::{Dataset, GeoPoint, ImportFile, ImportJob, Row};
use crate::store::ImportStore;
use crate::transform::{TransformPipeline, TransformedRow, get_path, parse_date};

/// Collaborators and records a handler reads
pub(crate) struct StageContext<'a> {
    pub store: &'a dyn ImportStore,
    pub geocoder: Option<&'a dyn Geocoder>,
    pub clock: &'a dyn Clock,
    pub config: &'a PipelineConfig,
    pub dataset: &'a Dataset,
    pub file: &'a ImportFile,
}

/// What a handler reports back to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageStatus {
    /// Work finished; advance along the stage table
    Done,
    /// Waiting on an external write
    Suspended,
}

/// Dispatch to the handler owning the job's current stage
pub(crate) async fn run(ctx: &StageContext<'_>, job: &mut ImportJob) -> PipelineResult<StageStatus> {
    match job.stage {
        ImportStage::DetectSchema => detect::run(ctx, job).await,
        ImportStage::ValidateSchema => validate::run(ctx, job).await,
        ImportStage::AwaitApproval => approval::run(ctx, job).await,
        ImportStage::AnalyzeDuplicates => duplicates::run(ctx, job).await,
        ImportStage::GeocodeBatch => geocode::run(ctx, job).await,
        ImportStage::CreateEvents => create::run(ctx, job).await,
        stage @ (ImportStage::Completed | ImportStage::Failed) => Err(PipelineError::stage(
            stage,
            "Terminal stages have no handler",
        )),
    }
}

/// Parse the job's sheet and run the dataset's transforms over every row
fn transformed_rows(ctx: &StageContext<'_>, job: &ImportJob) -> PipelineResult<Vec<TransformedRow>> {
    let pipeline = TransformPipeline::from_dataset(ctx.dataset);
    pipeline.validate()?;
    let rows = parse_sheet(ctx.file, job.sheet_index)?;
    Ok(rows.into_iter().map(|row| pipeline.apply(row)).collect())
}

/// Non-empty text at `path`; numbers are rendered
fn text_at(row: &Row, path: &str) -> Option<String> {
    match get_path(row, path)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coordinate_at(row: &Row, path: &str) -> Option<f64> {
    match get_path(row, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Coordinates present in the row under the detected latitude/longitude roles
fn row_coordinates(row: &Row, mappings: &FieldMappings) -> Option<GeoPoint> {
    let latitude = coordinate_at(row, mappings.latitude_path.as_deref()?)?;
    let longitude = coordinate_at(row, mappings.longitude_path.as_deref()?)?;
    let point = GeoPoint::new(latitude, longitude);
    point.is_valid().then_some(point)
}

/// Timestamp from a date string or a unix epoch (seconds or milliseconds)
fn timestamp_at(row: &Row, path: &str) -> Option<DateTime<Utc>> {
    match get_path(row, path)? {
        Value::String(s) => {
            let normalized = parse_date(s)?;
            if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
                return Some(dt.with_timezone(&Utc));
            }
            let date = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()?;
            Some(date.and_hms_opt(0, 0, 0)?.and_utc())
        }
        Value::Number(n) => {
            let epoch = n.as_i64()?;
            if epoch.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(epoch).single()
            } else {
                Utc.timestamp_opt(epoch, 0).single()
            }
        }
        _ => None,
    }
}

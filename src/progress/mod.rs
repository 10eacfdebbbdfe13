//! Progress read model
//!
//! Per-job counters live on [`ImportJob`]; this module folds them into the
//! status document exposed for an import file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geocoding::BatchGeocodeSummary;
use crate::models::{ImportFile, ImportFileStatus, ImportJob};
use crate::pipeline::{ImportStage, PipelineConfig};

/// Geocoding call counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodingStats {
    pub total_addresses: u64,
    pub successful: u64,
    pub failed: u64,
    /// Results served from a provider cache
    pub cached: u64,
    /// Provider name -> successful calls attributed to it
    #[serde(default)]
    pub provider_calls: BTreeMap<String, u64>,
}

impl GeocodingStats {
    /// Fold one batch summary in
    pub fn record_batch<'a>(
        &mut self,
        summary: &BatchGeocodeSummary,
        providers: impl IntoIterator<Item = &'a str>,
    ) {
        self.total_addresses += summary.total as u64;
        self.successful += summary.successful as u64;
        self.failed += summary.failed as u64;
        self.cached += summary.cached as u64;
        for provider in providers {
            *self.provider_calls.entry(provider.to_string()).or_insert(0) += 1;
        }
    }

    pub fn merge(&mut self, other: &GeocodingStats) {
        self.total_addresses += other.total_addresses;
        self.successful += other.successful;
        self.failed += other.failed;
        self.cached += other.cached;
        for (provider, calls) in &other.provider_calls {
            *self.provider_calls.entry(provider.clone()).or_insert(0) += calls;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgress {
    pub current: u64,
    pub total: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageProgress {
    pub stage: Option<ImportStage>,
    /// Completion within the stage (0-100)
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    pub current_batch: u32,
    pub total_batches: u64,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentJob {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub sheet_index: usize,
    pub stage: ImportStage,
    pub retry_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Status document for one import file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgressReport {
    pub import_id: Uuid,
    pub status: ImportFileStatus,
    pub stage: Option<ImportStage>,
    pub progress: OverallProgress,
    pub stage_progress: StageProgress,
    pub batch_info: BatchInfo,
    pub geocoding_stats: GeocodingStats,
    /// Seconds, extrapolated from elapsed time
    pub estimated_time_remaining: Option<u64>,
    pub current_job: Option<CurrentJob>,
}

/// Maps job state to externally reported percentages
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    geocode_batch_size: usize,
    create_batch_size: usize,
}

impl ProgressTracker {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            geocode_batch_size: config.geocode_batch_size,
            create_batch_size: config.create_batch_size,
        }
    }

    /// Approximate overall percentage for a job at `stage`
    ///
    /// Batch stages interpolate across their band using `fraction` (0.0-1.0).
    pub fn stage_percentage(stage: ImportStage, fraction: f64) -> f64 {
        let fraction = fraction.clamp(0.0, 1.0);
        match stage {
            ImportStage::DetectSchema => 10.0,
            ImportStage::ValidateSchema => 20.0,
            ImportStage::AwaitApproval => 25.0,
            ImportStage::AnalyzeDuplicates => 35.0,
            ImportStage::GeocodeBatch => 40.0 + 30.0 * fraction,
            ImportStage::CreateEvents => 70.0 + 30.0 * fraction,
            ImportStage::Completed => 100.0,
            ImportStage::Failed => 0.0,
        }
    }

    fn job_percentage(job: &ImportJob) -> f64 {
        let fraction = if job.progress.is_for(job.stage) {
            job.progress.fraction()
        } else {
            0.0
        };
        Self::stage_percentage(job.stage, fraction)
    }

    fn batch_size_for(&self, stage: ImportStage) -> usize {
        match stage {
            ImportStage::GeocodeBatch => self.geocode_batch_size,
            ImportStage::CreateEvents => self.create_batch_size,
            _ => 0,
        }
    }

    /// Build the status document for `file` from its jobs
    pub fn report(
        &self,
        file: &ImportFile,
        jobs: &[ImportJob],
        now: DateTime<Utc>,
    ) -> ImportProgressReport {
        let current = jobs
            .iter()
            .find(|j| !j.is_terminal())
            .or_else(|| jobs.iter().find(|j| j.stage == ImportStage::Failed))
            .or_else(|| jobs.last());

        let percentage = if jobs.is_empty() {
            if file.status == ImportFileStatus::Skipped { 100.0 } else { 0.0 }
        } else {
            jobs.iter().map(Self::job_percentage).sum::<f64>() / jobs.len() as f64
        };

        let mut geocoding_stats = GeocodingStats::default();
        for job in jobs {
            geocoding_stats.merge(&job.geocoding.stats);
        }

        let (stage_progress, batch_info) = match current {
            Some(job) => {
                let in_stage = job.progress.is_for(job.stage);
                let batch_size = self.batch_size_for(job.stage);
                let total_batches = if in_stage && batch_size > 0 {
                    job.progress.total.div_ceil(batch_size as u64)
                } else {
                    0
                };
                (
                    StageProgress {
                        stage: Some(job.stage),
                        percentage: if job.stage == ImportStage::Completed {
                            100.0
                        } else if in_stage {
                            job.progress.fraction() * 100.0
                        } else {
                            0.0
                        },
                    },
                    BatchInfo {
                        current_batch: if in_stage { job.progress.batch_number } else { 0 },
                        total_batches,
                        batch_size,
                    },
                )
            }
            None => (
                StageProgress {
                    stage: None,
                    percentage: 0.0,
                },
                BatchInfo {
                    current_batch: 0,
                    total_batches: 0,
                    batch_size: 0,
                },
            ),
        };

        let estimated_time_remaining = current.and_then(|job| {
            if percentage >= 100.0 {
                return Some(0);
            }
            let elapsed = (now - job.created_at).num_seconds();
            if percentage <= 0.0 || elapsed <= 0 || job.stage == ImportStage::Failed {
                return None;
            }
            let fraction = percentage / 100.0;
            Some((elapsed as f64 * (1.0 - fraction) / fraction).round() as u64)
        });

        ImportProgressReport {
            import_id: file.id,
            status: file.status,
            stage: current.map(|j| j.stage),
            progress: OverallProgress {
                current: jobs.iter().map(|j| j.counters.processed_rows).sum(),
                total: jobs.iter().map(|j| j.counters.total_rows).sum(),
                percentage,
            },
            stage_progress,
            batch_info,
            geocoding_stats,
            estimated_time_remaining,
            current_job: current.map(|job| CurrentJob {
                id: job.id,
                dataset_id: job.dataset_id,
                sheet_index: job.sheet_index,
                stage: job.stage,
                retry_attempts: job.retry_attempts,
                last_error: job.error_log.as_ref().map(|e| e.last_error.clone()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileFormat;
    use chrono::Duration;

    #[test]
    fn test_stage_percentages_increase_along_pipeline() {
        let mut last = 0.0;
        for stage in ImportStage::all() {
            if stage == ImportStage::Failed {
                continue;
            }
            let pct = ProgressTracker::stage_percentage(stage, 0.0);
            assert!(pct >= last, "{} went backwards", stage);
            last = pct;
        }
        assert_eq!(ProgressTracker::stage_percentage(ImportStage::Completed, 0.0), 100.0);
        assert_eq!(ProgressTracker::stage_percentage(ImportStage::GeocodeBatch, 0.5), 55.0);
    }

    #[test]
    fn test_report_for_batch_stage() {
        let started = Utc::now();
        let file = ImportFile::new("events.csv", FileFormat::Csv, b"a\n1\n".to_vec());
        let mut job = ImportJob::new(file.id, Uuid::new_v4(), 0, started);
        job.stage = ImportStage::CreateEvents;
        job.progress.begin(ImportStage::CreateEvents, 1000);
        job.progress.commit_batch(500);
        job.counters.total_rows = 1000;
        job.counters.processed_rows = 500;
        job.geocoding.stats.successful = 3;

        let tracker = ProgressTracker::new(&PipelineConfig::default());
        let report = tracker.report(&file, &[job], started + Duration::seconds(85));

        assert_eq!(report.stage, Some(ImportStage::CreateEvents));
        assert_eq!(report.progress.percentage, 85.0);
        assert_eq!(report.stage_progress.percentage, 50.0);
        assert_eq!(report.batch_info.current_batch, 1);
        assert_eq!(report.batch_info.total_batches, 2);
        assert_eq!(report.batch_info.batch_size, 500);
        assert_eq!(report.geocoding_stats.successful, 3);
        assert_eq!(report.estimated_time_remaining, Some(15));
        assert_eq!(report.progress.current, 500);
    }

    #[test]
    fn test_report_for_skipped_file() {
        let mut file = ImportFile::new("events.csv", FileFormat::Csv, Vec::new());
        file.status = ImportFileStatus::Skipped;
        let report = ProgressTracker::new(&PipelineConfig::default()).report(&file, &[], Utc::now());
        assert_eq!(report.progress.percentage, 100.0);
        assert!(report.current_job.is_none());
    }

    #[test]
    fn test_geocoding_stats_merge() {
        let mut stats = GeocodingStats::default();
        stats.record_batch(
            &BatchGeocodeSummary {
                total: 3,
                successful: 2,
                failed: 1,
                cached: 1,
            },
            ["nominatim", "nominatim"],
        );
        let mut total = GeocodingStats::default();
        total.merge(&stats);
        total.merge(&stats);
        assert_eq!(total.total_addresses, 6);
        assert_eq!(total.provider_calls["nominatim"], 4);
    }
}

//! Pipeline configuration types

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};

/// Main pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Rows fed to schema detection per job
    pub detection_sample_size: usize,
    /// Default number of events sampled for schema regeneration
    pub schema_sample_size: usize,
    /// Upper bound on any requested schema sample
    pub max_schema_sample_size: usize,
    /// Addresses per geocoding batch
    pub geocode_batch_size: usize,
    /// Concurrent geocoder calls within a batch
    pub geocode_concurrency: usize,
    /// Events written per batch
    pub create_batch_size: usize,
    /// Geocoding results below this confidence are rejected
    pub min_geocoding_confidence: f64,
    /// Per-row errors kept on a job
    pub max_recorded_row_errors: usize,
    /// Retry policy
    pub recovery: RecoveryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_sample_size: 1000,
            schema_sample_size: 500,
            max_schema_sample_size: 10_000,
            geocode_batch_size: 100,
            geocode_concurrency: 5,
            create_batch_size: 500,
            min_geocoding_confidence: 0.5,
            max_recorded_row_errors: 100,
            recovery: RecoveryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline config
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(toml_str: &str) -> PipelineResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        config.validate().map_err(PipelineError::ConfigError)?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn with_detection_sample_size(mut self, size: usize) -> Self {
        self.detection_sample_size = size;
        self
    }

    pub fn with_schema_sample_size(mut self, size: usize) -> Self {
        self.schema_sample_size = size;
        self
    }

    pub fn with_geocode_batch_size(mut self, size: usize) -> Self {
        self.geocode_batch_size = size;
        self
    }

    pub fn with_geocode_concurrency(mut self, concurrency: usize) -> Self {
        self.geocode_concurrency = concurrency;
        self
    }

    pub fn with_create_batch_size(mut self, size: usize) -> Self {
        self.create_batch_size = size;
        self
    }

    pub fn with_min_geocoding_confidence(mut self, confidence: f64) -> Self {
        self.min_geocoding_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    /// Effective sample size for schema regeneration
    pub fn bounded_schema_sample(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.schema_sample_size)
            .clamp(1, self.max_schema_sample_size.max(1))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.detection_sample_size == 0 {
            return Err("detectionSampleSize must be greater than zero".to_string());
        }
        if self.geocode_batch_size == 0 || self.create_batch_size == 0 {
            return Err("Batch sizes must be greater than zero".to_string());
        }
        if self.geocode_concurrency == 0 {
            return Err("geocodeConcurrency must be greater than zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_geocoding_confidence) {
            return Err("minGeocodingConfidence must be between 0 and 1".to_string());
        }
        self.recovery.validate()
    }
}

/// Retry cap and backoff curve for failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryConfig {
    /// Automatic retries before a manual reset is required
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.backoff.validate()
    }
}

/// Longest delay any backoff policy produces
pub const MAX_BACKOFF_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Delay before retry attempt `n` (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackoffPolicy {
    /// `base * 2^(n-1)`, capped at `max`
    #[serde(rename_all = "camelCase")]
    Exponential { base_seconds: u64, max_seconds: u64 },
    /// `step * n`
    #[serde(rename_all = "camelCase")]
    Linear { step_seconds: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            base_seconds: 30,
            max_seconds: 3600,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given attempt, never above [`MAX_BACKOFF_SECONDS`]
    pub fn delay_for_attempt(&self, attempt: u32) -> chrono::Duration {
        let attempt = attempt.max(1);
        let seconds = match *self {
            Self::Exponential {
                base_seconds,
                max_seconds,
            } => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base_seconds.saturating_mul(factor).min(max_seconds)
            }
            Self::Linear { step_seconds } => step_seconds.saturating_mul(attempt as u64),
        };
        chrono::Duration::seconds(seconds.min(MAX_BACKOFF_SECONDS) as i64)
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Exponential {
                base_seconds,
                max_seconds,
            } => {
                if base_seconds == 0 {
                    return Err("backoff.baseSeconds must be greater than zero".to_string());
                }
                if max_seconds < base_seconds {
                    return Err("backoff.maxSeconds must be at least baseSeconds".to_string());
                }
                if max_seconds > MAX_BACKOFF_SECONDS {
                    return Err(format!(
                        "backoff.maxSeconds must not exceed {}",
                        MAX_BACKOFF_SECONDS
                    ));
                }
            }
            Self::Linear { step_seconds } => {
                if step_seconds == 0 {
                    return Err("backoff.stepSeconds must be greater than zero".to_string());
                }
                if step_seconds > MAX_BACKOFF_SECONDS {
                    return Err(format!(
                        "backoff.stepSeconds must not exceed {}",
                        MAX_BACKOFF_SECONDS
                    ));
                }
            }
        }
        Ok(())
    }
}

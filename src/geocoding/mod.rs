//! Geocoding collaborator seam
//!
//! Provider integrations live outside this crate. The pipeline only needs
//! [`Geocoder::geocode`]; batch geocoding has a default implementation with
//! bounded concurrency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

/// Errors reported by a geocoder
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GeocodingError {
    #[error("All geocoding providers failed for address")]
    AllProvidersFailed { address: String, attempts: Vec<String> },
    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
    #[error("Confidence {confidence} below minimum {minimum}")]
    LowConfidence { confidence: f64, minimum: f64 },
    #[error("Empty address")]
    EmptyAddress,
}

/// A resolved address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodingResult {
    pub latitude: f64,
    pub longitude: f64,
    /// Provider confidence (0.0 - 1.0)
    pub confidence: f64,
    pub provider: String,
    pub normalized_address: String,
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    #[serde(default)]
    pub from_cache: bool,
}

impl GeocodingResult {
    /// Check coordinate ranges and the confidence floor
    pub fn validate(&self, min_confidence: f64) -> Result<(), GeocodingError> {
        let coords_ok = self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0;
        if !coords_ok {
            return Err(GeocodingError::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        if self.confidence.is_nan() || self.confidence < min_confidence {
            return Err(GeocodingError::LowConfidence {
                confidence: self.confidence,
                minimum: min_confidence,
            });
        }
        Ok(())
    }
}

/// Per-address outcome persisted on the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum GeocodeOutcome {
    Success(GeocodingResult),
    Failure { message: String },
}

impl GeocodeOutcome {
    pub fn result(&self) -> Option<&GeocodingResult> {
        match self {
            GeocodeOutcome::Success(result) => Some(result),
            GeocodeOutcome::Failure { .. } => None,
        }
    }
}

impl From<Result<GeocodingResult, GeocodingError>> for GeocodeOutcome {
    fn from(result: Result<GeocodingResult, GeocodingError>) -> Self {
        match result {
            Ok(result) => GeocodeOutcome::Success(result),
            Err(e) => GeocodeOutcome::Failure {
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGeocodeSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub cached: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchGeocodeResult {
    pub results: BTreeMap<String, Result<GeocodingResult, GeocodingError>>,
    pub summary: BatchGeocodeSummary,
}

/// Address resolution service
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve one address
    async fn geocode(&self, address: &str) -> Result<GeocodingResult, GeocodingError>;

    /// Resolve many addresses with at most `concurrency` requests in flight
    async fn batch_geocode(&self, addresses: &[String], concurrency: usize) -> BatchGeocodeResult {
        let resolved: Vec<(String, Result<GeocodingResult, GeocodingError>)> =
            stream::iter(addresses.iter().cloned())
                .map(|address| async move {
                    let result = self.geocode(&address).await;
                    (address, result)
                })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

        let mut batch = BatchGeocodeResult::default();
        for (address, result) in resolved {
            if batch.results.contains_key(&address) {
                continue;
            }
            batch.summary.total += 1;
            match &result {
                Ok(r) => {
                    batch.summary.successful += 1;
                    if r.from_cache {
                        batch.summary.cached += 1;
                    }
                }
                Err(_) => batch.summary.failed += 1,
            }
            batch.results.insert(address, result);
        }
        batch
    }
}

//! Events produced by the create-events stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Row;

/// WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both coordinates are finite and inside WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Where an event's location came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LocationSource {
    /// Coordinates were present in the row
    Provided,
    /// Coordinates came from geocoding an address field
    Geocoded {
        provider: String,
        confidence: f64,
        normalized_address: String,
    },
}

/// A dataset-scoped record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique within the dataset; derived from the job and row so retries are idempotent
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub import_job_id: Uuid,
    pub import_file_id: Uuid,
    pub row_index: usize,
    /// Dedup key under the dataset's id strategy
    pub unique_id: String,
    /// Fingerprint of `data`
    pub content_hash: String,
    pub data: Row,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_source: Option<LocationSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Deterministic event id for a row of a job
    pub fn id_for(job_id: Uuid, row_index: usize) -> Uuid {
        Uuid::new_v5(&job_id, format!("row:{}", row_index).as_bytes())
    }
}

//! Field mapping detection
//!
//! Assigns semantic roles (title, description, timestamp, location,
//! latitude, longitude) to row fields by matching post-transform field names
//! against language-specific vocabularies.
//!
//! # Example
//!
//! ```rust
//! use event_ingest::mapping::FieldMappingDetector;
//!
//! let fields = vec!["titel".to_string(), "datum".to_string()];
//! let mappings = FieldMappingDetector::new().detect(&fields, "deu");
//! assert_eq!(mappings.title_path.as_deref(), Some("titel"));
//! assert_eq!(mappings.timestamp_path.as_deref(), Some("datum"));
//! ```

mod detector;
mod types;
mod vocabulary;

pub use detector::FieldMappingDetector;
pub use types::{FieldMappings, FieldRole};
pub use vocabulary::{normalize_field_name, normalize_language};

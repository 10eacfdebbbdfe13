//! Schema inference, versioning and freshness
//!
//! Infers JSON Schema documents from rows (during import) or from stored
//! events (regeneration), diffs them against the previous version, and
//! decides whether a stored snapshot still reflects its dataset.
//!
//! ## Example
//!
//! ```rust
//! use event_ingest::inference::SchemaInferrer;
//! use serde_json::json;
//!
//! let mut inferrer = SchemaInferrer::new();
//! inferrer.add_value(&json!({"title": "Concert", "date": "2024-06-01"})).unwrap();
//! inferrer.add_value(&json!({"title": "Fair"})).unwrap();
//!
//! let schema = inferrer.finalize().unwrap().to_json_schema();
//! assert_eq!(schema["properties"]["date"]["format"], "date");
//! assert_eq!(schema["required"], json!(["title"]));
//! ```

mod config;
mod diff;
mod error;
mod formats;
mod freshness;
mod inferrer;
mod service;
mod types;

pub use config::{InferenceConfig, InferenceConfigBuilder};
pub use diff::{ANY_TYPE, FieldTypes, SchemaValidator, diff_schemas, is_widening, schema_field_types};
pub use error::InferenceError;
pub use formats::{Format, detect_format};
pub use freshness::{SchemaFreshness, StaleReason, get_schema_freshness, is_schema_stale};
pub use inferrer::{MAX_NESTING_DEPTH, SchemaInferrer};
pub use service::{InferOptions, SchemaInferenceOutcome, SchemaService};
pub use types::{InferredField, InferredSchema, InferredType};

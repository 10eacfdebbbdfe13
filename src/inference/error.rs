//! Error types for schema inference

use thiserror::Error;

/// Errors that can occur during schema inference
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// Record root was not an object
    #[error("Invalid record structure: expected object at root, found {0}")]
    InvalidStructure(String),

    #[error("Maximum nesting depth exceeded: {depth} > {max}")]
    MaxDepthExceeded { depth: usize, max: usize },

    /// No records to infer from
    #[error("No records provided for inference")]
    NoRecords,

    /// Stored schema document is not a JSON Schema object
    #[error("Malformed schema document: {0}")]
    MalformedSchema(String),
}

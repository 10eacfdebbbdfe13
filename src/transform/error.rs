//! Transform error types

use super::types::FieldType;

/// Errors raised while validating or applying transforms
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("Cannot convert '{field}' from {from} to {to}: {reason}")]
    CastFailed {
        field: String,
        from: FieldType,
        to: FieldType,
        reason: String,
    },

    #[error("Field '{field}' holds {found}, expected {expected}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: FieldType,
    },

    #[error("Transform {index} references '{field}', which an earlier rename moved to '{renamed_to}'")]
    RenamedAway {
        index: usize,
        field: String,
        renamed_to: String,
    },

    #[error("Invalid transform at position {index}: {reason}")]
    Invalid { index: usize, reason: String },
}

/// Result type for transform operations
pub type TransformResult<T> = Result<T, TransformError>;

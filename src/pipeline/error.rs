//! Error types for pipeline operations
//!
//! Errors chain their internal cause for logging, while
//! [`PipelineError::sanitized_message`] gives the generic text that is
//! persisted on a job and shown to users.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stage::ImportStage;
use crate::geocoding::GeocodingError;
use crate::inference::InferenceError;
use crate::store::StoreError;
use crate::transform::TransformError;

/// Coarse classification persisted with job and row errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input rejected before processing
    Validation,
    /// A referenced dataset, file, or job is missing
    NotFound,
    /// Every provider failed or the result was invalid
    Geocoding,
    /// Per-row transform problem
    Transform,
    /// Handler-level failure
    Stage,
    /// Storage or other internal failure
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Geocoding => "geocoding",
            Self::Transform => "transform",
            Self::Stage => "stage",
            Self::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// Errors that can occur during pipeline execution
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input rejected before processing
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced record missing
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Geocoding failed
    #[error("Geocoding error: {0}")]
    Geocoding(#[from] GeocodingError),

    /// Transform failure escalated to the job
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Stage handler failed
    #[error("Stage '{stage}' failed: {message}")]
    StageError { stage: ImportStage, message: String },

    /// A stage change the transition table forbids
    #[error("Illegal stage transition: {from} -> {to}")]
    IllegalTransition { from: ImportStage, to: ImportStage },

    /// Pipeline configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Datastore error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Schema inference error
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Create a stage error with message
    pub fn stage(stage: ImportStage, message: impl Into<String>) -> Self {
        Self::StageError {
            stage,
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classification persisted alongside the message
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) | PipelineError::ConfigError(_) => ErrorKind::Validation,
            PipelineError::NotFound { .. } => ErrorKind::NotFound,
            PipelineError::Geocoding(_) => ErrorKind::Geocoding,
            PipelineError::Transform(_) => ErrorKind::Transform,
            PipelineError::StageError { .. } | PipelineError::IllegalTransition { .. } => {
                ErrorKind::Stage
            }
            PipelineError::Store(_)
            | PipelineError::Inference(_)
            | PipelineError::IoError(_)
            | PipelineError::JsonError(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is likely transient (a retry may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::Store(_)
                | PipelineError::IoError(_)
                | PipelineError::Geocoding(_)
                | PipelineError::StageError { .. }
        )
    }

    /// Generic user-visible message without internal details
    pub fn sanitized_message(&self) -> String {
        match self {
            PipelineError::Validation(msg) => format!("Validation failed: {msg}"),
            PipelineError::NotFound { entity, .. } => format!("{entity} not found"),
            PipelineError::Geocoding(_) => "Geocoding failed for this import".to_string(),
            PipelineError::Transform(_) => "Row transformation failed".to_string(),
            PipelineError::StageError { stage, .. } => {
                format!("Import failed during stage '{stage}'")
            }
            PipelineError::IllegalTransition { .. } => {
                "Import job is in an unexpected state".to_string()
            }
            PipelineError::ConfigError(_) => "Import configuration is invalid".to_string(),
            PipelineError::Store(_)
            | PipelineError::Inference(_)
            | PipelineError::IoError(_)
            | PipelineError::JsonError(_) => {
                "An internal error occurred while processing the import".to_string()
            }
        }
    }
}

//! Structured error types for the experimentation engine
//!
//! Every error carries a machine-readable code so that a service layer can map
//! failures to its own transport without matching on message text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::experiment::types::ExperimentStatus;

/// Structured error payload for callers that serialize failures
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Errors raised by the backing store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Contention or a temporarily unavailable backend; safe to retry
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// A conditional update lost against a concurrent writer
    #[error("conditional update conflict: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Engine error taxonomy
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Malformed experiment or variant configuration
    #[error("Invalid input for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Operation forbidden in the experiment's current lifecycle state
    #[error("Cannot {operation} experiment {id} in {status:?} state")]
    InvalidState {
        id: Uuid,
        status: ExperimentStatus,
        operation: &'static str,
    },

    #[error("Experiment is not running: {0}")]
    NotRunning(Uuid),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Not enough data for the requested decision
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Another completion attempt recorded a different outcome first
    #[error("Experiment {id} was already completed with winner {recorded_winner:?}")]
    ConcurrentCompletion {
        id: Uuid,
        recorded_winner: Option<Uuid>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Content adapter error: {0}")]
    Adapter(String),
}

impl EngineError {
    pub fn experiment_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "Experiment",
            id: id.to_string(),
        }
    }

    pub fn variant_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "Variant",
            id: id.to_string(),
        }
    }

    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::NotRunning(_) => "NOT_RUNNING",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::ConcurrentCompletion { .. } => "CONCURRENT_COMPLETION",
            Self::Storage(StoreError::Transient(_)) => "STORAGE_TRANSIENT",
            Self::Storage(StoreError::Conflict(_)) => "STORAGE_CONFLICT",
            Self::Storage(StoreError::NotFound(_)) => "STORAGE_NOT_FOUND",
            Self::Adapter(_) => "ADAPTER_ERROR",
        }
    }

    /// Only transient storage failures are worth retrying; everything else is a
    /// configuration or programming mistake.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(StoreError::Transient(_)))
    }

    /// Convert to structured error response
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            Self::ConcurrentCompletion { id, .. } => {
                Some(format!("re-fetch experiment {id} to read the recorded winner"))
            }
            _ => None,
        };
        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}

/// Helper trait to convert validation errors
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| EngineError::Validation {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type alias for Results using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

//! # Error Types
//!
//! Structured error types for clima_core. Each variant maps onto one of the
//! handling policies the recompute pipeline applies: blocking (constants not
//! loaded) or soft (coerced input, missing display target, failed save).
//!
//! ## Example
//!
//! ```rust
//! use clima_core::errors::{CalcError, CalcResult, Severity};
//!
//! fn validate_area(area_m2: f64) -> CalcResult<()> {
//!     if !area_m2.is_finite() || area_m2 < 0.0 {
//!         return Err(CalcError::invalid_input(
//!             "area_m2",
//!             area_m2.to_string(),
//!             "Area must be a non-negative number",
//!         ));
//!     }
//!     Ok(())
//! }
//!
//! let err = validate_area(-1.0).unwrap_err();
//! assert_eq!(err.severity(), Severity::Warning);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for clima_core operations
pub type CalcResult<T> = Result<T, CalcError>;

/// How an error should be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Alert-level message; the current run is aborted
    Blocking,
    /// Console log or soft toast; editing continues
    Warning,
}

/// Structured error type for sizing operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum CalcError {
    /// A user input is malformed or out of range
    #[error("Invalid input for '{field}': {value} - {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },

    /// A required field is missing
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// The constants registry lacks keys needed by a calculation
    #[error("System constants not loaded (missing: {})", missing.join(", "))]
    NotReady { missing: Vec<String> },

    /// The display layer has no target for a result
    #[error("Display element missing for room '{room_id}': {element}")]
    ElementMissing { room_id: String, element: String },

    /// Saving computed results failed
    #[error("Failed to persist room '{room_id}': {reason}")]
    PersistenceFailure { room_id: String, reason: String },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// HTTP request to the backend failed
    #[error("Network error: {url} - {reason}")]
    Network { url: String, reason: String },

    /// Schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },

    /// Generic internal error (should be rare)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CalcError {
    /// Create an InvalidInput error
    pub fn invalid_input(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::InvalidInput {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a MissingField error
    pub fn missing_field(field: impl Into<String>) -> Self {
        CalcError::MissingField {
            field: field.into(),
        }
    }

    /// Create a NotReady error listing the absent constant keys
    pub fn not_ready<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CalcError::NotReady {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an ElementMissing error
    pub fn element_missing(room_id: impl Into<String>, element: impl Into<String>) -> Self {
        CalcError::ElementMissing {
            room_id: room_id.into(),
            element: element.into(),
        }
    }

    /// Create a PersistenceFailure error
    pub fn persistence_failure(room_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::PersistenceFailure {
            room_id: room_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a Network error
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization(reason: impl Into<String>) -> Self {
        CalcError::SerializationError {
            reason: reason.into(),
        }
    }

    /// Blocking errors abort the run and need an alert; everything else is soft.
    pub fn severity(&self) -> Severity {
        match self {
            CalcError::NotReady { .. } => Severity::Blocking,
            _ => Severity::Warning,
        }
    }

    /// Check if this is a recoverable error (e.g., can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CalcError::NotReady { .. } | CalcError::Network { .. } | CalcError::PersistenceFailure { .. }
        )
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            CalcError::InvalidInput { .. } => "INVALID_INPUT",
            CalcError::MissingField { .. } => "MISSING_FIELD",
            CalcError::NotReady { .. } => "NOT_READY",
            CalcError::ElementMissing { .. } => "ELEMENT_MISSING",
            CalcError::PersistenceFailure { .. } => "PERSISTENCE_FAILURE",
            CalcError::FileError { .. } => "FILE_ERROR",
            CalcError::SerializationError { .. } => "SERIALIZATION_ERROR",
            CalcError::Network { .. } => "NETWORK_ERROR",
            CalcError::VersionMismatch { .. } => "VERSION_MISMATCH",
            CalcError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for CalcError {
    fn from(e: serde_json::Error) -> Self {
        CalcError::serialization(e.to_string())
    }
}

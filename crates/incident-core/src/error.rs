//! Incident Error Types

use data_validator::ValidationError;
use storage::StorageError;
use thiserror::Error;

/// Errors returned by incident operations
#[derive(Debug, Error)]
pub enum IncidentError {
    /// Malformed or out-of-domain input
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Role lacks the capability for a requested field
    #[error("Permission denied: {role} may not write {field}")]
    PermissionDenied { role: String, field: String },

    /// Incident does not exist or is not the active one
    #[error("Incident not found or not active")]
    NotFound,

    /// Comment text is blank
    #[error("Comment content is empty")]
    EmptyContent,

    /// Threshold minimum not strictly below maximum
    #[error("Invalid threshold range: min {min} must be below max {max}")]
    InvalidRange { min: f64, max: f64 },

    /// Persistence failure; nothing was applied
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

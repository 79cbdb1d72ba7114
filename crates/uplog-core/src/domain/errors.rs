//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly around report locations that cannot be interpreted.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The report location has no usable file name
    #[error("Invalid report location: {0}")]
    InvalidLocation(String),

    /// The file metadata could not be read
    #[error("Unreadable report {location}: {reason}")]
    Unreadable {
        /// Offending location
        location: String,
        /// Underlying I/O error message
        reason: String,
    },

    /// Unknown report kind name
    #[error("Unknown report kind: {0}")]
    UnknownKind(String),
}

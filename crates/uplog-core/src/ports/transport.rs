//! Report transport port (driven/secondary port)
//!
//! Uploads one report file to the collection service.
//!
//! ## Design Notes
//!
//! - One call uploads one file; there is no batching and no retry inside the
//!   transport. Retry policy belongs to the upload session.
//! - Cancellation is expressed by dropping the returned future. The engine
//!   races every upload against a cancellation token and reports
//!   [`TransferError::Cancelled`] itself.
//! - Errors carry enough detail for logs; [`TransferError::class`] maps them
//!   onto the session's failure classes.

use async_trait::async_trait;

use crate::domain::{FailureClass, Report, ReportKind};

/// Why an upload did not succeed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The local file could not be read
    #[error("cannot read report: {0}")]
    Unreadable(String),

    /// The service refused the report itself (e.g. unsupported media type)
    #[error("report refused by collection service (HTTP {status})")]
    RejectedReport { status: u16 },

    /// The service refused the request as malformed or unauthorized
    #[error("request rejected by collection service (HTTP {status})")]
    BadRequest { status: u16 },

    /// The service is overloaded or failing
    #[error("collection service unavailable (HTTP {status})")]
    ServerUnavailable { status: u16 },

    /// Timeout, reset, DNS or connect failure
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other failure building or sending the request
    #[error("transfer failed: {0}")]
    Other(String),

    /// The transfer was cancelled before completion
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Maps the error onto the upload session's failure classes
    pub fn class(&self) -> FailureClass {
        match self {
            TransferError::Unreadable(_)
            | TransferError::RejectedReport { .. }
            | TransferError::Other(_) => FailureClass::Permanent,
            TransferError::BadRequest { .. } => FailureClass::Rejected,
            TransferError::ServerUnavailable { .. }
            | TransferError::Connection(_)
            | TransferError::Cancelled => FailureClass::Transient,
        }
    }
}

/// Port for uploading report files
#[async_trait]
pub trait IReportTransport: Send + Sync {
    /// Uploads `report` as a report of `kind`
    ///
    /// # Arguments
    /// * `kind` - Selects the endpoint and content type
    /// * `report` - The file to upload
    /// * `account` - Account to attribute the upload to, if signed in
    async fn upload(
        &self,
        kind: ReportKind,
        report: &Report,
        account: Option<&str>,
    ) -> Result<(), TransferError>;
}

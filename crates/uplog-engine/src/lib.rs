//! uplog Engine - Runtime of the report upload engines
//!
//! Provides:
//! - Startup quota enforcement over a kind's storage root
//! - The report collector sweeping pre-existing reports
//! - Storage layout and best-effort file deletion
//! - [`ReportEngine`], the per-kind actor driving the
//!   [`UploadSession`](uplog_core::domain::UploadSession) state machine
//!
//! ## Modules
//!
//! - [`quota`] - Oldest-first eviction down to a byte ceiling
//! - [`collector`] - Startup sweep of the work directory and storage root
//! - [`storage`] - Directory layout and file removal
//! - [`engine`] - Actor task, mailbox and the handle given to producers

pub mod collector;
pub mod engine;
pub mod quota;
pub mod storage;

use std::path::PathBuf;

use thiserror::Error;
use uplog_core::domain::ReportKind;

pub use collector::ReportCollector;
pub use engine::{EngineHandle, ReportEngine, UploadStatus};
pub use quota::QuotaOutcome;
pub use storage::ReportStorage;

/// Errors raised by engine filesystem operations
///
/// None of these ever reach a producer: the engine logs them and carries on.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred on a storage path
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A notified file is not a finalized report of this engine's kind
    #[error("{} is not a {kind} report of this engine", path.display())]
    Foreign { kind: ReportKind, path: PathBuf },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

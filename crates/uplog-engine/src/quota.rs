//! Storage quota enforcement
//!
//! Runs once when an engine is built, before the collector sweep, so it never
//! races with producer notifications. Only regular files directly inside the
//! root are considered; the work directory is never evicted from.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uplog_core::domain::report::creation_time;

use crate::storage::read_files;
use crate::EngineError;

/// Summary of one quota pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaOutcome {
    /// Files deleted
    pub evicted: usize,
    /// Bytes freed by the deletions
    pub freed_bytes: u64,
    /// Total size left in the root
    pub remaining_bytes: u64,
}

/// Deletes the oldest files of `root` until its total size is at most `max_bytes`
///
/// Files are ordered by creation time, ties broken by name. A file that cannot
/// be deleted is skipped and still counts towards the remaining size.
///
/// # Errors
/// Returns [`EngineError::Io`] if `root` cannot be listed.
pub fn enforce(root: &Path, max_bytes: u64) -> Result<QuotaOutcome, EngineError> {
    let mut files: Vec<(PathBuf, u64, DateTime<Utc>)> = read_files(root)?
        .into_iter()
        .map(|(path, metadata)| {
            let created = creation_time(&metadata);
            (path, metadata.len(), created)
        })
        .collect();
    files.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.0.cmp(&b.0)));

    let mut outcome = QuotaOutcome {
        remaining_bytes: files.iter().map(|(_, size, _)| size).sum(),
        ..QuotaOutcome::default()
    };

    for (path, size, _) in &files {
        if outcome.remaining_bytes <= max_bytes {
            break;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(location = %path.display(), size, "Evicted report over quota");
                outcome.evicted += 1;
                outcome.freed_bytes += size;
                outcome.remaining_bytes -= size;
            }
            Err(e) => {
                warn!(location = %path.display(), error = %e, "Failed to evict report");
            }
        }
    }

    if outcome.evicted > 0 {
        info!(
            root = %root.display(),
            evicted = outcome.evicted,
            freed_bytes = outcome.freed_bytes,
            remaining_bytes = outcome.remaining_bytes,
            "Storage quota enforced"
        );
    }

    Ok(outcome)
}

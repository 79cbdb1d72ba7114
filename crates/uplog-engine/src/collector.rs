//! Report collector
//!
//! Sweeps the storage of one kind once per engine lifetime and yields every
//! pre-existing report as a single ordered batch: work directory entries
//! first, then root entries, each directory oldest first with ties broken by
//! file name.
//!
//! The sweep never fails. An unreadable directory contributes no reports.

use tracing::{debug, info, warn};
use uplog_core::domain::Report;

use crate::storage::ReportStorage;

/// Startup sweep over one kind's storage
#[derive(Debug, Clone)]
pub struct ReportCollector {
    storage: ReportStorage,
}

impl ReportCollector {
    pub fn new(storage: ReportStorage) -> Self {
        Self { storage }
    }

    /// Runs the sweep on the blocking thread pool
    pub async fn collect(self) -> Vec<Report> {
        let kind = self.storage.kind();
        match tokio::task::spawn_blocking(move || self.collect_blocking()).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Report collector task failed");
                Vec::new()
            }
        }
    }

    /// Runs the sweep on the calling thread
    pub fn collect_blocking(&self) -> Vec<Report> {
        let kind = self.storage.kind();

        if let Err(e) = self.storage.prepare() {
            warn!(kind = %kind, error = %e, "Cannot create report directories");
        }

        match self.storage.purge_stale_in_progress() {
            Ok(0) => {}
            Ok(purged) => debug!(kind = %kind, purged, "Removed stale in-progress files"),
            Err(e) => debug!(kind = %kind, error = %e, "Skipped in-progress cleanup"),
        }

        let mut batch = Vec::new();
        for dir in [self.storage.work_dir(), self.storage.root()] {
            match self.storage.list_reports(dir) {
                Ok(reports) => batch.extend(reports),
                Err(e) => warn!(kind = %kind, error = %e, "Cannot list reports"),
            }
        }

        info!(kind = %kind, count = batch.len(), "Collected existing reports");
        batch
    }
}

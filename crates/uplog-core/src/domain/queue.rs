//! Pending report queue
//!
//! An ordered, duplicate-free backlog of reports awaiting upload. Order is
//! discovery order: whoever appends first is uploaded first, and a batch is
//! inserted as one contiguous unit.
//!
//! The queue never triggers uploads itself; callers ask the
//! [`UploadSession`](super::session::UploadSession) to reconsider after
//! every mutation.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::report::{Report, ReportVariant};

/// Ordered backlog of reports not yet uploaded or discarded
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    reports: VecDeque<Report>,
}

impl PendingQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every report of `batch` not already present, preserving order
    ///
    /// A report is a duplicate when its location is already queued, or when
    /// another report with the same pair key and variant is queued.
    ///
    /// # Returns
    /// The number of reports actually added.
    pub fn append(&mut self, batch: impl IntoIterator<Item = Report>) -> usize {
        let mut added = 0;
        for report in batch {
            if self.admits(&report) {
                self.reports.push_back(report);
                added += 1;
            }
        }
        added
    }

    /// Removes the report stored at `location`
    pub fn remove(&mut self, location: &Path) -> Option<Report> {
        let index = self
            .reports
            .iter()
            .position(|r| r.location() == location)?;
        self.reports.remove(index)
    }

    /// The next report to upload
    pub fn peek_head(&self) -> Option<&Report> {
        self.reports.front()
    }

    /// Empties the queue, returning every location it held, in order
    pub fn drop_all(&mut self) -> Vec<PathBuf> {
        self.reports
            .drain(..)
            .map(|r| r.location().to_path_buf())
            .collect()
    }

    /// The queued report sharing `report`'s pair key with the other variant
    pub fn sibling_of(&self, report: &Report) -> Option<&Report> {
        let pair_key = report.pair_key();
        let wanted = match report.variant() {
            ReportVariant::Standard => ReportVariant::Redacted,
            ReportVariant::Redacted => ReportVariant::Standard,
        };
        self.reports
            .iter()
            .find(|r| r.variant() == wanted && r.pair_key() == pair_key)
    }

    /// Whether a report stored at `location` is queued
    pub fn contains(&self, location: &Path) -> bool {
        self.reports.iter().any(|r| r.location() == location)
    }

    /// Number of queued reports
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Snapshot of queued locations, head first
    pub fn locations(&self) -> Vec<PathBuf> {
        self.reports
            .iter()
            .map(|r| r.location().to_path_buf())
            .collect()
    }

    /// Iterates over queued reports, head first
    pub fn iter(&self) -> impl Iterator<Item = &Report> {
        self.reports.iter()
    }

    fn admits(&self, candidate: &Report) -> bool {
        let pair_key = candidate.pair_key();
        !self.reports.iter().any(|r| {
            r.location() == candidate.location()
                || (r.variant() == candidate.variant() && r.pair_key() == pair_key)
        })
    }
}

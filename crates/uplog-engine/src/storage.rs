//! Local report storage
//!
//! Each kind owns `<storage_root>/<KindDir>/` for finalized reports and a
//! work directory inside it where producers write reports in progress.

use std::fs::DirEntry;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uplog_core::config::EngineSettings;
use uplog_core::domain::{Report, ReportKind};

use crate::EngineError;

/// Storage layout of one report kind.
#[derive(Debug, Clone)]
pub struct ReportStorage {
    kind: ReportKind,
    root: PathBuf,
    work_dir: PathBuf,
}

impl ReportStorage {
    /// Creates the layout described by `settings`, without touching disk.
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            kind: settings.kind,
            root: settings.root.clone(),
            work_dir: settings.work_dir.clone(),
        }
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Durable directory of finalized reports.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Producer work directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Creates the root and work directory if missing.
    pub fn prepare(&self) -> Result<(), EngineError> {
        for dir in [&self.root, &self.work_dir] {
            std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;
        }
        Ok(())
    }

    /// Whether `path` is a finalized report of this kind stored directly in
    /// the root or the work directory.
    pub fn owns(&self, path: &Path) -> bool {
        let in_layout = path
            .parent()
            .is_some_and(|parent| parent == self.root || parent == self.work_dir);
        in_layout && self.kind.matches(path)
    }

    /// Lists the finalized reports of `dir`, oldest first, ties by name.
    pub fn list_reports(&self, dir: &Path) -> Result<Vec<Report>, EngineError> {
        let mut reports: Vec<Report> = read_files(dir)?
            .into_iter()
            .filter(|(path, _)| self.kind.matches(path))
            .map(|(path, metadata)| Report::from_metadata(path, &metadata))
            .collect();

        reports.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.location().cmp(b.location()))
        });
        Ok(reports)
    }

    /// Deletes leftover in-progress files from the root.
    ///
    /// Files in the work directory are left alone: a producer may still be
    /// writing them.
    ///
    /// # Returns
    /// The number of files removed.
    pub fn purge_stale_in_progress(&self) -> Result<usize, EngineError> {
        let stale: Vec<PathBuf> = read_files(&self.root)?
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| ReportKind::is_in_progress(path))
            .collect();

        Ok(remove_files(&stale))
    }
}

/// Regular files directly inside `dir` with their metadata.
pub(crate) fn read_files(dir: &Path) -> Result<Vec<(PathBuf, std::fs::Metadata)>, EngineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::io(dir, e))?;

    Ok(entries
        .filter_map(Result::ok)
        .filter_map(|entry: DirEntry| {
            let metadata = entry.metadata().ok()?;
            metadata.is_file().then(|| (entry.path(), metadata))
        })
        .collect())
}

/// Deletes every file in `locations`, best-effort.
///
/// A file that is already gone counts as removed; other failures are logged
/// and skipped.
///
/// # Returns
/// The number of files no longer on disk.
pub fn remove_files(locations: &[PathBuf]) -> usize {
    let mut removed = 0;
    for location in locations {
        match std::fs::remove_file(location) {
            Ok(()) => {
                debug!(location = %location.display(), "Removed report file");
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => removed += 1,
            Err(e) => {
                warn!(location = %location.display(), error = %e, "Failed to remove report file");
            }
        }
    }
    removed
}

//! Report kinds
//!
//! The four engines (flight logs, crash reports, black boxes, GUTMA logs)
//! run the same upload engine. They only differ in where their files live,
//! which files count as finalized reports, and how a report is presented to
//! the collection service.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::report::REDACTED_SUFFIX;

/// File name suffix of a report that is still being written
pub const IN_PROGRESS_SUFFIX: &str = ".tmp";

/// The family a diagnostic file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Flight logs recorded by the device
    FlightLog,
    /// Crash reports, optionally with a redacted sibling
    CrashReport,
    /// Black box recordings
    BlackBox,
    /// GUTMA-formatted flight logs
    GutmaLog,
}

impl ReportKind {
    /// All kinds, in the order engines are started
    pub const ALL: [ReportKind; 4] = [
        ReportKind::FlightLog,
        ReportKind::CrashReport,
        ReportKind::BlackBox,
        ReportKind::GutmaLog,
    ];

    /// Machine name used in config keys, logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::FlightLog => "flight_log",
            ReportKind::CrashReport => "crash_report",
            ReportKind::BlackBox => "black_box",
            ReportKind::GutmaLog => "gutma_log",
        }
    }

    /// Directory name under the storage root
    pub fn dir_name(&self) -> &'static str {
        match self {
            ReportKind::FlightLog => "FlightLogs",
            ReportKind::CrashReport => "CrashReports",
            ReportKind::BlackBox => "BlackBoxes",
            ReportKind::GutmaLog => "GutmaLogs",
        }
    }

    /// Extension of finalized report files, `None` when any name is accepted
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ReportKind::FlightLog => Some("bin"),
            ReportKind::CrashReport => Some("gz"),
            ReportKind::BlackBox => None,
            ReportKind::GutmaLog => Some("gutma"),
        }
    }

    /// Whether producers of this kind write redacted siblings
    pub fn has_redacted_variant(&self) -> bool {
        matches!(self, ReportKind::CrashReport)
    }

    /// Collection service endpoint, relative to the upload base URL
    pub fn api_path(&self) -> &'static str {
        match self {
            ReportKind::FlightLog => "/apiv1/flightlog",
            ReportKind::CrashReport => "/apiv1/crashreport",
            ReportKind::BlackBox => "/apiv1/bbox",
            ReportKind::GutmaLog => "/apiv1/gutma",
        }
    }

    /// `Content-Type` sent with an upload
    pub fn content_type(&self) -> &'static str {
        match self {
            ReportKind::FlightLog => "application/octet-stream",
            ReportKind::CrashReport | ReportKind::BlackBox => "application/gzip",
            ReportKind::GutmaLog => "application/json",
        }
    }

    /// Default local storage quota in MiB
    pub fn default_quota_mb(&self) -> u64 {
        match self {
            ReportKind::FlightLog | ReportKind::GutmaLog => 100,
            ReportKind::CrashReport | ReportKind::BlackBox => 50,
        }
    }

    /// Whether `path` names a finalized report file of this kind
    ///
    /// Hidden files and in-progress (`.tmp`) files never match.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if name.starts_with('.') || name.ends_with(IN_PROGRESS_SUFFIX) {
            return false;
        }

        let Some(ext) = self.extension() else {
            return true;
        };

        let base = match name.strip_suffix(REDACTED_SUFFIX) {
            Some(base) if self.has_redacted_variant() => base,
            Some(_) => return false,
            None => &*name,
        };
        base.len() > ext.len() + 1 && base.ends_with(&format!(".{ext}"))
    }

    /// Whether `path` names a file a producer is still writing
    pub fn is_in_progress(path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy().ends_with(IN_PROGRESS_SUFFIX))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::UnknownKind(s.to_string()))
    }
}

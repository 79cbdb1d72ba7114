//! Report entity
//!
//! A [`Report`] is one diagnostic file cached locally and waiting for upload.
//! Reports are immutable values: every lifecycle change (queued, uploaded,
//! discarded) is expressed as a change of queue membership, never as a
//! mutation of the report itself.
//!
//! ## Variants
//!
//! Some producers write a privacy-stripped copy next to the full file, named
//! `<name>.anon`. Both files share the same *pair key* (the file name without
//! the `.anon` suffix) and share their upload fate.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// File name suffix marking a redacted report
pub const REDACTED_SUFFIX: &str = ".anon";

// ============================================================================
// ReportVariant
// ============================================================================

/// Whether a report carries the full payload or a redacted copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportVariant {
    /// Full report, may contain user-related information
    Standard,
    /// Privacy-stripped sibling of a standard report
    Redacted,
}

impl ReportVariant {
    /// Derives the variant from a file name
    pub fn from_file_name(name: &str) -> Self {
        if name.ends_with(REDACTED_SUFFIX) && name.len() > REDACTED_SUFFIX.len() {
            ReportVariant::Redacted
        } else {
            ReportVariant::Standard
        }
    }
}

impl std::fmt::Display for ReportVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportVariant::Standard => write!(f, "standard"),
            ReportVariant::Redacted => write!(f, "redacted"),
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// One cached diagnostic file pending upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Storage location, unique key within a queue
    location: PathBuf,
    /// File size in bytes, used for quota accounting
    size_bytes: u64,
    /// Creation time, used for eviction ordering and consent screening
    created_at: DateTime<Utc>,
    /// Full or redacted payload
    variant: ReportVariant,
}

impl Report {
    /// Creates a report from already known attributes
    ///
    /// The variant is derived from the file name.
    pub fn new(location: impl Into<PathBuf>, size_bytes: u64, created_at: DateTime<Utc>) -> Self {
        let location = location.into();
        let variant = location
            .file_name()
            .map(|n| ReportVariant::from_file_name(&n.to_string_lossy()))
            .unwrap_or(ReportVariant::Standard);

        Self {
            location,
            size_bytes,
            created_at,
            variant,
        }
    }

    /// Builds a report from file metadata
    pub fn from_metadata(location: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        Self::new(location, metadata.len(), creation_time(metadata))
    }

    /// Stats `path` and builds a report from its metadata
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidLocation`] if the path has no file name and
    /// [`DomainError::Unreadable`] if the metadata cannot be read or the path
    /// is not a regular file.
    pub fn from_path(path: &Path) -> Result<Self, DomainError> {
        if path.file_name().is_none() {
            return Err(DomainError::InvalidLocation(path.display().to_string()));
        }

        let metadata = std::fs::metadata(path).map_err(|e| DomainError::Unreadable {
            location: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if !metadata.is_file() {
            return Err(DomainError::Unreadable {
                location: path.display().to_string(),
                reason: "not a regular file".to_string(),
            });
        }

        Ok(Self::from_metadata(path, &metadata))
    }

    /// Storage location of the report file
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// File size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Creation time of the file
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Full or redacted payload
    pub fn variant(&self) -> ReportVariant {
        self.variant
    }

    /// Name shared by a report and its redacted/standard sibling
    pub fn pair_key(&self) -> String {
        let name = self.file_name();
        match self.variant {
            ReportVariant::Redacted => name
                .strip_suffix(REDACTED_SUFFIX)
                .map(str::to_string)
                .unwrap_or(name),
            ReportVariant::Standard => name,
        }
    }

    fn file_name(&self) -> String {
        self.location
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Best available creation time: birth time, then mtime, then now
pub fn creation_time(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

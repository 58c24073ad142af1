//! Search engine: traversal, filtering and content scanning.
//!
//! This module provides the building blocks of a search run:
//! - [`walker`]: iterative directory traversal with a deferred-subdirectory stack
//! - [`content`]: windowed content scanning (literal and regular expression)
//! - [`ignore`]: directory-exclusion rules (full / rooted / relative)
//! - [`masks`]: glob-style name mask groups
//! - [`filters`]: attribute, size and date criteria
//! - [`controller`]: worker thread lifecycle, cancellation and result delivery
//!
//! # Example
//!
//! ```no_run
//! use rustfind::search::{SearchController, SearchJob, SearchSpec};
//! use rustfind::search::filters::FilterCriteria;
//! use std::sync::Arc;
//!
//! let spec = SearchSpec::new("/home/user/projects", "*.rs;*.toml", true).unwrap();
//! let job = SearchJob::new(vec![spec], Arc::new(FilterCriteria::default()));
//!
//! let mut controller = SearchController::new();
//! // controller.start(job, sink) with any ResultSink implementation
//! ```

pub mod content;
pub mod controller;
pub mod filters;
pub mod ignore;
pub mod masks;
pub mod walker;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use content::{ContentScanner, ContentSpec, EolPolicy};
pub use controller::{
    Refine, RefineMode, ResultSink, ScanningPath, SearchController, SearchJob, SearchStatus,
};
pub use filters::FilterCriteria;
pub use ignore::{IgnoreList, IgnoreRule};
pub use masks::MaskGroup;

/// Longest path the walker will enter or emit, in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Entry is read-only.
pub const ATTR_READONLY: u32 = 0x0001;
/// Entry is hidden (dot-prefixed name on Unix, hidden attribute on Windows).
pub const ATTR_HIDDEN: u32 = 0x0002;
/// Entry is a directory.
pub const ATTR_DIRECTORY: u32 = 0x0010;
/// Entry is a symbolic link or other reparse point. Such entries report size 0
/// at the directory level; the content scanner sizes the target separately.
pub const ATTR_REPARSE_POINT: u32 = 0x0400;

/// Derive the attribute bits for a directory entry.
///
/// Uses the native attribute word on Windows; on other platforms the bits are
/// reconstructed from the metadata and the file name.
#[must_use]
pub fn attributes_of(metadata: &std::fs::Metadata, name: &str) -> u32 {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        let _ = name;
        metadata.file_attributes()
    }
    #[cfg(not(windows))]
    {
        let mut attr = 0;
        if metadata.permissions().readonly() {
            attr |= ATTR_READONLY;
        }
        if name.starts_with('.') {
            attr |= ATTR_HIDDEN;
        }
        if metadata.is_dir() {
            attr |= ATTR_DIRECTORY;
        }
        if metadata.file_type().is_symlink() {
            attr |= ATTR_REPARSE_POINT;
        }
        attr
    }
}

/// Severity of a [`LogEntry`] surfaced during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational (e.g. a subtree skipped by the ignore list).
    Info,
    /// A non-fatal problem (inaccessible directory, unreadable file, ...).
    Error,
}

/// A structured log entry delivered to the result sink.
///
/// Errors during a run never abort it; they surface here so a consumer can
/// show them after the run completes.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Entry severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Path of the file or directory the entry refers to, when there is one.
    pub path: Option<String>,
}

impl LogEntry {
    /// Create an informational entry for `path`.
    #[must_use]
    pub fn info(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create an error entry for `path`.
    #[must_use]
    pub fn error(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create an error entry with no associated path.
    #[must_use]
    pub fn error_no_path(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            path: None,
        }
    }
}

/// Name-mask predicate supplied to a run.
///
/// Implemented by [`MaskGroup`]; a consumer may plug in its own matcher.
pub trait NameMatcher: Send + Sync {
    /// Test a bare file name (no directory part) against the mask.
    fn matches_name(&self, name: &str) -> bool;
}

/// Attribute/size/date predicate supplied to a run.
///
/// Implemented by [`FilterCriteria`]; a consumer may plug in its own test.
pub trait EntryCriteria: Send + Sync {
    /// Test an entry's attribute bits, size and last-write time.
    fn accepts(&self, attr: u32, size: u64, modified: SystemTime) -> bool;
}

/// One root to search: a directory, a mask group and a recursion switch.
///
/// A run consumes an ordered sequence of these; they are evaluated in order
/// and never merged.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    /// Root directory of this spec.
    pub root: PathBuf,
    /// Compiled name masks applied to every enumerated entry.
    pub masks: MaskGroup,
    /// Whether to descend into subdirectories.
    pub recurse: bool,
}

impl SearchSpec {
    /// Compile a spec from a root path and a raw mask string (`*.rs;*.toml`).
    ///
    /// # Errors
    ///
    /// Returns [`masks::MaskError`] when the mask string does not compile.
    pub fn new(
        root: impl Into<PathBuf>,
        masks: &str,
        recurse: bool,
    ) -> Result<Self, masks::MaskError> {
        Ok(Self {
            root: root.into(),
            masks: MaskGroup::compile(masks)?,
            recurse,
        })
    }
}

/// A file or directory that passed every active filter.
#[derive(Debug, Clone)]
pub struct FoundEntry {
    /// Directory containing the entry (no trailing separator).
    pub path: String,
    /// Bare entry name.
    pub name: String,
    /// Size in bytes (0 for directories and reparse points).
    pub size: u64,
    /// Attribute bits (`ATTR_*`).
    pub attr: u32,
    /// Last-write timestamp.
    pub modified: SystemTime,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl FoundEntry {
    /// Full path of the entry.
    #[must_use]
    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.path).join(&self.name)
    }

    /// Whether the entry is a symlink or other reparse point.
    #[must_use]
    pub fn is_reparse_point(&self) -> bool {
        self.attr & ATTR_REPARSE_POINT != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_entry_full_path() {
        let entry = FoundEntry {
            path: "/data/docs".to_string(),
            name: "report.txt".to_string(),
            size: 5,
            attr: 0,
            modified: SystemTime::UNIX_EPOCH,
            is_dir: false,
        };
        assert_eq!(entry.full_path(), PathBuf::from("/data/docs/report.txt"));
        assert!(!entry.is_reparse_point());
    }

    #[test]
    fn test_log_entry_constructors() {
        let info = LogEntry::info("skipped", "/tmp/x");
        assert_eq!(info.severity, Severity::Info);
        assert_eq!(info.path.as_deref(), Some("/tmp/x"));

        let err = LogEntry::error_no_path("bad pattern");
        assert_eq!(err.severity, Severity::Error);
        assert!(err.path.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_attributes_of_hidden_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let meta = std::fs::metadata(dir.path()).unwrap();
        let attr = attributes_of(&meta, ".config");
        assert_ne!(attr & ATTR_DIRECTORY, 0);
        assert_ne!(attr & ATTR_HIDDEN, 0);
    }
}

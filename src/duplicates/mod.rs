//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Accumulating duplicate candidates during a search run
//! - Sorting and grouping them by name, size and content digest
//! - Presentation markers (alternating distinct flags, group ids)
//!
//! Candidates are collected by the walker, then [`DuplicateGrouper::examine`]
//! runs once after traversal: sort, drop singletons, digest size-ambiguous
//! groups, re-sort, and assign group markers.

pub mod grouper;

use std::path::PathBuf;

use unicode_normalization::UnicodeNormalization;

use crate::search::FoundEntry;

pub use grouper::DuplicateGrouper;

/// Size of a content digest in bytes (128-bit MD5).
pub const DIGEST_SIZE: usize = 16;

/// A 128-bit content digest.
pub type Digest = [u8; DIGEST_SIZE];

/// Which properties files must share to count as duplicates.
///
/// At least one of `by_name`/`by_size` must be set; `by_content` is only
/// meaningful together with `by_size` (equal content implies equal size).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuplicateFlags {
    /// Same file name (case-insensitive).
    pub by_name: bool,
    /// Same size in bytes.
    pub by_size: bool,
    /// Same content digest. Requires `by_size`.
    pub by_content: bool,
}

/// Invalid duplicate-criteria combination.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FlagsError {
    /// Neither name nor size was selected.
    #[error("duplicate search needs at least one of: same name, same size")]
    Empty,
    /// Content comparison without size comparison.
    #[error("content comparison requires size comparison")]
    ContentWithoutSize,
}

impl DuplicateFlags {
    /// Validate the combination.
    ///
    /// # Errors
    ///
    /// Returns [`FlagsError`] for an empty selection or `by_content` without
    /// `by_size`.
    pub fn validate(&self) -> Result<(), FlagsError> {
        if !self.by_name && !self.by_size {
            return Err(FlagsError::Empty);
        }
        if self.by_content && !self.by_size {
            return Err(FlagsError::ContentWithoutSize);
        }
        Ok(())
    }
}

/// A file taking part in duplicate grouping.
///
/// Wraps the [`FoundEntry`] with the content digest (computed lazily, only
/// for size-ambiguous candidates) and the presentation markers assigned after
/// grouping completes.
#[derive(Debug, Clone)]
pub struct DuplicateCandidate {
    /// The underlying directory entry.
    pub entry: FoundEntry,
    /// 128-bit content digest, present only when content comparison ran for
    /// this file.
    pub content_hash: Option<Digest>,
    /// Final equivalence-class id, assigned after grouping completes.
    pub group_id: Option<u32>,
    /// Alternates between consecutive groups in the final order; used by
    /// consumers to render group boundaries (e.g. alternating backgrounds).
    pub distinct: bool,
    /// Case-folded, NFC-normalized name used as the sort key.
    pub(crate) name_key: String,
    /// Case-folded full path used as the deterministic tie-break.
    pub(crate) path_key: String,
}

impl DuplicateCandidate {
    /// Wrap a found entry, precomputing its sort keys.
    #[must_use]
    pub fn new(entry: FoundEntry) -> Self {
        let name_key = entry.name.nfc().collect::<String>().to_lowercase();
        let path_key = format!("{}/{}", entry.path.to_lowercase(), name_key);
        Self {
            entry,
            content_hash: None,
            group_id: None,
            distinct: false,
            name_key,
            path_key,
        }
    }

    /// Full path of the underlying entry.
    #[must_use]
    pub fn full_path(&self) -> PathBuf {
        self.entry.full_path()
    }
}

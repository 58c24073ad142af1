//! Glob-style name mask groups.
//!
//! A mask group is a `;`-separated list of glob patterns (`*.rs;*.toml`).
//! An optional `|` splits the string into an include and an exclude section:
//! `*.*|*.bak;*.tmp` matches everything except backups. A group with an empty
//! include section matches every name.

use glob::{MatchOptions, Pattern, PatternError};

use super::NameMatcher;

/// Error compiling a mask group.
#[derive(thiserror::Error, Debug)]
pub enum MaskError {
    /// One of the `;`-separated patterns is not a valid glob.
    #[error("invalid mask '{mask}': {source}")]
    InvalidPattern {
        /// The offending pattern text.
        mask: String,
        /// The underlying glob error.
        #[source]
        source: PatternError,
    },
}

/// A compiled group of name masks.
#[derive(Debug, Clone)]
pub struct MaskGroup {
    raw: String,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

/// File names are matched case-insensitively, the way directory listings
/// present them to users; `*` is allowed to cross `.` boundaries.
const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl MaskGroup {
    /// Compile a raw mask string.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::InvalidPattern`] for the first pattern that does
    /// not compile.
    pub fn compile(raw: &str) -> Result<Self, MaskError> {
        let (include_part, exclude_part) = match raw.split_once('|') {
            Some((inc, exc)) => (inc, exc),
            None => (raw, ""),
        };

        Ok(Self {
            raw: raw.to_string(),
            include: Self::compile_part(include_part)?,
            exclude: Self::compile_part(exclude_part)?,
        })
    }

    fn compile_part(part: &str) -> Result<Vec<Pattern>, MaskError> {
        part.split(';')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| {
                Pattern::new(m).map_err(|source| MaskError::InvalidPattern {
                    mask: m.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// The mask string this group was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl NameMatcher for MaskGroup {
    fn matches_name(&self, name: &str) -> bool {
        if self
            .exclude
            .iter()
            .any(|p| p.matches_with(name, OPTIONS))
        {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches_with(name, OPTIONS))
    }
}

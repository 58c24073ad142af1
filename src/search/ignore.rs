//! Directory-exclusion rules.
//!
//! Rules are persisted as `{enabled, path}` pairs and compiled once per run.
//! The shape of the path decides how it matches:
//!
//! - **Full**: begins with a drive letter (`C:\Temp\`) or a UNC server
//!   (`\\server\share\...`); the directory path must start with it.
//! - **Rooted**: begins with a single separator (`\Temp\`); matched right
//!   after the path's root component, under *any* root.
//! - **Relative**: anything else (`node_modules`); matched as a substring
//!   anywhere in the path.
//!
//! All comparisons are case-insensitive over a separator-normalized form.
//! Matching respects the search-root boundary: an occurrence that ends within
//! the root the user asked to search never prunes anything, so the root
//! itself cannot be ignored away.

use super::MAX_PATH_LEN;

/// One persisted ignore rule. Order of rules is insertion order and is
/// preserved by the options store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IgnoreRule {
    /// Disabled rules are kept in the list but not compiled into a run.
    pub enabled: bool,
    /// Raw path text as the user entered it.
    pub path: String,
}

impl IgnoreRule {
    /// Convenience constructor.
    #[must_use]
    pub fn new(enabled: bool, path: impl Into<String>) -> Self {
        Self {
            enabled,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IgnoreKind {
    Full,
    Rooted,
    Relative,
}

#[derive(Debug, Clone)]
struct CompiledEntry {
    kind: IgnoreKind,
    /// Lower-cased, forward-slash form; leading separator for non-Full
    /// entries, trailing separator always.
    normalized: String,
}

/// Compiled, run-ready form of the ignore rules.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    entries: Vec<CompiledEntry>,
}

/// Canonical comparison form: forward slashes, lower case.
pub(crate) fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Byte offset just past the root component of a normalized path, keeping the
/// following separator (`//server/share/x/` -> `/x/`, `c:/x/` -> `/x/`,
/// `/x/` -> `/x/`).
fn skip_root(path: &str) -> usize {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'/' && bytes[1] == b'/' {
        let mut i = 2;
        while i < bytes.len() && bytes[i] != b'/' {
            i += 1;
        }
        if i < bytes.len() {
            i += 1; // separator after the server name
        }
        while i < bytes.len() && bytes[i] != b'/' {
            i += 1;
        }
        i
    } else if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        2
    } else {
        0
    }
}

fn classify(raw: &str) -> IgnoreKind {
    let bytes = raw.as_bytes();
    let starts_with_sep = |b: u8| b == b'/' || b == b'\\';
    if bytes.len() >= 2
        && ((starts_with_sep(bytes[0]) && starts_with_sep(bytes[1]))
            || (bytes[0].is_ascii_alphabetic() && bytes[1] == b':'))
    {
        IgnoreKind::Full
    } else if !bytes.is_empty() && starts_with_sep(bytes[0]) {
        IgnoreKind::Rooted
    } else {
        IgnoreKind::Relative
    }
}

impl IgnoreList {
    /// Compile the enabled rules for a run.
    ///
    /// Returns `None` when any enabled rule is pathologically long; the
    /// caller falls back to searching without an ignore list (best effort,
    /// never fatal).
    #[must_use]
    pub fn prepare(rules: &[IgnoreRule]) -> Option<Self> {
        let mut entries = Vec::new();
        for rule in rules.iter().filter(|r| r.enabled) {
            let raw = rule.path.trim_start_matches(' ');
            if raw.is_empty() {
                log::debug!("skipping empty ignore rule");
                continue;
            }
            if raw.len() >= 2 * MAX_PATH_LEN {
                log::error!("ignore rule too long ({} bytes)", raw.len());
                return None;
            }

            let kind = classify(raw);
            let mut normalized = normalize(raw);
            if kind != IgnoreKind::Full && !normalized.starts_with('/') {
                normalized.insert(0, '/');
            }
            if !normalized.ends_with('/') {
                normalized.push('/');
            }
            entries.push(CompiledEntry { kind, normalized });
        }
        Some(Self { entries })
    }

    /// Whether no rule survived compilation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Test a directory path against the compiled rules.
    ///
    /// `path` must be separator-terminated. `start_path_len` is the length of
    /// the normalized search-root prefix (with trailing separator); a match
    /// counts only when it extends beyond that boundary.
    #[must_use]
    pub fn contains(&self, path: &str, start_path_len: usize) -> bool {
        let path = normalize(path);
        for entry in &self.entries {
            let len = entry.normalized.len();
            match entry.kind {
                IgnoreKind::Full => {
                    if len > start_path_len && path.starts_with(&entry.normalized) {
                        return true;
                    }
                }
                IgnoreKind::Rooted => {
                    let root = skip_root(&path);
                    if root + len > start_path_len && path[root..].starts_with(&entry.normalized) {
                        return true;
                    }
                }
                IgnoreKind::Relative => {
                    // Scan every occurrence: an early one may end inside the
                    // search root while a later one does not.
                    let mut from = 0;
                    while let Some(idx) = path[from..].find(&entry.normalized) {
                        let at = from + idx;
                        if at + len > start_path_len {
                            return true;
                        }
                        from = at + 1;
                    }
                }
            }
        }
        false
    }
}

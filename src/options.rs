//! Persisted search options and ignore rules.
//!
//! The engine itself keeps nothing on disk; this module is the persistence
//! collaborator. It stores the last-used search options, a list of named
//! presets, and the ignore-rule list (insertion order preserved) as a single
//! JSON document under the platform config directory.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::search::IgnoreRule;

/// One search-options record: everything needed to prefill a new run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Display name of the record (presets only).
    #[serde(default)]
    pub name: String,
    /// Name mask string (`*.rs;*.toml`).
    pub named: String,
    /// Root directories, `;`-separated.
    pub look_in: String,
    /// Content pattern, empty when contents are not searched.
    #[serde(default)]
    pub grep: String,
    /// Descend into subdirectories.
    pub sub_directories: bool,
    /// Whole-word content matching.
    #[serde(default)]
    pub whole_words: bool,
    /// Case-sensitive content matching.
    #[serde(default)]
    pub case_sensitive: bool,
    /// Interpret the content pattern as hex byte pairs.
    #[serde(default)]
    pub hex_mode: bool,
    /// Interpret the content pattern as a regular expression.
    #[serde(default)]
    pub regular_expressions: bool,
    /// Load this preset automatically when a new search dialog opens.
    #[serde(default)]
    pub auto_load: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            named: "*".to_string(),
            look_in: String::new(),
            grep: String::new(),
            sub_directories: true,
            whole_words: false,
            case_sensitive: false,
            hex_mode: false,
            regular_expressions: false,
            auto_load: false,
        }
    }
}

impl SearchOptions {
    /// Derive the display name from the mask and root fields.
    pub fn build_name(&mut self) {
        self.name = format!("\"{}\" in \"{}\"", self.named, self.look_in);
    }
}

/// The persisted document: last options, presets, ignore rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsStore {
    /// Options of the most recent run; used to prefill the next one.
    #[serde(default)]
    pub last: SearchOptions,
    /// Named presets, in user-defined order.
    #[serde(default)]
    pub presets: Vec<SearchOptions>,
    /// Ignore rules, in insertion order.
    #[serde(default = "default_ignore_rules")]
    pub ignore: Vec<IgnoreRule>,
}

fn default_ignore_rules() -> Vec<IgnoreRule> {
    vec![
        IgnoreRule::new(true, "\\System Volume Information"),
        IgnoreRule::new(false, "Local Settings\\Temporary Internet Files"),
    ]
}

impl Default for OptionsStore {
    fn default() -> Self {
        Self {
            last: SearchOptions::default(),
            presets: Vec::new(),
            ignore: default_ignore_rules(),
        }
    }
}

impl OptionsStore {
    /// Load the store from the default platform-specific path, falling back
    /// to defaults when missing or unreadable.
    #[must_use]
    pub fn load() -> Self {
        match Self::load_internal() {
            Ok(store) => store,
            Err(err) => {
                log::debug!("failed to load options store, using defaults: {err}");
                Self::default()
            }
        }
    }

    fn load_internal() -> Result<Self> {
        let path = Self::store_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save the store to the default platform-specific path.
    ///
    /// # Errors
    ///
    /// Propagates directory-creation, serialization and write failures.
    pub fn save(&self) -> Result<()> {
        let path = Self::store_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn store_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "rustfind", "rustfind")
            .ok_or_else(|| anyhow::anyhow!("failed to determine project directories"))?;
        Ok(dirs.config_dir().join("options.json"))
    }

    /// Add an ignore rule unless an equivalent one exists.
    ///
    /// Paths are compared case-insensitively and without trailing
    /// separators. An existing match is re-enabled instead of duplicated.
    /// Returns whether the list changed.
    pub fn add_ignore_unique(&mut self, enabled: bool, path: &str) -> bool {
        let key = ignore_key(path);
        if key.is_empty() {
            return false;
        }
        for rule in &mut self.ignore {
            if ignore_key(&rule.path) == key {
                let changed = !rule.enabled;
                rule.enabled = true;
                return changed;
            }
        }
        self.ignore.push(IgnoreRule::new(enabled, path));
        true
    }
}

fn ignore_key(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .replace('\\', "/")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let store = OptionsStore::default();
        assert_eq!(store.last.named, "*");
        assert!(store.last.sub_directories);
        assert_eq!(store.ignore.len(), 2);
        assert!(store.ignore[0].enabled);
        assert!(!store.ignore[1].enabled);
    }

    #[test]
    fn test_roundtrip_preserves_ignore_order() {
        let mut store = OptionsStore::default();
        store.ignore.push(IgnoreRule::new(true, "zzz"));
        store.ignore.push(IgnoreRule::new(true, "aaa"));

        let json = serde_json::to_string(&store).unwrap();
        let loaded: OptionsStore = serde_json::from_str(&json).unwrap();
        let paths: Vec<_> = loaded.ignore.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "\\System Volume Information",
                "Local Settings\\Temporary Internet Files",
                "zzz",
                "aaa"
            ]
        );
    }

    #[test]
    fn test_add_ignore_unique_reenables_existing() {
        let mut store = OptionsStore::default();
        let before = store.ignore.len();
        // Same path, different case and trailing separator.
        assert!(store.add_ignore_unique(true, "local settings\\temporary internet files\\"));
        assert_eq!(store.ignore.len(), before);
        assert!(store.ignore[1].enabled);

        assert!(store.add_ignore_unique(true, "node_modules"));
        assert_eq!(store.ignore.len(), before + 1);

        // Exact duplicate changes nothing.
        assert!(!store.add_ignore_unique(true, "node_modules/"));
        assert_eq!(store.ignore.len(), before + 1);
    }

    #[test]
    fn test_options_roundtrip() {
        let mut options = SearchOptions {
            named: "*.rs".into(),
            look_in: "/src".into(),
            grep: "needle".into(),
            regular_expressions: true,
            ..Default::default()
        };
        options.build_name();
        assert_eq!(options.name, "\"*.rs\" in \"/src\"");

        let json = serde_json::to_string(&options).unwrap();
        let loaded: SearchOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.grep, "needle");
        assert!(loaded.regular_expressions);
        assert!(loaded.sub_directories);
    }
}

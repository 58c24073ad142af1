//! Iterative directory traversal.
//!
//! The walker keeps an explicit stack of pending directories instead of
//! recursing natively: one directory's listing is fully consumed (emitting
//! files and recording subdirectory names) before any descent, so memory per
//! level stays bounded and cancellation can cut in between levels. Pushing a
//! level's subdirectories in reverse enumeration order makes the traversal
//! depth-first while still emitting all entries of a level before any of its
//! grandchildren.
//!
//! Enumeration errors are logged and skipped; they never abort the run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use super::content::ContentScanner;
use super::controller::ScanningPath;
use super::ignore::{self, IgnoreList};
use super::{
    attributes_of, EntryCriteria, FoundEntry, LogEntry, NameMatcher, SearchSpec, ATTR_REPARSE_POINT,
    MAX_PATH_LEN,
};

/// Receives everything a traversal produces.
///
/// The controller wires this to the result sink and, in duplicate mode, the
/// candidate store. `tick` fires once per directory entry and drives the
/// coalesced refresh protocol.
pub trait WalkEvents {
    /// An entry passed every active filter.
    fn entry(&mut self, entry: FoundEntry);
    /// A skip or error worth surfacing.
    fn log(&mut self, entry: LogEntry);
    /// Called once per enumerated directory entry.
    fn tick(&mut self) {}
}

/// Traverses the roots of a search run.
pub struct DirectoryWalker<'a> {
    /// Attribute/size/date predicate.
    pub criteria: &'a dyn EntryCriteria,
    /// Compiled ignore rules, if any survived preparation.
    pub ignore: Option<&'a IgnoreList>,
    /// Content scanner when the run greps file contents.
    pub scanner: Option<&'a ContentScanner>,
    /// Cooperative cancellation flag, polled per entry.
    pub stop: &'a AtomicBool,
    /// "Currently scanning" string shared with the initiating thread.
    pub scanning: &'a ScanningPath,
}

impl DirectoryWalker<'_> {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Walk one spec, reporting through `events`.
    pub fn run(&self, spec: &SearchSpec, events: &mut dyn WalkEvents) {
        let root_str = separator_terminated(&spec.root.to_string_lossy());
        let start_path_len = ignore::normalize(&root_str).len();

        let mut pending: Vec<PathBuf> = vec![spec.root.clone()];
        while let Some(dir) = pending.pop() {
            if self.stopped() {
                break;
            }
            self.scan_dir(&dir, spec, start_path_len, &mut pending, events);
        }
    }

    /// Enumerate one directory: emit entries, defer subdirectories.
    fn scan_dir(
        &self,
        dir: &Path,
        spec: &SearchSpec,
        start_path_len: usize,
        pending: &mut Vec<PathBuf>,
        events: &mut dyn WalkEvents,
    ) {
        let dir_str = dir.to_string_lossy().into_owned();
        let dir_sep = separator_terminated(&dir_str);

        if let Some(ignore) = self.ignore {
            if ignore.contains(&dir_sep, start_path_len) {
                events.log(LogEntry::info("Skipped (ignore list)", dir_str));
                return;
            }
        }

        self.scanning.set(&dir_str);

        let listing = match std::fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    events.log(LogEntry::error(
                        format!("Error reading directory: {err}"),
                        dir_str,
                    ));
                }
                return;
            }
        };

        let mut deferred: Vec<std::ffi::OsString> = Vec::new();
        for item in listing {
            if self.stopped() {
                return;
            }
            events.tick();

            let item = match item {
                Ok(item) => item,
                Err(err) => {
                    events.log(LogEntry::error(
                        format!("Error reading directory: {err}"),
                        dir_str.clone(),
                    ));
                    continue;
                }
            };
            let name_os = item.file_name();
            let name = name_os.to_string_lossy().into_owned();

            // DirEntry::metadata does not traverse symlinks, so reparse
            // points keep their own attributes here.
            let metadata = match item.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    events.log(LogEntry::error(
                        format!("Error reading entry: {err}"),
                        format!("{dir_sep}{name}"),
                    ));
                    continue;
                }
            };

            let attr = attributes_of(&metadata, &name);
            let is_dir = metadata.is_dir();
            let is_link = attr & ATTR_REPARSE_POINT != 0;
            // Links report size 0 at the directory level; the content
            // scanner sizes the target itself when it needs to.
            let size = if is_dir || is_link { 0 } else { metadata.len() };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            if dir_sep.len() + name.len() >= MAX_PATH_LEN {
                events.log(LogEntry::error("Path too long", format!("{dir_sep}{name}")));
                continue;
            }

            if self.criteria.accepts(attr, size, modified) && spec.masks.matches_name(&name) {
                let mut accepted = true;
                if let Some(scanner) = self.scanner {
                    if is_dir {
                        accepted = false; // directories have no content to grep
                    } else {
                        let full = dir.join(&name_os);
                        self.scanning.set(&full.to_string_lossy());
                        match scanner.scan(&full, size, is_link) {
                            Ok(found) => accepted = found.is_some(),
                            Err(err) => {
                                events.log(LogEntry::error(
                                    err.to_string(),
                                    full.to_string_lossy(),
                                ));
                                accepted = false;
                            }
                        }
                    }
                }
                if accepted {
                    events.entry(FoundEntry {
                        path: dir_str.clone(),
                        name: name.clone(),
                        size,
                        attr,
                        modified,
                        is_dir,
                    });
                }
            }

            if is_dir && spec.recurse {
                if dir_sep.len() + name.len() + 1 >= MAX_PATH_LEN {
                    events.log(LogEntry::error("Path too long", format!("{dir_sep}{name}")));
                } else {
                    deferred.push(name_os);
                }
            }
        }

        // This level is done; queue its subdirectories so they pop in
        // enumeration order, each subtree before the next sibling's.
        for name in deferred.into_iter().rev() {
            pending.push(dir.join(name));
        }
    }
}

fn separator_terminated(path: &str) -> String {
    if path.ends_with('/') || path.ends_with('\\') {
        path.to_string()
    } else {
        format!("{path}{}", std::path::MAIN_SEPARATOR)
    }
}

//! Search run lifecycle: worker thread, cancellation, result delivery.
//!
//! A [`SearchController`] owns at most one worker thread. The initiating
//! thread starts a run, may request a stop, and polls the shared
//! [`ScanningPath`]; everything else happens on the worker and is delivered
//! through the [`ResultSink`].
//!
//! Found items are pushed to the sink as they appear, but bulk *refresh*
//! notifications are coalesced: at most one per 500 ms or per 100 accumulated
//! items, plus one unconditional refresh when the run ends. Data is never
//! dropped by the throttle, only the notification is batched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::content::{ContentScanner, ContentSpec};
use super::ignore::{IgnoreList, IgnoreRule};
use super::walker::{DirectoryWalker, WalkEvents};
use super::{EntryCriteria, FoundEntry, LogEntry, NameMatcher, SearchSpec, Severity};
use crate::duplicates::{DuplicateCandidate, DuplicateFlags, DuplicateGrouper, FlagsError};

/// Coalescing constants for refresh notifications.
const REFRESH_INTERVAL: Duration = Duration::from_millis(500);
const REFRESH_BATCH: usize = 100;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// The run visited everything it was asked to.
    Completed,
    /// The stop flag was observed; partial results were delivered.
    Cancelled,
    /// Result storage could not grow; the run stopped early.
    Failed,
}

/// Receives results, logs and lifecycle notifications of a run.
///
/// All methods default to no-ops so consumers implement only what they need.
/// Methods are called from the worker thread.
pub trait ResultSink: Send + Sync {
    /// A matching entry was found (plain search and refine runs).
    fn entry_found(&self, _entry: &FoundEntry) {}
    /// Final duplicate groups, in presentation order.
    fn duplicates_ready(&self, _candidates: Vec<DuplicateCandidate>) {}
    /// Coalesced hint that a visual consumer should repaint.
    fn refresh(&self) {}
    /// A structured log entry (skips, recoverable errors).
    fn log(&self, _entry: &LogEntry) {}
    /// Digest progress over all pending candidates, 0..=100.
    fn digest_progress(&self, _percent: u8) {}
    /// Terminal status; called exactly once per run.
    fn finished(&self, _status: SearchStatus) {}
}

/// Synchronized "currently scanning" string.
///
/// The worker writes it frequently; the initiating thread polls it. Access is
/// copy-out; no reference escapes the lock. A base prefix can be fixed so the
/// worker only swaps the variable suffix.
#[derive(Debug, Default)]
pub struct ScanningPath {
    inner: Mutex<ScanningInner>,
}

#[derive(Debug, Default)]
struct ScanningInner {
    buffer: String,
    base_len: usize,
    dirty: bool,
}

impl ScanningPath {
    /// Set the fixed prefix and clear the dirty bit.
    pub fn set_base(&self, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffer.clear();
        inner.buffer.push_str(text);
        inner.base_len = inner.buffer.len();
        inner.dirty = false;
    }

    /// Replace the suffix after the base and mark dirty.
    pub fn set(&self, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        let base = inner.base_len;
        inner.buffer.truncate(base);
        inner.buffer.push_str(text);
        inner.dirty = true;
    }

    /// Copy out the full string.
    #[must_use]
    pub fn get(&self) -> String {
        self.inner.lock().unwrap().buffer.clone()
    }

    /// Whether a repaint is pending.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().unwrap().dirty
    }

    /// Mark the current content as displayed.
    pub fn set_dirty(&self, dirty: bool) {
        self.inner.lock().unwrap().dirty = dirty;
    }

    /// Reset to an empty string.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffer.clear();
        inner.base_len = 0;
        inner.dirty = false;
    }
}

/// Refine mode: how a previous result set is combined with the new criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineMode {
    /// Keep entries that pass the new criteria.
    Intersect,
    /// Keep entries that fail the new criteria.
    Subtract,
}

/// A refine request: re-test previous results instead of walking disks.
#[derive(Debug, Clone)]
pub struct Refine {
    /// How matching entries are combined with the previous set.
    pub mode: RefineMode,
    /// The previous result set, as delivered by an earlier run.
    pub entries: Vec<FoundEntry>,
}

/// Everything one run needs, assembled by the caller.
pub struct SearchJob {
    /// Ordered roots to search. The first spec's masks also drive refines.
    pub specs: Vec<SearchSpec>,
    /// Attribute/size/date predicate.
    pub criteria: Arc<dyn EntryCriteria>,
    /// Raw ignore rules; compiled at run start.
    pub ignore_rules: Vec<IgnoreRule>,
    /// Content pattern, when file contents are grepped.
    pub content: Option<ContentSpec>,
    /// Duplicate criteria; switches the run into duplicate mode.
    pub duplicates: Option<DuplicateFlags>,
    /// Refine request; reuses a previous result set instead of walking.
    pub refine: Option<Refine>,
}

impl SearchJob {
    /// A plain search over `specs` with the given criteria.
    #[must_use]
    pub fn new(specs: Vec<SearchSpec>, criteria: Arc<dyn EntryCriteria>) -> Self {
        Self {
            specs,
            criteria,
            ignore_rules: Vec::new(),
            content: None,
            duplicates: None,
            refine: None,
        }
    }

    /// Attach ignore rules.
    #[must_use]
    pub fn with_ignore_rules(mut self, rules: Vec<IgnoreRule>) -> Self {
        self.ignore_rules = rules;
        self
    }

    /// Attach a content pattern.
    #[must_use]
    pub fn with_content(mut self, content: ContentSpec) -> Self {
        self.content = Some(content);
        self
    }

    /// Switch to duplicate mode.
    #[must_use]
    pub fn with_duplicates(mut self, flags: DuplicateFlags) -> Self {
        self.duplicates = Some(flags);
        self
    }

    /// Refine a previous result set.
    #[must_use]
    pub fn with_refine(mut self, refine: Refine) -> Self {
        self.refine = Some(refine);
        self
    }
}

/// Error starting a run.
#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    /// A run is already in progress on this controller.
    #[error("a search is already running")]
    AlreadyRunning,
    /// The job has no specs to search.
    #[error("nothing to search: no specs given")]
    NoSpecs,
    /// The duplicate criteria combination is invalid.
    #[error(transparent)]
    InvalidFlags(#[from] FlagsError),
    /// The worker thread could not be spawned.
    #[error("cannot spawn search worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Owns the worker thread of at most one active run.
pub struct SearchController {
    stop: Arc<AtomicBool>,
    scanning: Arc<ScanningPath>,
    worker: Option<JoinHandle<SearchStatus>>,
}

impl Default for SearchController {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchController {
    /// Create an idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            scanning: Arc::new(ScanningPath::default()),
            worker: None,
        }
    }

    /// Use an externally owned stop flag (e.g. a Ctrl+C handler's).
    #[must_use]
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = flag;
        self
    }

    /// The flag a stop request sets.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// The "currently scanning" string for pollers.
    #[must_use]
    pub fn scanning_path(&self) -> Arc<ScanningPath> {
        Arc::clone(&self.scanning)
    }

    /// Whether a worker is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Start a run. Rejects a second concurrent start.
    ///
    /// # Errors
    ///
    /// [`ControllerError::AlreadyRunning`] while a worker is active, and
    /// validation/spawn errors before any work starts.
    pub fn start(
        &mut self,
        job: SearchJob,
        sink: Arc<dyn ResultSink>,
    ) -> Result<(), ControllerError> {
        if self.is_running() {
            return Err(ControllerError::AlreadyRunning);
        }
        if job.specs.is_empty() {
            return Err(ControllerError::NoSpecs);
        }
        if let Some(flags) = &job.duplicates {
            flags.validate()?;
        }

        self.stop.store(false, Ordering::SeqCst);
        self.scanning.clear();

        let stop = Arc::clone(&self.stop);
        let scanning = Arc::clone(&self.scanning);
        let handle = std::thread::Builder::new()
            .name("search-worker".to_string())
            .spawn(move || run_worker(job, stop, scanning, sink))?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Request a cooperative stop. Idempotent; never blocks.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Block until the worker ends, returning its terminal status.
    pub fn wait(&mut self) -> Option<SearchStatus> {
        self.worker
            .take()
            .map(|handle| handle.join().unwrap_or(SearchStatus::Failed))
    }
}

/// Coalesces refresh notifications: every found item is delivered, but the
/// repaint hint fires at most once per interval or batch.
struct BatchNotifier {
    sink: Arc<dyn ResultSink>,
    pushed: usize,
    visible: usize,
    last_refresh: Instant,
    need_refresh: bool,
}

impl BatchNotifier {
    fn new(sink: Arc<dyn ResultSink>) -> Self {
        Self {
            sink,
            pushed: 0,
            visible: 0,
            last_refresh: Instant::now(),
            need_refresh: false,
        }
    }

    fn item_pushed(&mut self) {
        self.pushed += 1;
        if self.pushed >= self.visible + REFRESH_BATCH
            || self.last_refresh.elapsed() >= REFRESH_INTERVAL
        {
            self.refresh();
        } else {
            self.need_refresh = true;
        }
    }

    fn tick(&mut self) {
        if self.need_refresh && self.last_refresh.elapsed() >= REFRESH_INTERVAL {
            self.refresh();
        }
    }

    fn refresh(&mut self) {
        self.sink.refresh();
        self.visible = self.pushed;
        self.last_refresh = Instant::now();
        self.need_refresh = false;
    }

    fn flush(&mut self) {
        self.sink.refresh();
        self.visible = self.pushed;
        self.need_refresh = false;
    }
}

/// Routes walker output to the sink or the duplicate store.
struct Dispatcher<'a> {
    sink: Arc<dyn ResultSink>,
    notifier: &'a mut BatchNotifier,
    grouper: Option<&'a mut DuplicateGrouper>,
    stop: &'a AtomicBool,
    failed: &'a mut bool,
}

impl WalkEvents for Dispatcher<'_> {
    fn entry(&mut self, entry: FoundEntry) {
        match self.grouper.as_deref_mut() {
            Some(grouper) => {
                if entry.is_dir {
                    return; // duplicate search compares files only
                }
                if let Err(err) = grouper.push(entry) {
                    log::error!("cannot grow result storage: {err}");
                    self.sink
                        .log(&LogEntry::error_no_path(format!("Cannot store results: {err}")));
                    self.stop.store(true, Ordering::SeqCst);
                    *self.failed = true;
                }
            }
            None => {
                self.sink.entry_found(&entry);
                self.notifier.item_pushed();
            }
        }
    }

    fn log(&mut self, entry: LogEntry) {
        match entry.severity {
            Severity::Info => log::info!("{} {}", entry.message, entry.path.as_deref().unwrap_or("")),
            Severity::Error => {
                log::error!("{} {}", entry.message, entry.path.as_deref().unwrap_or(""));
            }
        }
        self.sink.log(&entry);
    }

    fn tick(&mut self) {
        self.notifier.tick();
    }
}

/// Worker body: one run, start to terminal status.
fn run_worker(
    job: SearchJob,
    stop: Arc<AtomicBool>,
    scanning: Arc<ScanningPath>,
    sink: Arc<dyn ResultSink>,
) -> SearchStatus {
    log::debug!("search worker started ({} specs)", job.specs.len());
    let mut notifier = BatchNotifier::new(Arc::clone(&sink));
    let mut failed = false;

    // A bad content pattern is logged once and poisons content evaluation
    // for the whole run; nothing can match, but the run ends normally.
    let mut content_poisoned = false;
    let scanner = match &job.content {
        Some(spec) => match ContentScanner::new(spec, Arc::clone(&stop)) {
            Ok(scanner) => Some(scanner),
            Err(err) => {
                log::error!("content pattern rejected: {err}");
                sink.log(&LogEntry::error_no_path(err.to_string()));
                content_poisoned = true;
                None
            }
        },
        None => None,
    };

    let ignore = IgnoreList::prepare(&job.ignore_rules).or_else(|| {
        log::warn!("ignore list preparation failed; searching without it");
        None
    });

    if let Some(refine) = &job.refine {
        run_refine(
            &job,
            refine,
            scanner.as_ref(),
            content_poisoned,
            &stop,
            &scanning,
            &sink,
            &mut notifier,
        );
    } else {
        let mut grouper = job.duplicates.map(DuplicateGrouper::new);

        for spec in &job.specs {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if content_poisoned {
                break;
            }
            let walker = DirectoryWalker {
                criteria: &*job.criteria,
                ignore: ignore.as_ref().filter(|l| !l.is_empty()),
                scanner: scanner.as_ref(),
                stop: &stop,
                scanning: &scanning,
            };
            let mut dispatcher = Dispatcher {
                sink: Arc::clone(&sink),
                notifier: &mut notifier,
                grouper: grouper.as_mut(),
                stop: &stop,
                failed: &mut failed,
            };
            walker.run(spec, &mut dispatcher);
        }

        if let Some(mut grouper) = grouper {
            // A cancelled walk still presents what it gathered, grouped by
            // the metadata criteria; digests cannot be asserted for files
            // that were never read.
            let metadata_only = stop.load(Ordering::Relaxed);
            grouper.examine(&stop, &scanning, &*sink, metadata_only);
            sink.duplicates_ready(grouper.into_candidates());
        }
    }

    notifier.flush();
    let status = if failed {
        SearchStatus::Failed
    } else if stop.load(Ordering::Relaxed) {
        SearchStatus::Cancelled
    } else {
        SearchStatus::Completed
    };
    log::debug!("search worker finished: {status:?}");
    sink.finished(status);
    status
}

/// Re-test a previous result set against the new criteria.
#[allow(clippy::too_many_arguments)]
fn run_refine(
    job: &SearchJob,
    refine: &Refine,
    scanner: Option<&ContentScanner>,
    content_poisoned: bool,
    stop: &AtomicBool,
    scanning: &ScanningPath,
    sink: &Arc<dyn ResultSink>,
    notifier: &mut BatchNotifier,
) {
    let spec = &job.specs[0];
    let total = refine.entries.len().max(1);
    let mut last_percent = -1i32;

    for (index, entry) in refine.entries.iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        notifier.tick();

        if scanner.is_none() {
            // Without content scanning the pass is fast; show percentages
            // instead of file names.
            let percent = (index * 100 / total) as i32;
            if percent != last_percent {
                last_percent = percent;
                scanning.set(&format!("{percent}%"));
            }
        }

        let mut ok = job
            .criteria
            .accepts(entry.attr, entry.size, entry.modified)
            && spec.masks.matches_name(&entry.name);

        if ok && job.content.is_some() {
            if content_poisoned || entry.is_dir {
                ok = false;
            } else if let Some(scanner) = scanner {
                let full = entry.full_path();
                scanning.set(&full.to_string_lossy());
                ok = match scanner.scan(&full, entry.size, entry.is_reparse_point()) {
                    Ok(found) => found.is_some(),
                    Err(err) => {
                        let entry_log = LogEntry::error(err.to_string(), full.to_string_lossy());
                        log::error!("{}", entry_log.message);
                        sink.log(&entry_log);
                        false
                    }
                };
            }
        }

        let keep = match refine.mode {
            RefineMode::Intersect => ok,
            RefineMode::Subtract => !ok,
        };
        if keep {
            sink.entry_found(entry);
            notifier.item_pushed();
        }
    }
}

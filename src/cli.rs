//! Command-line interface for RustFind.
//!
//! Arguments, subcommands and the console front-end are defined here using
//! the clap derive API. The front-end is just another [`ResultSink`]
//! implementation: it prints matches as they stream in, feeds the coalesced
//! refresh notifications into an indicatif status line, and turns the
//! terminal status into a process exit code.
//!
//! # Example
//!
//! ```bash
//! # Find Rust sources containing "todo!" under the current directory
//! rustfind search --named "*.rs" --containing "todo!"
//!
//! # Regular expression, whole words, custom roots
//! rustfind search src tests -e -c "fn\s+\w+_test" --whole-words
//!
//! # Duplicate files by size and content
//! rustfind duplicates ~/Downloads --same-size --same-content
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::duplicates::{DuplicateCandidate, DuplicateFlags};
use crate::error::ExitCode;
use crate::options::{OptionsStore, SearchOptions};
use crate::search::{
    ContentSpec, EolPolicy, FilterCriteria, FoundEntry, IgnoreRule, LogEntry, ResultSink,
    ScanningPath, SearchController, SearchJob, SearchSpec, SearchStatus, Severity, ATTR_DIRECTORY,
    ATTR_HIDDEN,
};
use crate::{logging, signal};

/// Recursive file search with content grep and duplicate detection.
#[derive(Debug, Parser)]
#[command(name = "rustfind")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress output and the run summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Search files by name, criteria and optionally content
    Search(SearchArgs),
    /// Group files into duplicate sets
    Duplicates(DuplicatesArgs),
}

/// Options shared by both subcommands.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Root directories to search (defaults to the current directory)
    #[arg(value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Name masks, `;`-separated (`*.rs;*.toml`); `|` starts an exclude part
    #[arg(short, long, default_value = "*", value_name = "MASKS")]
    pub named: String,

    /// Do not descend into subdirectories
    #[arg(long)]
    pub no_subdirs: bool,

    /// Minimum file size (e.g. 1KB, 1MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size (e.g. 1GB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Only entries modified on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub modified_after: Option<SystemTime>,

    /// Only entries modified on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub modified_before: Option<SystemTime>,

    /// Skip hidden files and directories
    #[arg(long)]
    pub skip_hidden: bool,

    /// Report files only, never directories
    #[arg(long)]
    pub files_only: bool,

    /// Extra ignore paths for this run (can be repeated)
    #[arg(short = 'i', long = "ignore", value_name = "PATH")]
    pub ignore_paths: Vec<String>,

    /// Do not apply the persisted ignore list
    #[arg(long)]
    pub no_ignore_list: bool,
}

/// Arguments for the search subcommand.
#[derive(Debug, Args)]
pub struct SearchArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Only report files containing this pattern
    #[arg(short = 'c', long, value_name = "PATTERN")]
    pub containing: Option<String>,

    /// Interpret the pattern as a regular expression (line-oriented)
    #[arg(short = 'e', long)]
    pub regex: bool,

    /// Interpret the pattern as hex byte pairs ("DE AD BE EF")
    #[arg(long, conflicts_with = "regex")]
    pub hex: bool,

    /// Match whole words only
    #[arg(short = 'w', long)]
    pub whole_words: bool,

    /// Case-sensitive content matching
    #[arg(long)]
    pub case_sensitive: bool,
}

/// Arguments for the duplicates subcommand.
#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Group by file name (case-insensitive)
    #[arg(long)]
    pub same_name: bool,

    /// Group by file size
    #[arg(long)]
    pub same_size: bool,

    /// Group by content digest (implies --same-size)
    #[arg(long)]
    pub same_content: bool,
}

/// Parse a human-readable size string into bytes.
///
/// # Examples
///
/// ```
/// use rustfind::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// ```
/// # Errors
///
/// Returns an error for an empty string, an invalid number or an unknown
/// suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;
    if num < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}

/// Parse a `YYYY-MM-DD` date into a timestamp at midnight UTC.
///
/// # Errors
///
/// Returns an error for anything `chrono` cannot parse as a date.
pub fn parse_date(s: &str) -> Result<SystemTime, String> {
    let date = chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{s}': {e}"))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("Invalid date '{s}'"))?
        .and_utc();
    Ok(datetime.into())
}

/// Run the application and map the outcome to an exit code.
///
/// # Errors
///
/// Propagates controller and signal-installation failures; recoverable
/// problems inside a run surface in the run log instead.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let handler = signal::install_handler()?;

    match &cli.command {
        Commands::Search(args) => run_search(&cli, args, &handler),
        Commands::Duplicates(args) => run_duplicates(&cli, args, &handler),
    }
}

fn run_search(
    cli: &Cli,
    args: &SearchArgs,
    handler: &signal::ShutdownHandler,
) -> anyhow::Result<ExitCode> {
    let mut store = OptionsStore::load();
    let mut job = build_job(&args.common, &store)?;

    if let Some(pattern) = &args.containing {
        job = job.with_content(ContentSpec {
            pattern: pattern.clone(),
            regex: args.regex,
            hex: args.hex,
            case_sensitive: args.case_sensitive,
            whole_words: args.whole_words,
            eol: EolPolicy::default(),
            window_size: None,
        });
    }

    let mut controller = SearchController::new().with_stop_flag(handler.get_flag());
    let sink = Arc::new(ConsoleSink::new(controller.scanning_path(), cli.quiet));
    controller.start(job, sink.clone())?;
    let status = controller.wait().unwrap_or(SearchStatus::Failed);

    remember_options(&mut store, &args.common, args.containing.as_deref(), args);
    finish(cli, &sink, status)
}

fn run_duplicates(
    cli: &Cli,
    args: &DuplicatesArgs,
    handler: &signal::ShutdownHandler,
) -> anyhow::Result<ExitCode> {
    let store = OptionsStore::load();
    let mut flags = DuplicateFlags {
        by_name: args.same_name,
        by_size: args.same_size || args.same_content,
        by_content: args.same_content,
    };
    if !flags.by_name && !flags.by_size {
        // Nothing selected: fall back to size + content.
        flags = DuplicateFlags {
            by_name: false,
            by_size: true,
            by_content: true,
        };
    }

    let job = build_job(&args.common, &store)?.with_duplicates(flags);

    let mut controller = SearchController::new().with_stop_flag(handler.get_flag());
    let sink = Arc::new(ConsoleSink::new(controller.scanning_path(), cli.quiet));
    controller.start(job, sink.clone())?;
    let status = controller.wait().unwrap_or(SearchStatus::Failed);

    print_duplicate_groups(&sink);
    finish(cli, &sink, status)
}

/// Build the job skeleton shared by both subcommands.
fn build_job(common: &CommonArgs, store: &OptionsStore) -> anyhow::Result<SearchJob> {
    let roots: Vec<PathBuf> = if common.roots.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        common.roots.clone()
    };

    let mut specs = Vec::with_capacity(roots.len());
    for root in roots {
        specs.push(SearchSpec::new(root, &common.named, !common.no_subdirs)?);
    }

    let mut criteria = FilterCriteria::default()
        .with_size_range(common.min_size, common.max_size)
        .with_modified_range(common.modified_after, common.modified_before);
    if common.skip_hidden {
        criteria = criteria.with_forbidden_attrs(ATTR_HIDDEN);
    }
    if common.files_only {
        criteria = criteria.with_forbidden_attrs(ATTR_DIRECTORY);
    }

    let mut rules: Vec<IgnoreRule> = if common.no_ignore_list {
        Vec::new()
    } else {
        store.ignore.clone()
    };
    rules.extend(
        common
            .ignore_paths
            .iter()
            .map(|p| IgnoreRule::new(true, p.clone())),
    );

    Ok(SearchJob::new(specs, Arc::new(criteria)).with_ignore_rules(rules))
}

/// Persist the last-used options; failures only get logged.
fn remember_options(
    store: &mut OptionsStore,
    common: &CommonArgs,
    grep: Option<&str>,
    args: &SearchArgs,
) {
    let mut last = SearchOptions {
        named: common.named.clone(),
        look_in: common
            .roots
            .iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(";"),
        grep: grep.unwrap_or_default().to_string(),
        sub_directories: !common.no_subdirs,
        whole_words: args.whole_words,
        case_sensitive: args.case_sensitive,
        hex_mode: args.hex,
        regular_expressions: args.regex,
        ..Default::default()
    };
    last.build_name();
    store.last = last;
    if let Err(err) = store.save() {
        log::debug!("failed to persist search options: {err}");
    }
}

/// Print duplicate groups with a separator between groups.
fn print_duplicate_groups(sink: &ConsoleSink) {
    let candidates = sink.duplicates.lock().unwrap();
    let mut last_group: Option<u32> = None;
    for candidate in candidates.iter() {
        if last_group.is_some() && candidate.group_id != last_group {
            println!();
        }
        last_group = candidate.group_id;
        println!(
            "{:>10}  {}",
            ByteSize::b(candidate.entry.size).to_string(),
            candidate.full_path().display()
        );
    }
}

/// Print the run log and summary, map the status to an exit code.
fn finish(cli: &Cli, sink: &ConsoleSink, status: SearchStatus) -> anyhow::Result<ExitCode> {
    let found = sink.found.load(Ordering::SeqCst) + sink.duplicates.lock().unwrap().len();
    let errors = sink.errors.load(Ordering::SeqCst);

    if !cli.quiet {
        for entry in sink.logs.lock().unwrap().iter() {
            let tag = match entry.severity {
                Severity::Info => "note",
                Severity::Error => "error",
            };
            eprintln!("{tag}: {} {}", entry.message, entry.path.as_deref().unwrap_or(""));
        }
        eprintln!("Found {found} item(s), {errors} error(s)");
    }

    Ok(match status {
        SearchStatus::Cancelled => ExitCode::Interrupted,
        SearchStatus::Failed => ExitCode::GeneralError,
        SearchStatus::Completed => {
            if errors > 0 {
                ExitCode::PartialSuccess
            } else if found == 0 {
                ExitCode::NoMatches
            } else {
                ExitCode::Success
            }
        }
    })
}

/// Console sink: streams matches to stdout, status to an indicatif spinner.
struct ConsoleSink {
    progress: ProgressBar,
    scanning: Arc<ScanningPath>,
    found: AtomicUsize,
    errors: AtomicUsize,
    logs: Mutex<Vec<LogEntry>>,
    duplicates: Mutex<Vec<DuplicateCandidate>>,
}

impl ConsoleSink {
    fn new(scanning: Arc<ScanningPath>, quiet: bool) -> Self {
        let progress = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        };
        Self {
            progress,
            scanning,
            found: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            logs: Mutex::new(Vec::new()),
            duplicates: Mutex::new(Vec::new()),
        }
    }

    fn print_line(&self, line: String) {
        if self.progress.is_hidden() {
            println!("{line}");
        } else {
            self.progress.println(line);
        }
    }
}

impl ResultSink for ConsoleSink {
    fn entry_found(&self, entry: &FoundEntry) {
        self.found.fetch_add(1, Ordering::SeqCst);
        let size = if entry.is_dir {
            "<DIR>".to_string()
        } else {
            ByteSize::b(entry.size).to_string()
        };
        self.print_line(format!("{size:>10}  {}", entry.full_path().display()));
    }

    fn duplicates_ready(&self, candidates: Vec<DuplicateCandidate>) {
        *self.duplicates.lock().unwrap() = candidates;
    }

    fn refresh(&self) {
        self.progress
            .set_message(truncate_path(&self.scanning.get(), 64));
        self.scanning.set_dirty(false);
    }

    fn log(&self, entry: &LogEntry) {
        if entry.severity == Severity::Error {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        self.logs.lock().unwrap().push(entry.clone());
    }

    fn digest_progress(&self, percent: u8) {
        self.progress
            .set_message(format!("Computing digests: {percent}%"));
    }

    fn finished(&self, _status: SearchStatus) {
        self.progress.finish_and_clear();
    }
}

/// Shorten a path for the one-line status display.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.len() <= max_len {
        return path.to_string();
    }
    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if file_name.len() >= max_len {
        return format!("...{}", &file_name[file_name.len() - max_len + 3..]);
    }
    format!(".../{file_name}")
}

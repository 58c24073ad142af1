//! Logging infrastructure for RustFind.
//!
//! Structured logging uses the `log` facade with an `env_logger` backend.
//! The effective level comes from (in priority order):
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. CLI flags: `--quiet` (errors only) or `-v`/`-vv` (debug/trace)
//! 3. Default: warn level
//!
//! Engine events that a user should see after a run (skipped directories,
//! unreadable files) additionally flow through the result sink as structured
//! log entries; this module only configures the developer-facing log stream.

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Initialize the logging subsystem from CLI verbosity flags.
///
/// Call once at startup, before any logging happens.
///
/// # Panics
///
/// Panics when called twice; `env_logger` initializes once per process.
pub fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = Builder::new();

    if env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    builder.format(|buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        writeln!(
            buf,
            "{style}{:<5}{style:#} [{}] {}",
            level,
            record.module_path().unwrap_or("rustfind"),
            record.args()
        )
    });

    builder.init();
}

/// Map CLI flags to a level filter.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

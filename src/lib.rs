//! RustFind - Recursive File Search Engine
//!
//! A cross-platform Rust library and CLI for searching files by name mask,
//! attribute/size/date criteria and content (literal or regular expression),
//! and for grouping files into duplicate sets by name, size and content
//! digest. One worker thread per run, cooperative cancellation, throttled
//! result notifications.

pub mod cli;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod options;
pub mod search;
pub mod signal;

pub use cli::run_app;

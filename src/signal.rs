//! Signal handling for graceful shutdown.
//!
//! Centralized Ctrl+C handling. A [`ShutdownHandler`] wraps an `AtomicBool`
//! flag that worker code polls at its cancellation points; wiring it into a
//! [`crate::search::SearchController`] via `with_stop_flag` turns Ctrl+C into
//! a cooperative stop request that preserves partial results.
//!
//! # Usage
//!
//! ```rust,no_run
//! use rustfind::signal::install_handler;
//! use rustfind::search::SearchController;
//!
//! let handler = install_handler().expect("failed to install signal handler");
//! let controller = SearchController::new().with_stop_flag(handler.get_flag());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption: 128 + signal number.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared shutdown flag with convenience accessors.
///
/// `Send + Sync`; clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with the flag cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a shutdown was requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request a shutdown manually.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The underlying flag, for handing to worker code.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag (mainly for tests reusing a handler).
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error installing the signal hook.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The Ctrl+C handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install a process-wide Ctrl+C handler that sets the shutdown flag.
///
/// Safe to call more than once: later calls return the handler installed
/// first (with the flag reset). If another component already owns the signal
/// hook, an unhooked handler is returned so manual shutdown requests still
/// work.
///
/// # Errors
///
/// Currently never fails; the signature leaves room for stricter platforms.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    match ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing up...");
        let _ = std::io::stderr().flush();
        log::info!("shutdown signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_HANDLER.set(handler.clone());
            Ok(handler)
        }
        Err(_) => {
            if let Some(existing) = GLOBAL_HANDLER.get() {
                existing.reset();
                return Ok(existing.clone());
            }
            log::debug!("Ctrl+C handler already registered elsewhere; using unhooked handler");
            let fallback = ShutdownHandler::new();
            let _ = GLOBAL_HANDLER.set(fallback.clone());
            Ok(fallback)
        }
    }
}

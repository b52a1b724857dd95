//! Tracing subscriber setup: human-readable events on stderr plus an optional
//! append-only run log.
//!
//! # Stderr filter priority (highest to lowest)
//!
//! 1. `DTXMEND_LOG` env var (per-target directives, e.g. `dtxmend=debug`)
//! 2. `RUST_LOG` env var
//! 3. CLI flags (`-v` gives debug, `-q` gives error)
//! 4. Default level: `warn`
//!
//! The run log always records `info` and above, whatever the stderr filter.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::Error;

/// Project-specific filter variable, checked before `RUST_LOG`.
const LOG_ENV: &str = "DTXMEND_LOG";

/// Active subscriber for one command. Dropping it uninstalls the subscriber.
pub struct LogSession {
    /// Keeps the subscriber installed for this thread.
    _guard: DefaultGuard,
    /// Run log, shared with the file layer.
    file: Option<Arc<File>>,
}

impl LogSession {
    /// Flush the run log to disk and uninstall the subscriber.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the run log cannot be synced.
    pub fn finish(self) -> Result<(), Error> {
        if let Some(file) = &self.file {
            file.sync_all()?;
        }
        return Ok(());
    }
}

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Default: warnings and above.
    Normal,
    /// `--quiet` / `-q`: only errors.
    Quiet,
    /// `--verbose` / `-v`: debug output.
    Verbose,
}

impl Verbosity {
    /// Map to the stderr level used when no env var overrides it.
    pub const fn default_level(self) -> Level {
        return match self {
            Self::Normal => Level::WARN,
            Self::Quiet => Level::ERROR,
            Self::Verbose => Level::DEBUG,
        };
    }

    /// Verbose wins when both flags are given.
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            return Self::Verbose;
        }
        if quiet {
            return Self::Quiet;
        }
        return Self::Normal;
    }
}

/// Stderr filter from `DTXMEND_LOG`, then `RUST_LOG`, then `verbosity`.
/// Unparseable directives fall through to the next source.
fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV)
        && let Ok(filter) = EnvFilter::try_new(&directives)
    {
        return filter;
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    return EnvFilter::new(verbosity.default_level().as_str());
}

/// Install the subscriber for the current thread.
///
/// When `log_file` is given it is created if missing and appended to, one
/// timestamped line per event, without colour codes.
///
/// # Errors
///
/// Returns `Error::Io` if the run log cannot be opened.
pub fn start(log_file: Option<&Path>, verbosity: Verbosity) -> Result<LogSession, Error> {
    let stderr_is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(stderr_is_tty)
        .with_target(false)
        .without_time()
        .compact()
        .with_filter(build_env_filter(verbosity));

    let file = match log_file {
        None => None,
        Some(path) => Some(Arc::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
    };
    let file_layer = file.as_ref().map(|f| {
        return fmt::layer()
            .with_writer(Arc::clone(f))
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO);
    });

    let guard = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .set_default();

    return Ok(LogSession { _guard: guard, file });
}

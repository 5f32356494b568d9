//! Injectable logging for core subsystems.
//!
//! Subsystems log through an `Arc<dyn Log>` they receive at construction.
//! During bootstrap that handle points at an [`IndirectLog`] whose target
//! starts as [`TracingLog`] (the process's local stderr output) and is
//! swapped exactly once, after the admin server exists, to the admin log so
//! that messages reach admin subscribers. Everyone holding the indirect
//! handle sees the swap.

use std::fmt;
use std::sync::{Arc, RwLock};

/// Log severity, most verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Key material and other secrets
    Keys,
    /// Debugging detail
    Debug,
    /// Normal operation
    Info,
    /// Something unexpected but recoverable
    Warn,
    /// A request or operation failed
    Error,
    /// The process cannot continue
    Critical,
}

impl Level {
    /// Wire name of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Keys => "KEYS",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// Parse a wire name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        [
            Level::Keys,
            Level::Debug,
            Level::Info,
            Level::Warn,
            Level::Error,
            Level::Critical,
        ]
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log sink.
pub trait Log: Send + Sync {
    /// Emit one message.
    fn emit(&self, level: Level, message: &str);

    /// Emit at [`Level::Debug`].
    fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }

    /// Emit at [`Level::Info`].
    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    /// Emit at [`Level::Warn`].
    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    /// Emit at [`Level::Error`].
    fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }
}

/// Forwards to the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl Log for TracingLog {
    fn emit(&self, level: Level, message: &str) {
        match level {
            Level::Keys => tracing::trace!(target: "fcnet::keys", "{message}"),
            Level::Debug => tracing::debug!("{message}"),
            Level::Info => tracing::info!("{message}"),
            Level::Warn => tracing::warn!("{message}"),
            Level::Error => tracing::error!("{message}"),
            Level::Critical => tracing::error!(critical = true, "{message}"),
        }
    }
}

/// A log whose target can be replaced while others hold it.
pub struct IndirectLog {
    target: RwLock<Arc<dyn Log>>,
}

impl IndirectLog {
    /// Wrap an initial target.
    #[must_use]
    pub fn new(target: Arc<dyn Log>) -> Arc<Self> {
        Arc::new(Self {
            target: RwLock::new(target),
        })
    }

    /// Point every holder of this log at a new target.
    pub fn swap(&self, target: Arc<dyn Log>) {
        match self.target.write() {
            Ok(mut guard) => *guard = target,
            Err(poisoned) => *poisoned.into_inner() = target,
        }
    }

    fn current(&self) -> Arc<dyn Log> {
        match self.target.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

impl Log for IndirectLog {
    fn emit(&self, level: Level, message: &str) {
        // Clone out so a target that logs re-entrantly cannot deadlock.
        self.current().emit(level, message);
    }
}

impl fmt::Debug for IndirectLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndirectLog").finish_non_exhaustive()
    }
}

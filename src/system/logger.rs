// src/system/logger.rs

//! # Build Log
//!
//! The user-facing build output. This is separate from the `log` facade used
//! for diagnostics: every line written here is part of the build result.
//!
//! A single [`BuildLog`] is shared by all workers. Each project build obtains
//! its own [`ProjectLogger`] with a distinct id, so interleaved lines from
//! parallel builds stay attributable. Sinks serialize their own writes.

use crate::models::Importance;
use colored::Colorize;
use std::fmt::Debug;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Message(Importance),
    Warning,
    Error,
}

/// How much of the build log reaches a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, clap::ValueEnum)]
pub enum Verbosity {
    /// Warnings and errors only.
    Quiet,
    /// Adds high-importance messages.
    Minimal,
    /// Adds normal-importance messages and target headers.
    #[default]
    Normal,
    /// Everything, including skipped targets and low-importance messages.
    Detailed,
}

impl Verbosity {
    pub fn allows(self, level: LogLevel) -> bool {
        match level {
            LogLevel::Warning | LogLevel::Error => true,
            LogLevel::Message(Importance::High) => self >= Self::Minimal,
            LogLevel::Message(Importance::Normal) => self >= Self::Normal,
            LogLevel::Message(Importance::Low) => self >= Self::Detailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub logger_id: usize,
    pub level: LogLevel,
    pub text: String,
}

/// A destination for build log entries. Implementations must serialize writes.
pub trait LogSink: Send + Sync + Debug {
    fn write(&self, entry: &LogEntry);
}

// --- Console sink ---

#[derive(Debug)]
pub struct ConsoleSink {
    verbosity: Verbosity,
    show_logger_ids: bool,
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new(verbosity: Verbosity, show_logger_ids: bool) -> Self {
        Self {
            verbosity,
            show_logger_ids,
            lock: Mutex::new(()),
        }
    }
}

impl LogSink for ConsoleSink {
    fn write(&self, entry: &LogEntry) {
        if !self.verbosity.allows(entry.level) {
            return;
        }
        let prefix = if self.show_logger_ids {
            format!("{}>", entry.logger_id)
        } else {
            String::new()
        };

        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        // Broken pipes are not worth failing a build over.
        match entry.level {
            LogLevel::Error => {
                let _ = writeln!(
                    std::io::stderr(),
                    "{}{}",
                    prefix,
                    format!("error: {}", entry.text).red().bold()
                );
            }
            LogLevel::Warning => {
                let _ = writeln!(
                    std::io::stderr(),
                    "{}{}",
                    prefix,
                    format!("warning: {}", entry.text).yellow()
                );
            }
            LogLevel::Message(Importance::Low) => {
                let _ = writeln!(std::io::stdout(), "{}{}", prefix, entry.text.dimmed());
            }
            LogLevel::Message(_) => {
                let _ = writeln!(std::io::stdout(), "{}{}", prefix, entry.text);
            }
        }
    }
}

// --- Memory sink ---

/// Records every entry that passes its verbosity filter.
#[derive(Debug)]
pub struct MemorySink {
    verbosity: Verbosity,
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// The recorded text lines, in write order.
    pub fn lines(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.text).collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, entry: &LogEntry) {
        if self.verbosity.allows(entry.level) {
            self.entries
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(entry.clone());
        }
    }
}

// --- Build log and per-project loggers ---

/// The shared, append-only build log.
#[derive(Debug, Default)]
pub struct BuildLog {
    sinks: Vec<Arc<dyn LogSink>>,
    next_logger_id: AtomicUsize,
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl BuildLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Creates a logger with a fresh id. Ids start at 1.
    pub fn create_logger(self: &Arc<Self>) -> ProjectLogger {
        let id = self.next_logger_id.fetch_add(1, Ordering::SeqCst) + 1;
        ProjectLogger {
            log: Arc::clone(self),
            id,
            warnings: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    pub fn total_warnings(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }

    pub fn total_errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    fn dispatch(&self, entry: &LogEntry) {
        for sink in &self.sinks {
            sink.write(entry);
        }
    }
}

/// A leveled writer bound to one logger id, counting its own warnings and errors.
#[derive(Debug)]
pub struct ProjectLogger {
    log: Arc<BuildLog>,
    id: usize,
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl ProjectLogger {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn message(&self, importance: Importance, text: impl Into<String>) {
        self.write(LogLevel::Message(importance), text.into());
    }

    /// Writes each line of `text` as its own entry, prefixed with `indent`.
    pub fn lines(&self, importance: Importance, indent: &str, text: &str) {
        for line in text.lines() {
            self.write(LogLevel::Message(importance), format!("{indent}{line}"));
        }
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        self.log.warnings.fetch_add(1, Ordering::SeqCst);
        self.write(LogLevel::Warning, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.log.errors.fetch_add(1, Ordering::SeqCst);
        self.write(LogLevel::Error, text.into());
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn write(&self, level: LogLevel, text: String) {
        self.log.dispatch(&LogEntry {
            logger_id: self.id,
            level,
            text,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loggers_get_distinct_ids_and_own_counters() {
        let sink = Arc::new(MemorySink::new(Verbosity::Detailed));
        let log = Arc::new(BuildLog::new().with_sink(sink.clone()));
        let first = log.create_logger();
        let second = log.create_logger();
        assert_ne!(first.id(), second.id());

        first.error("boom");
        second.warning("careful");
        second.warning("again");

        assert_eq!(first.error_count(), 1);
        assert!(!second.has_errors());
        assert_eq!(second.warning_count(), 2);
        assert_eq!(log.total_errors(), 1);
        assert_eq!(log.total_warnings(), 2);
        assert_eq!(sink.lines(), vec!["boom", "careful", "again"]);
    }

    #[test]
    fn test_verbosity_filters_low_importance() {
        let sink = Arc::new(MemorySink::new(Verbosity::Normal));
        let log = Arc::new(BuildLog::new().with_sink(sink.clone()));
        let logger = log.create_logger();
        logger.message(Importance::Low, "hidden");
        logger.message(Importance::Normal, "shown");
        logger.lines(Importance::High, "  ", "a\nb");
        assert_eq!(sink.lines(), vec!["shown", "  a", "  b"]);

        assert!(!Verbosity::Quiet.allows(LogLevel::Message(Importance::High)));
        assert!(Verbosity::Quiet.allows(LogLevel::Error));
    }
}

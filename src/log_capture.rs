//! Scan log sinks.
//!
//! Workers report progress ("Recorded: 12 out of: 80") and alerts
//! ("Saturation detected!") through an injected [`ScanLog`] rather than a
//! global logger, so the same orchestration code can feed `tracing`, a UI
//! panel, or a test assertion.

use chrono::{DateTime, Local};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

const MAX_LOG_ENTRIES: usize = 1000;

/// Severity of a scan log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Diagnostic detail
    Debug,
    /// Progress and state changes
    Info,
    /// Recoverable anomalies
    Warn,
    /// Failed operations
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Destination for scan progress and alert messages.
///
/// Implementations must be callable from any worker thread.
pub trait ScanLog: Send + Sync {
    /// Record one message.
    fn log(&self, level: LogLevel, message: &str);

    /// Log at debug level.
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Log at info level.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log at warn level.
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Log at error level.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Forwards scan messages to `tracing` under the `linescan::scan` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl ScanLog for TracingLog {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "linescan::scan", "{message}"),
            LogLevel::Info => tracing::info!(target: "linescan::scan", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "linescan::scan", "{message}"),
            LogLevel::Error => tracing::error!(target: "linescan::scan", "{message}"),
        }
    }
}

/// Represents a single log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Local time the message was recorded
    pub timestamp: DateTime<Local>,
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

/// A thread-safe, fixed-capacity log buffer.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<VecDeque<LogEntry>>>);

impl LogBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the buffer for reading.
    pub fn read(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.0.lock()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.0.lock().clear();
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether the buffer holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Messages at `level`, oldest first.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Count entries whose message contains `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|entry| entry.message.contains(needle))
            .count()
    }

    fn push(&self, level: LogLevel, message: &str) {
        let mut buffer = self.0.lock();
        if buffer.len() >= MAX_LOG_ENTRIES {
            buffer.pop_front();
        }
        buffer.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.to_string(),
        });
    }
}

/// Captures scan messages into a [`LogBuffer`] and forwards them to `tracing`.
#[derive(Clone, Default)]
pub struct CapturingLog {
    buffer: LogBuffer,
}

impl CapturingLog {
    /// Create a collector writing into `buffer`.
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }

    /// Returns a reference to the internal log buffer.
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }
}

impl ScanLog for CapturingLog {
    fn log(&self, level: LogLevel, message: &str) {
        TracingLog.log(level, message);
        self.buffer.push(level, message);
    }
}

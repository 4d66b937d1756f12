use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Routine progress information.
    Info,
    /// Something was skipped or degraded, the run continues.
    Warning,
    /// Something failed, the run continues unless the failure is run-fatal.
    Error,
}

impl LogLevel {
    /// Warnings and errors are the entries kept for the consolidated summary.
    pub fn is_issue(self) -> bool {
        matches!(self, LogLevel::Warning | LogLevel::Error)
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of the run transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Severity of the entry.
    pub level: LogLevel,
    /// Message text, stored verbatim.
    pub message: String,
    /// Time the entry was appended.
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<7} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.message
        )
    }
}

/// Append-only transcript owned by a single mirroring run.
///
/// Clones share the same underlying storage, so the log can be handed to
/// concurrent download tasks and read back by whoever started the run.
/// Every entry is also forwarded to the global `log` facade.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RunLog {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns a copy of it.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        };
        match level {
            LogLevel::Info => crate::mirror_info!("{}", entry.message),
            LogLevel::Warning => crate::mirror_warn!("{}", entry.message),
            LogLevel::Error => crate::mirror_error!("{}", entry.message),
        }
        self.lock().push(entry.clone());
        entry
    }

    /// Appends an info entry.
    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Info, message)
    }

    /// Appends a warning entry.
    pub fn warn(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Warning, message)
    }

    /// Appends an error entry.
    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Error, message)
    }

    /// Snapshot of every entry in append order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Snapshot of all warnings and errors in append order.
    pub fn issues(&self) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|entry| entry.level.is_issue())
            .cloned()
            .collect()
    }

    /// Number of entries recorded at `level`.
    pub fn count(&self, level: LogLevel) -> usize {
        self.lock().iter().filter(|entry| entry.level == level).count()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been logged yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All warnings and errors rendered one per line, ready to be copied out.
    pub fn issues_report(&self) -> String {
        let mut report = String::new();
        for entry in self.issues() {
            report.push_str(&entry.to_string());
            report.push('\n');
        }
        report
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{LogLevel, RunLog};
    use std::thread;

    #[test]
    fn issues_keep_order_and_skip_info() {
        let log = RunLog::new();
        log.info("start");
        log.warn("first warning");
        log.info("progress");
        log.error("broken asset");

        let issues = log.issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].message, "first warning");
        assert_eq!(issues[1].level, LogLevel::Error);
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn repeated_messages_are_not_collapsed() {
        let log = RunLog::new();
        log.warn("same");
        log.warn("same");
        assert_eq!(log.count(LogLevel::Warning), 2);
    }

    #[test]
    fn clones_share_storage_across_threads() {
        let log = RunLog::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = log.clone();
                thread::spawn(move || {
                    for j in 0..25 {
                        log.error(format!("worker {i} entry {j}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.count(LogLevel::Error), 100);
    }

    #[test]
    fn report_has_one_line_per_issue() {
        let log = RunLog::new();
        log.info("not included");
        log.warn("missing font");
        log.error("http status 404");

        let report = log.issues_report();
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("WARNING"));
        assert!(lines[0].ends_with("missing font"));
        assert!(lines[1].ends_with("http status 404"));
    }
}

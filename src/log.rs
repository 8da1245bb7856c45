//! Logging collaborator
//!
//! The store and the delivery client report diagnostics through an
//! injected `EventLog` rather than a process-wide logger. `Tracker::new`
//! wires the single default instance, `TracingLog`.

use std::sync::Mutex;
use tracing::Level;

/// Sink for tracker diagnostics
pub trait EventLog: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Forwards diagnostics to `tracing` under the `a3s_tracker` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn log(&self, level: Level, message: &str) {
        if level == Level::ERROR {
            tracing::error!(target: "a3s_tracker", "{}", message);
        } else if level == Level::WARN {
            tracing::warn!(target: "a3s_tracker", "{}", message);
        } else if level == Level::INFO {
            tracing::info!(target: "a3s_tracker", "{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!(target: "a3s_tracker", "{}", message);
        } else {
            tracing::trace!(target: "a3s_tracker", "{}", message);
        }
    }
}

/// A captured diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
}

/// In-memory log for tests and for hosts that inspect delivery results
///
/// Keeps at most `max_records` entries, dropping the oldest.
pub struct MemoryLog {
    records: Mutex<Vec<LogRecord>>,
    max_records: usize,
}

impl MemoryLog {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            max_records,
        }
    }

    /// Snapshot of captured records, oldest first
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether any record at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl EventLog for MemoryLog {
    fn log(&self, level: Level, message: &str) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(LogRecord {
            level,
            message: message.to_string(),
        });

        if self.max_records > 0 && records.len() > self.max_records {
            let drain_count = records.len() - self.max_records;
            records.drain(..drain_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_captures() {
        let log = MemoryLog::default();
        log.log(Level::DEBUG, "Event dropped");
        log.log(Level::INFO, "Sensor returned 500");

        assert_eq!(log.records().len(), 2);
        assert!(log.contains(Level::INFO, "500"));
        assert!(!log.contains(Level::ERROR, "500"));

        log.clear();
        assert!(log.records().is_empty());
    }

    #[test]
    fn test_memory_log_max_capacity() {
        let log = MemoryLog::new(3);
        for i in 0..5 {
            log.log(Level::DEBUG, &format!("message {}", i));
        }

        let records = log.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message, "message 2");
        assert_eq!(records[2].message, "message 4");
    }

    #[test]
    fn test_tracing_log_accepts_every_level() {
        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
            TracingLog.log(level, "no subscriber installed");
        }
    }
}

//! Per-instance append-only log ring.
//!
//! Each project gets one buffer. It survives Stop so operators can read
//! the last run's logs, and is truncated on every (re)start.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trellis_core::script_abi::LogLevel;
use trellis_modules::InstanceLog;

/// Default ring capacity in lines.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// One captured log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Monotonic sequence number within the current run, starting at 0.
    pub seq: u64,
    /// When the line was appended.
    pub timestamp: DateTime<Utc>,
    /// Severity the script reported.
    pub level: LogLevel,
    /// The line itself.
    pub message: String,
}

struct Inner {
    lines: VecDeque<LogLine>,
    next_seq: u64,
}

/// Append-only bounded log buffer; oldest lines fall off the front.
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                lines: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    /// Drop all lines and reset sequencing. Called on every start.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.lines.clear();
        inner.next_seq = 0;
    }

    /// Lines with `seq >= offset`, at most `limit` of them.
    #[must_use]
    pub fn page(&self, offset: u64, limit: usize) -> Vec<LogLine> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .lines
            .iter()
            .filter(|line| line.seq >= offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// The last `limit` lines.
    #[must_use]
    pub fn tail(&self, limit: usize) -> Vec<LogLine> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = inner.lines.len().saturating_sub(limit);
        inner.lines.iter().skip(skip).cloned().collect()
    }

    /// Number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl InstanceLog for LogBuffer {
    fn append(&self, level: LogLevel, message: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = inner.next_seq;
        inner.next_seq = inner.next_seq.wrapping_add(1);
        inner.lines.push_back(LogLine {
            seq,
            timestamp: Utc::now(),
            level,
            message: message.to_owned(),
        });
        if inner.lines.len() > self.capacity {
            inner.lines.pop_front();
        }
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_are_sequenced() {
        let buffer = LogBuffer::new(10);
        buffer.append(LogLevel::Info, "one");
        buffer.append(LogLevel::Warn, "two");

        let lines = buffer.page(0, 10);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].seq, 0);
        assert_eq!(lines[0].message, "one");
        assert_eq!(lines[1].seq, 1);
        assert_eq!(lines[1].level, LogLevel::Warn);
    }

    #[test]
    fn capacity_drops_oldest_but_keeps_sequence() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.append(LogLevel::Info, &format!("line-{i}"));
        }
        let lines = buffer.page(0, 10);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].seq, 2);
        assert_eq!(lines[2].message, "line-4");
    }

    #[test]
    fn paging_filters_by_offset() {
        let buffer = LogBuffer::new(10);
        for i in 0..6 {
            buffer.append(LogLevel::Info, &format!("line-{i}"));
        }
        let page = buffer.page(4, 10);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].seq, 4);

        let limited = buffer.page(0, 2);
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].seq, 1);
    }

    #[test]
    fn clear_truncates_and_resets() {
        let buffer = LogBuffer::new(10);
        buffer.append(LogLevel::Info, "before");
        buffer.clear();
        assert!(buffer.is_empty());

        buffer.append(LogLevel::Info, "after");
        assert_eq!(buffer.page(0, 10)[0].seq, 0);
    }

    #[test]
    fn tail_returns_most_recent() {
        let buffer = LogBuffer::new(10);
        for i in 0..5 {
            buffer.append(LogLevel::Info, &format!("line-{i}"));
        }
        let tail = buffer.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "line-3");
        assert_eq!(tail[1].message, "line-4");
    }
}

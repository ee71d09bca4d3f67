//! Operator-facing broadcast log
//!
//! Append-only, timestamped, keeps only the most recent lines.

use chrono::Local;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Lines kept for display by default
pub const DEFAULT_LOG_CAPACITY: usize = 80;

pub struct BroadcastLog {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl BroadcastLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Timestamp and append a line, evicting the oldest past capacity.
    /// Returns the stored line.
    pub fn push(&self, message: impl AsRef<str>) -> String {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.as_ref());
        log::info!("[Broadcast] {}", message.as_ref());

        let mut lines = self.lines.lock();
        lines.push_back(line.clone());
        while lines.len() > self.capacity {
            lines.pop_front();
        }
        line
    }

    /// All retained lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BroadcastLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_timestamped() {
        let log = BroadcastLog::default();
        let line = log.push("queue drained");
        assert!(line.starts_with('['));
        assert!(line.ends_with("] queue drained"));
        assert_eq!(log.lines(), vec![line]);
    }

    #[test]
    fn test_capped_to_most_recent() {
        let log = BroadcastLog::new(DEFAULT_LOG_CAPACITY);
        for i in 0..100 {
            log.push(format!("line {}", i));
        }
        let lines = log.lines();
        assert_eq!(lines.len(), 80);
        assert!(lines[0].ends_with("line 20"));
        assert!(lines[79].ends_with("line 99"));
    }
}

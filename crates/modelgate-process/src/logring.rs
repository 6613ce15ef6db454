//! Bounded stdout/stderr ring buffer (spec §4.3 "log-ring buffer"): the
//! last N lines are retained for operator inspection via `GET /logs`;
//! overflow drops the oldest line.

use modelgate_events::LogStream;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RingLine {
    pub stream: LogStream,
    pub line: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

pub struct LogRing {
    capacity: usize,
    lines: Mutex<VecDeque<RingLine>>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn push(&self, stream: LogStream, line: String) {
        let mut buf = self.lines.lock().unwrap();
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(RingLine {
            stream,
            line,
            at: chrono::Utc::now(),
        });
    }

    pub fn snapshot(&self) -> Vec<RingLine> {
        self.lines.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_the_oldest_line() {
        let ring = LogRing::new(2);
        ring.push(LogStream::Stdout, "a".into());
        ring.push(LogStream::Stdout, "b".into());
        ring.push(LogStream::Stdout, "c".into());

        let lines: Vec<String> = ring.snapshot().into_iter().map(|l| l.line).collect();
        assert_eq!(lines, vec!["b".to_string(), "c".to_string()]);
    }
}

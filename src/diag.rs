use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, ViewerError};

// -----------------------------
// Logging
// -----------------------------
pub const DEFAULT_LOG_CAPACITY: usize = 3000;

/// Shared diagnostic log. Cloning hands out another handle to the same buffer.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(256)))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, s: impl Into<String>) {
        let line = format!(
            "{} {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            s.into()
        );
        let mut g = self.inner.lock();
        g.push_back(line);
        while g.len() > self.capacity {
            g.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

// -----------------------------
// Safe call
// -----------------------------

/// Runs `f`, logging and swallowing both returned errors and panics.
///
/// Returns `None` when `f` failed in either way.
pub fn safe_call<T>(logs: &LogBuffer, what: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Some(v),
        Ok(Err(e)) => {
            logs.push(format!("{what}: {e}"));
            None
        }
        Err(payload) => {
            let e = ViewerError::Handler(panic_message(payload.as_ref()));
            logs.push(format!("{what}: panicked: {e}"));
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_drops_oldest_lines() {
        let logs = LogBuffer::with_capacity(3);
        for i in 0..5 {
            logs.push(format!("line {i}"));
        }
        let lines = logs.snapshot();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("line 2"));
        assert!(lines[2].ends_with("line 4"));
    }

    #[test]
    fn clones_share_the_same_buffer() {
        let logs = LogBuffer::default();
        let other = logs.clone();
        other.push("hello");
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn safe_call_passes_through_ok_values() {
        let logs = LogBuffer::default();
        assert_eq!(safe_call(&logs, "ok", || Ok(7)), Some(7));
        assert_eq!(logs.len(), 0);
    }

    #[test]
    fn safe_call_logs_returned_errors() {
        let logs = LogBuffer::default();
        let out: Option<()> = safe_call(&logs, "update", || Err(ViewerError::NotAttached));
        assert!(out.is_none());
        let lines = logs.snapshot();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("update: viewer is not attached"));
    }

    #[test]
    fn safe_call_contains_panics() {
        let logs = LogBuffer::default();
        let out: Option<()> = safe_call(&logs, "tick", || panic!("boom"));
        assert!(out.is_none());
        assert!(logs.snapshot()[0].contains("tick: panicked: boom"));
    }
}

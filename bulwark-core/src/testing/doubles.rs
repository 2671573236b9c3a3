//! Recording collaborators for tests
//!
//! Every collaborator an executor accepts has a double here that records
//! what it was asked to do, so tests can assert on delays, log events,
//! transitions and notices without timers or global subscribers.

use crate::core::{CircuitState, ErrorCategory, ErrorDescriptor};
use crate::monitoring::{CircuitObserver, LogLevel, Metadata, Notice, Notifier, ResilienceLogger};
use crate::resilience::{BoxFuture, JitterSource, Sleeper};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Sleeper that returns immediately and records each requested delay
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.delays.lock().push(duration);
        Box::pin(std::future::ready(()))
    }
}

/// Jitter source that cycles through fixed samples
#[derive(Debug)]
pub struct SequenceJitter {
    samples: Vec<f64>,
    next: AtomicUsize,
}

impl SequenceJitter {
    pub fn new(samples: Vec<f64>) -> Self {
        Self {
            samples,
            next: AtomicUsize::new(0),
        }
    }
}

impl JitterSource for SequenceJitter {
    fn sample(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.samples.len();
        self.samples[index]
    }
}

/// One captured log event
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub category: Option<ErrorCategory>,
    pub metadata: Vec<(&'static str, String)>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Logger that keeps every event in memory
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn at_level(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.level == level)
            .cloned()
            .collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.level == level)
            .count()
    }
}

impl ResilienceLogger for RecordingLogger {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        error: Option<&ErrorDescriptor>,
        metadata: Metadata<'_>,
    ) {
        self.records.lock().push(LogRecord {
            level,
            message: message.to_string(),
            category: error.map(ErrorDescriptor::category),
            metadata: metadata.to_vec(),
        });
    }
}

/// Observer that records transitions and rejections
#[derive(Default)]
pub struct RecordingObserver {
    transitions: Mutex<Vec<(String, CircuitState, CircuitState)>>,
    rejections: AtomicUsize,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions as `(from, to)` pairs, in order
    pub fn transitions(&self) -> Vec<(CircuitState, CircuitState)> {
        self.transitions
            .lock()
            .iter()
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }

    /// Breaker names in transition order
    pub fn breakers(&self) -> Vec<String> {
        self.transitions
            .lock()
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }

    pub fn rejections(&self) -> usize {
        self.rejections.load(Ordering::SeqCst)
    }
}

impl CircuitObserver for RecordingObserver {
    fn on_transition(&self, breaker: &str, from: CircuitState, to: CircuitState) {
        self.transitions
            .lock()
            .push((breaker.to_string(), from, to));
    }

    fn on_rejection(&self, _breaker: &str) {
        self.rejections.fetch_add(1, Ordering::SeqCst);
    }
}

/// Notifier that keeps every notice
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().push(notice.clone());
    }
}

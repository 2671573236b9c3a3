//! Circuit observers and user-facing notices
//!
//! A breaker reports every state transition to its [`CircuitObserver`], in
//! the order the transitions happened. The breaker logs transitions itself,
//! so observers are for anything beyond logging (metrics, alerting).
//! [`Notifier`] is the hook for surfacing failures to users; rendering is
//! left to the application.

use crate::core::{CircuitState, ErrorDescriptor};
use std::sync::Arc;
use std::time::Duration;

/// Receives breaker state changes
pub trait CircuitObserver: Send + Sync {
    fn on_transition(&self, breaker: &str, from: CircuitState, to: CircuitState);

    /// A call was rejected without invoking the operation
    fn on_rejection(&self, _breaker: &str) {}
}

/// Shared handle to an observer
pub type SharedObserver = Arc<dyn CircuitObserver>;

/// Fans out to several observers in order
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<SharedObserver>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: SharedObserver) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl CircuitObserver for ObserverSet {
    fn on_transition(&self, breaker: &str, from: CircuitState, to: CircuitState) {
        for observer in &self.observers {
            observer.on_transition(breaker, from, to);
        }
    }

    fn on_rejection(&self, breaker: &str) {
        for observer in &self.observers {
            observer.on_rejection(breaker);
        }
    }
}

/// Something the user may need to hear about
#[derive(Debug, Clone)]
pub enum Notice {
    /// An operation failed for good
    TerminalFailure {
        operation: String,
        descriptor: ErrorDescriptor,
        attempts: u32,
    },
    /// A breaker refused a call
    CircuitOpen {
        breaker: String,
        retry_after: Duration,
    },
}

/// Hook for user-facing messaging
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Shared handle to a notifier
pub type SharedNotifier = Arc<dyn Notifier>;

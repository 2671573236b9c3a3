//! Error classifier
//!
//! Maps any failure to an [`ErrorDescriptor`]. Total and deterministic: every
//! input gets a descriptor, the same input always gets the same one, and the
//! function never panics.
//!
//! Rules, first match wins:
//!
//! 0. The chain already holds a descriptor (an executor error) - reuse it
//! 1. Transport problem - Network / High / retryable
//! 2. HTTP-style status code - per-code table
//! 3. Category hint on a [`Failure`] - taxonomy defaults
//! 4. Anything else - Unknown / Medium / not retryable

use crate::core::{ErrorCategory, ErrorDescriptor, ErrorSeverity, Failure, ResilienceError};
use std::io;

/// Message fragments that indicate a transport problem
const TRANSPORT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "dns",
    "failed to lookup",
    "name resolution",
    "network",
    "fetch",
    "abort",
    "timed out",
    "timeout",
    "econnrefused",
    "enotfound",
];

enum Prior {
    Descriptor(ErrorDescriptor),
    CircuitOpen,
    Deadline,
}

/// Label a failure
pub fn classify(error: anyhow::Error) -> ErrorDescriptor {
    match prior_classification(&error) {
        Some(Prior::Descriptor(descriptor)) => return descriptor,
        Some(Prior::CircuitOpen) => {
            return ErrorDescriptor::new(
                ErrorCategory::ExternalService,
                ErrorSeverity::High,
                false,
                error,
            )
        }
        Some(Prior::Deadline) => {
            return ErrorDescriptor::new(ErrorCategory::Network, ErrorSeverity::High, true, error)
        }
        None => {}
    }

    let failure = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<Failure>())
        .cloned();
    let status_code = failure.as_ref().and_then(Failure::status_code);
    let hint = failure.as_ref().and_then(Failure::category);

    if is_transport(&error, failure.as_ref()) {
        return ErrorDescriptor::new(ErrorCategory::Network, ErrorSeverity::High, true, error);
    }

    if let Some(code) = status_code {
        if let Some((category, severity, retryable)) = classify_status(code, hint) {
            return ErrorDescriptor::new(category, severity, retryable, error)
                .with_status_code(code);
        }
    }

    if let Some(category) = hint {
        let descriptor = ErrorDescriptor::from_category(category, error);
        return match status_code {
            Some(code) => descriptor.with_status_code(code),
            None => descriptor,
        };
    }

    ErrorDescriptor::new(ErrorCategory::Unknown, ErrorSeverity::Medium, false, error)
}

/// Category, severity and retryability for a status code, if decisive
pub fn classify_status(
    code: u16,
    hint: Option<ErrorCategory>,
) -> Option<(ErrorCategory, ErrorSeverity, bool)> {
    use ErrorCategory::*;

    let label = match code {
        408 => (Network, ErrorSeverity::Medium, true),
        429 => (ExternalService, ErrorSeverity::Medium, true),
        500..=599 => match hint {
            Some(category @ (System | Database)) => (category, ErrorSeverity::Critical, true),
            _ => (ExternalService, ErrorSeverity::High, true),
        },
        400 | 422 => (Validation, ErrorSeverity::Low, false),
        401 => (Authentication, ErrorSeverity::High, false),
        403 => (Authorization, ErrorSeverity::High, false),
        402..=499 => (hint.unwrap_or(BusinessLogic), ErrorSeverity::Low, false),
        _ => return None,
    };
    Some(label)
}

fn prior_classification(error: &anyhow::Error) -> Option<Prior> {
    let resilience = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ResilienceError>())?;

    match resilience {
        ResilienceError::CircuitOpen { .. } => Some(Prior::CircuitOpen),
        ResilienceError::DeadlineExceeded(_) => Some(Prior::Deadline),
        other => other.descriptor().cloned().map(Prior::Descriptor),
    }
}

fn is_transport(error: &anyhow::Error, failure: Option<&Failure>) -> bool {
    if failure.is_some_and(Failure::is_transport) {
        return true;
    }

    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            if is_transport_kind(io_error.kind()) {
                return true;
            }
        }
        if cause.is::<tokio::time::error::Elapsed>() {
            return true;
        }
    }

    // An explicit label is trusted over the wording of its message
    if failure.is_some_and(is_labelled) {
        return false;
    }

    let message = format!("{:#}", error).to_lowercase();
    TRANSPORT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

fn is_labelled(failure: &Failure) -> bool {
    failure.status_code().is_some() || failure.category().is_some() || failure.is_transport()
}

fn is_transport_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::AddrInUse
            | io::ErrorKind::UnexpectedEof
    )
}

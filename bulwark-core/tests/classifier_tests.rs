//! Classifier Tests
//!
//! The public classification contract: labelled failures, I/O errors,
//! context chains, message heuristics, and reclassifying executor errors.

use anyhow::{anyhow, Context};
use bulwark_core::core::{ErrorCategory, ErrorSeverity, Failure, ResilienceError};
use bulwark_core::classify;
use bulwark_core::resilience::classify_status;
use bulwark_core::testing::status_descriptor;
use std::io;
use std::time::Duration;

fn label(error: anyhow::Error) -> (ErrorCategory, ErrorSeverity, bool) {
    let descriptor = classify(error);
    (
        descriptor.category(),
        descriptor.severity(),
        descriptor.is_retryable(),
    )
}

// ============================================================================
// STATUS CODES
// ============================================================================

/// Test: status_code_table
///
/// Verifies the label for each status code family
#[test]
fn test_status_code_table() {
    use ErrorCategory::*;

    let cases = [
        (400, Validation, false),
        (401, Authentication, false),
        (403, Authorization, false),
        (404, BusinessLogic, false),
        (408, Network, true),
        (409, BusinessLogic, false),
        (422, Validation, false),
        (429, ExternalService, true),
        (500, ExternalService, true),
        (502, ExternalService, true),
        (503, ExternalService, true),
        (504, ExternalService, true),
    ];

    for (code, category, retryable) in cases {
        let descriptor = status_descriptor(code);
        assert_eq!(descriptor.category(), category, "status {}", code);
        assert_eq!(descriptor.is_retryable(), retryable, "status {}", code);
        assert_eq!(descriptor.status_code(), Some(code));
    }
}

/// Test: server_error_with_database_hint
///
/// Verifies that a 5xx from a database keeps the hint and is critical
#[test]
fn test_server_error_with_database_hint() {
    let failure = Failure::categorized(ErrorCategory::Database, "replica lag").with_status(503);
    assert_eq!(
        label(failure.into()),
        (ErrorCategory::Database, ErrorSeverity::Critical, true)
    );
}

/// Test: undecided_codes_fall_through
#[test]
fn test_undecided_codes_fall_through() {
    assert_eq!(classify_status(302, None), None);
    assert_eq!(classify_status(200, Some(ErrorCategory::System)), None);

    let descriptor = classify(Failure::status(302, "moved").into());
    assert_eq!(descriptor.category(), ErrorCategory::Unknown);
    assert!(!descriptor.is_retryable());
    assert_eq!(descriptor.status_code(), None);

    let hinted = Failure::categorized(ErrorCategory::System, "redirect loop").with_status(310);
    let hinted = classify(hinted.into());
    assert_eq!(hinted.category(), ErrorCategory::System);
    assert!(hinted.is_retryable());
    assert_eq!(hinted.status_code(), Some(310));
}

// ============================================================================
// TRANSPORT
// ============================================================================

/// Test: io_errors_are_network
///
/// Verifies that connection-level I/O errors are retryable network failures
/// and other I/O errors are not
#[test]
fn test_io_errors_are_network() {
    for kind in [
        io::ErrorKind::ConnectionRefused,
        io::ErrorKind::ConnectionReset,
        io::ErrorKind::TimedOut,
        io::ErrorKind::BrokenPipe,
    ] {
        assert_eq!(
            label(io::Error::new(kind, "socket").into()),
            (ErrorCategory::Network, ErrorSeverity::High, true),
            "{:?}",
            kind
        );
    }

    let denied = classify(io::Error::new(io::ErrorKind::PermissionDenied, "no access").into());
    assert_eq!(denied.category(), ErrorCategory::Unknown);
}

/// Test: context_chain_is_searched
///
/// Verifies that a labelled failure is found under layers of context
#[test]
fn test_context_chain_is_searched() {
    let result: anyhow::Result<()> = Err(Failure::status(403, "forbidden").into());
    let error = result
        .context("loading account")
        .context("rendering dashboard")
        .unwrap_err();

    let descriptor = classify(error);
    assert_eq!(descriptor.category(), ErrorCategory::Authorization);
    assert_eq!(descriptor.message(), "rendering dashboard");
}

/// Test: message_heuristics
///
/// Verifies that plain errors mentioning transport problems are network
/// failures, while labelled failures are trusted over their wording
#[test]
fn test_message_heuristics() {
    assert_eq!(
        label(anyhow!("getaddrinfo ENOTFOUND api.example.com")).0,
        ErrorCategory::Network
    );
    assert_eq!(label(anyhow!("request timed out")).0, ErrorCategory::Network);
    assert_eq!(
        label(Failure::new("Network request failed").into()).0,
        ErrorCategory::Network
    );
    assert_eq!(
        label(Failure::status(400, "network id is invalid").into()).0,
        ErrorCategory::Validation
    );
    assert_eq!(
        label(anyhow!("something odd happened")),
        (ErrorCategory::Unknown, ErrorSeverity::Medium, false)
    );
}

/// Test: elapsed_timer_is_network
#[tokio::test]
async fn test_elapsed_timer_is_network() {
    let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
        .await
        .unwrap_err();
    assert_eq!(label(elapsed.into()).0, ErrorCategory::Network);
}

// ============================================================================
// RECLASSIFICATION
// ============================================================================

/// Test: executor_errors_keep_their_label
///
/// Verifies that classifying an executor error returns the descriptor it
/// already carries
#[test]
fn test_executor_errors_keep_their_label() {
    let inner = status_descriptor(429);
    let exhausted = ResilienceError::Exhausted {
        descriptor: inner.clone(),
        attempts: 4,
    };

    let again = classify(anyhow::Error::from(exhausted).context("syncing orders"));
    assert_eq!(again.category(), inner.category());
    assert_eq!(again.severity(), inner.severity());
    assert_eq!(again.is_retryable(), inner.is_retryable());
    assert_eq!(again.status_code(), Some(429));
}

/// Test: circuit_open_and_deadline
#[test]
fn test_circuit_open_and_deadline() {
    let open = ResilienceError::CircuitOpen {
        name: "orders".to_string(),
        retry_after: Duration::from_secs(3),
    };
    assert_eq!(
        label(open.into()),
        (ErrorCategory::ExternalService, ErrorSeverity::High, false)
    );

    let deadline = ResilienceError::DeadlineExceeded(Duration::from_secs(1));
    assert_eq!(
        label(deadline.into()),
        (ErrorCategory::Network, ErrorSeverity::High, true)
    );
}

/// Test: classification_is_deterministic
#[test]
fn test_classification_is_deterministic() {
    let make = || -> anyhow::Error { Failure::categorized(ErrorCategory::ExternalService, "quota").into() };
    assert_eq!(label(make()), label(make()));
}

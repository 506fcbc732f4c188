//! Shutdown, cleanup orchestration, and completion-signal tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_gateway::{Config, DebugModeOptions, WebhookServer, config};

use crate::mocks::{MockRuntime, RecordingDeleter, RecordingHandlers, build_server, capture_logs};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn runtime(going_down: bool) -> MockRuntime {
    MockRuntime {
        live: true,
        ready: true,
        going_down,
    }
}

fn server(going_down: bool, deleter: Arc<RecordingDeleter>) -> WebhookServer {
    build_server(
        Config::default(),
        DebugModeOptions::default(),
        runtime(going_down),
        RecordingHandlers::new(),
        deleter,
    )
}

/// Every name in the fixed deletable set, in registration order.
fn registered_object_names() -> Vec<&'static str> {
    vec![
        config::INIT_LEASE,
        config::HEALTH_LEASE,
        config::RESOURCE_VALIDATING_WEBHOOK_CONFIG,
        config::POLICY_VALIDATING_WEBHOOK_CONFIG,
        config::RESOURCE_MUTATING_WEBHOOK_CONFIG,
        config::POLICY_MUTATING_WEBHOOK_CONFIG,
        config::VERIFY_MUTATING_WEBHOOK_CONFIG,
    ]
}

#[tokio::test]
async fn test_transient_shutdown_skips_deletions() {
    let deleter = RecordingDeleter::new();
    let server = server(false, deleter.clone());
    let signal = server.cleanup_signal();

    server.stop(STOP_TIMEOUT).await;

    assert!(deleter.calls().is_empty());
    assert!(signal.is_complete());
}

#[tokio::test]
async fn test_permanent_shutdown_deletes_all_registered_objects() {
    let (logs, _guard) = capture_logs();
    let deleter = Arc::new(RecordingDeleter {
        not_found: true,
        ..Default::default()
    });
    let server = server(true, deleter.clone());
    let signal = server.cleanup_signal();

    server.stop(STOP_TIMEOUT).await;

    // All 7 deletions attempted; not-found outcomes count as success and
    // are never reported at error level.
    assert_eq!(deleter.calls(), registered_object_names());
    assert!(signal.is_complete());
    assert!(!logs.contents().contains("ERROR"));
}

#[tokio::test]
async fn test_failed_deletion_does_not_abort_siblings() {
    let (logs, _guard) = capture_logs();
    let deleter = Arc::new(RecordingDeleter {
        fail_on: Some(config::INIT_LEASE.to_string()),
        ..Default::default()
    });
    let server = server(true, deleter.clone());
    let signal = server.cleanup_signal();

    server.stop(STOP_TIMEOUT).await;

    assert_eq!(deleter.calls(), registered_object_names());
    assert!(signal.is_complete());
    // The one genuine failure is surfaced at error level.
    assert!(logs.contents().contains("ERROR"));
    assert!(
        logs.contents()
            .contains("failed to clean up registered object")
    );
}

#[tokio::test]
async fn test_cleanup_deadline_skips_remaining_deletions() {
    let deleter = Arc::new(RecordingDeleter {
        delay: Some(Duration::from_secs(5)),
        ..Default::default()
    });
    let server = server(true, deleter.clone());
    let signal = server.cleanup_signal();

    server.stop(Duration::from_millis(50)).await;

    // The first deletion outlived the deadline; its siblings were skipped,
    // and the completion signal still closed.
    assert!(deleter.calls().len() < 7);
    assert!(signal.is_complete());
}

#[tokio::test]
async fn test_repeated_stop_is_a_no_op() {
    let deleter = RecordingDeleter::new();
    let server = server(true, deleter.clone());

    server.stop(STOP_TIMEOUT).await;
    server.stop(STOP_TIMEOUT).await;

    // Cleanup ran exactly once.
    assert_eq!(deleter.calls().len(), 7);
    assert!(server.cleanup_signal().is_complete());
}

#[tokio::test]
async fn test_cleanup_accessor_does_not_trigger_cleanup() {
    let deleter = RecordingDeleter::new();
    let server = server(true, deleter.clone());

    let signal = server.cleanup_signal();
    assert!(!signal.is_complete());
    assert!(deleter.calls().is_empty());
}

#[tokio::test]
async fn test_waiters_unblock_when_stop_completes() {
    let deleter = RecordingDeleter::new();
    let server = Arc::new(server(false, deleter));
    let signal = server.cleanup_signal();

    let waiter = tokio::spawn(signal.wait());
    server.stop(STOP_TIMEOUT).await;
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("cleanup signal never closed")
        .unwrap();
}

#[tokio::test]
async fn test_run_then_stop_shuts_the_listener_down() {
    let deleter = RecordingDeleter::new();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = build_server(
        Config {
            addr,
            ..Default::default()
        },
        DebugModeOptions::default(),
        runtime(false),
        RecordingHandlers::new(),
        deleter.clone(),
    );

    server.run().await;
    // Stop must return once the listener task has finished.
    tokio::time::timeout(STOP_TIMEOUT, server.stop(STOP_TIMEOUT))
        .await
        .expect("stop did not complete in time");

    assert!(server.cleanup_signal().is_complete());
    assert!(deleter.calls().is_empty());
}

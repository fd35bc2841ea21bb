//! End-to-end workflow tests against the mock sensor.
//!
//! Timing-sensitive tests run on a paused Tokio clock, so the 100 ms polls
//! and the 2 s settle delay cost nothing in wall time.

mod common;

use common::{assert_balanced, finger, preload, present_twice, scanner, scanner_with, session};
use ridgeline_biometric::{
    CaptureCoordinator, CollectingReporter, EnrollmentWorkflow, FingerprintScanner,
    IdentificationWorkflow, Operation, OperationOutcome, OutcomePayload, PortLocks,
};
use ridgeline_core::{Disposition, Error, ErrorKind, SearchOutcome};
use ridgeline_hardware::mock::{MockCall, MockConnector};
use ridgeline_hardware::{DriverCapabilities, SearchHit};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const NO_CROSS_MATCH: DriverCapabilities = DriverCapabilities {
    cross_match: false,
    template_count: true,
};

// Capture

#[tokio::test(start_paused = true)]
async fn test_capture_ready_on_first_poll() {
    let (mut session, handle) = session().await;
    handle.present_finger(finger(1));
    let started = Instant::now();

    let result = CaptureCoordinator::default()
        .capture(&mut session, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.polls, 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_capture_times_out_after_deadline() {
    let (mut session, handle) = session().await;
    let started = Instant::now();

    let error = CaptureCoordinator::default()
        .capture(&mut session, Duration::from_secs(1))
        .await
        .unwrap_err();

    let elapsed = started.elapsed();
    assert!(matches!(error, Error::CaptureTimeout { timeout_ms: 1_000 }));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed <= Duration::from_millis(1_100));
    assert_eq!(handle.call_count(MockCall::ReadImage), 11);
}

#[tokio::test(start_paused = true)]
async fn test_capture_timeout_is_retryable() {
    let (scanner, handle) = scanner();

    let error = scanner.capture(Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(error.disposition(), Disposition::ClientRetryable);
    assert_balanced(&handle);
}

// Enrollment

#[tokio::test(start_paused = true)]
async fn test_enroll_mismatch_never_stores() {
    let (scanner, handle) = scanner();
    handle.present_finger(finger(1));
    handle.present_finger(finger(2));

    let error = scanner.enroll(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(error, Error::EnrollmentMismatch));
    assert!(handle.store_attempts().is_empty());
    assert_eq!(handle.call_count(MockCall::CreateTemplate), 0);
    assert_balanced(&handle);
}

#[tokio::test(start_paused = true)]
async fn test_enroll_uses_template_count() {
    let (scanner, handle) = scanner();
    preload(&handle, 0..5);
    present_twice(&handle, finger(9));

    let enrollment = scanner.enroll(Duration::from_secs(5)).await.unwrap();

    assert_eq!(enrollment.slot, 5);
    assert!(!enrollment.verification_skipped);
    assert!(enrollment.match_score.unwrap() > 0);
    assert_eq!(handle.store_attempts(), vec![5]);
    assert_eq!(handle.template_at(5), Some(finger(9)));
    assert_balanced(&handle);
}

#[tokio::test(start_paused = true)]
async fn test_enroll_falls_back_to_next_slot() {
    let (scanner, handle) = scanner();
    preload(&handle, 0..5);
    handle.reject_store(5);
    present_twice(&handle, finger(9));

    let enrollment = scanner.enroll(Duration::from_secs(5)).await.unwrap();

    assert_eq!(enrollment.slot, 6);
    assert_eq!(handle.store_attempts(), vec![5, 6]);
}

#[tokio::test(start_paused = true)]
async fn test_enroll_last_resort_slot_zero() {
    let (scanner, handle) = scanner();
    preload(&handle, 0..5);
    handle.reject_store(5);
    handle.reject_store(6);
    present_twice(&handle, finger(9));

    let enrollment = scanner.enroll(Duration::from_secs(5)).await.unwrap();

    assert_eq!(enrollment.slot, 0);
    assert_eq!(handle.store_attempts(), vec![5, 6, 0]);
    // Slot 0 is overwritten without a check.
    assert_eq!(handle.template_at(0), Some(finger(9)));
}

#[tokio::test(start_paused = true)]
async fn test_enroll_store_exhausted() {
    let (scanner, handle) = scanner();
    preload(&handle, 0..5);
    for slot in [5, 6, 0] {
        handle.reject_store(slot);
    }
    present_twice(&handle, finger(9));

    let error = scanner.enroll(Duration::from_secs(5)).await.unwrap_err();

    match error {
        Error::EnrollmentStoreFailed { attempted } => assert_eq!(attempted, vec![5, 6, 0]),
        other => panic!("unexpected error: {other}"),
    }
    assert_balanced(&handle);
}

#[tokio::test(start_paused = true)]
async fn test_enroll_without_slot_zero_fallback() {
    let (scanner, handle) = scanner_with(common::scanner_config().with_slot_zero_fallback(false));
    preload(&handle, 0..5);
    handle.reject_store(5);
    handle.reject_store(6);
    present_twice(&handle, finger(9));

    let error = scanner.enroll(Duration::from_secs(5)).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::EnrollmentStoreFailed);
    assert_eq!(handle.store_attempts(), vec![5, 6]);
    assert!(handle.template_at(0).is_some_and(|t| t != finger(9)));
}

#[tokio::test(start_paused = true)]
async fn test_enroll_flags_skipped_verification() {
    let (scanner, handle) = scanner();
    handle.set_capabilities(NO_CROSS_MATCH);
    handle.present_finger(finger(1));
    handle.present_finger(finger(2));

    let enrollment = scanner.enroll(Duration::from_secs(5)).await.unwrap();

    assert!(enrollment.verification_skipped);
    assert_eq!(enrollment.match_score, None);
    assert_eq!(handle.call_count(MockCall::CompareCharacteristics), 0);
}

#[tokio::test(start_paused = true)]
async fn test_enroll_probes_when_count_fails() {
    let (scanner, handle) = scanner();
    preload(&handle, [0, 1, 2, 4]);
    handle.fail_template_count(true);
    present_twice(&handle, finger(9));

    let enrollment = scanner.enroll(Duration::from_secs(5)).await.unwrap();

    assert_eq!(enrollment.slot, 3);
    assert_eq!(handle.template_at(3), Some(finger(9)));
}

#[tokio::test(start_paused = true)]
async fn test_enroll_settles_between_captures() {
    let (scanner, handle) = scanner();
    present_twice(&handle, finger(4));
    let started = Instant::now();

    scanner.enroll(Duration::from_secs(5)).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_enroll_second_capture_timeout() {
    let (scanner, handle) = scanner();
    handle.present_finger(finger(4));

    let error = scanner.enroll(Duration::from_secs(1)).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::CaptureTimeout);
    assert!(handle.store_attempts().is_empty());
    assert_balanced(&handle);
}

#[tokio::test(start_paused = true)]
async fn test_enroll_releases_buffers_on_failure() {
    let (mut session, handle) = session().await;
    handle.present_finger(finger(1));
    handle.present_finger(finger(2));

    let error = EnrollmentWorkflow::default()
        .run(&mut session, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::EnrollmentMismatch);
    assert!(session.loaded_buffers().is_empty());
    assert!(session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_enroll_connect_failure() {
    let (connector, handle) = MockConnector::new();
    handle.set_password(0xDEAD_BEEF);

    let error = EnrollmentWorkflow::default()
        .enroll(&connector, ridgeline_core::SensorConfig::new(common::PORT), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AuthenticationFailed);
    assert_eq!(handle.call_count(MockCall::ReadImage), 0);
    assert_balanced(&handle);
}

// Identification

#[tokio::test(start_paused = true)]
async fn test_search_sentinel_is_not_found() {
    let (scanner, handle) = scanner();
    handle.set_search_result(Some(SearchHit::no_match()));
    handle.present_finger(finger(3));

    let outcome = scanner.search(Duration::from_secs(5)).await.unwrap();

    assert_eq!(outcome, SearchOutcome::NotFound);
    assert_balanced(&handle);
}

#[tokio::test(start_paused = true)]
async fn test_search_finds_enrolled_finger() {
    let (scanner, handle) = scanner();
    preload(&handle, 0..3);
    present_twice(&handle, finger(8));
    let enrollment = scanner.enroll(Duration::from_secs(5)).await.unwrap();

    handle.present_finger(finger(8));
    let outcome = scanner.search(Duration::from_secs(5)).await.unwrap();

    assert_eq!(outcome.slot(), Some(enrollment.slot));
}

#[tokio::test(start_paused = true)]
async fn test_search_zero_score_is_device_error() {
    let (mut session, handle) = session().await;
    handle.set_search_result(Some(SearchHit::new(2, 0)));
    handle.present_finger(finger(3));

    let error = IdentificationWorkflow::default()
        .run(&mut session, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::DeviceError);
    assert!(session.loaded_buffers().is_empty());
}

// Maintenance through the facade

#[tokio::test]
async fn test_status_and_report() {
    let (scanner, handle) = scanner();
    preload(&handle, [0, 7, 3]);

    assert_eq!(scanner.status().await.unwrap(), 3);
    let report = scanner.report().await.unwrap();
    assert_eq!(report.occupied, vec![0, 3, 7]);
    assert_eq!(scanner.list_occupied().await.unwrap(), vec![0, 3, 7]);
    assert_balanced(&handle);
}

#[tokio::test]
async fn test_delete_and_clear() {
    let (scanner, handle) = scanner();
    preload(&handle, [1, 2]);

    scanner.delete_slot(1).await.unwrap();
    assert_eq!(scanner.delete_slot(1).await.unwrap_err().kind(), ErrorKind::SlotNotFound);
    assert_eq!(
        scanner.delete_slot(1).await.unwrap_err().disposition(),
        Disposition::ClientCorrectable
    );

    assert_eq!(scanner.clear_all().await.unwrap(), Some(1));
    assert_eq!(scanner.clear_all().await.unwrap(), Some(0));
    assert_eq!(handle.call_count(MockCall::ClearDatabase), 1);
    assert_balanced(&handle);
}

#[tokio::test]
async fn test_clear_and_report_without_template_count() {
    let (scanner, handle) = scanner();
    handle.set_capabilities(DriverCapabilities {
        cross_match: true,
        template_count: false,
    });
    preload(&handle, [0, 1]);

    let report = scanner.report().await.unwrap();
    assert_eq!(report.template_count, None);
    assert_eq!(report.occupied, vec![0, 1]);

    assert_eq!(scanner.clear_all().await.unwrap(), None);
    assert!(handle.occupied_slots().is_empty());
    assert_balanced(&handle);
}

#[tokio::test]
async fn test_refused_clear_is_reported_as_device_error() {
    let (scanner, handle) = scanner();
    let reporter = Arc::new(CollectingReporter::new());
    let scanner = scanner.with_reporter(reporter.clone());
    preload(&handle, [0, 1]);
    handle.fail_clear(true);

    let error = scanner.clear_all().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::DeviceError);
    assert_eq!(handle.occupied_slots(), vec![0, 1]);
    let last = reporter.last().unwrap();
    assert_eq!(last.operation, Operation::ClearAll);
    assert!(!last.outcome.is_success());
    assert_balanced(&handle);
}

#[tokio::test]
async fn test_unavailable_sensor() {
    let (scanner, handle) = scanner();
    handle.set_available(false);

    let error = scanner.status().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::HardwareUnavailable);
    assert_eq!(error.disposition(), Disposition::ServiceUnavailable);
}

#[tokio::test(start_paused = true)]
async fn test_search_range_follows_allocation_capacity() {
    let (scanner, handle) = scanner();
    handle.set_capacity(200);
    handle.preload(3, finger(1));
    handle.present_finger(finger(1));

    let error = scanner.search(Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::DeviceError);

    let (scanner, handle) = scanner_with(common::scanner_config().with_allocation_capacity(200));
    handle.set_capacity(200);
    handle.preload(3, finger(1));
    handle.present_finger(finger(1));

    let outcome = scanner.search(Duration::from_secs(1)).await.unwrap();
    assert!(matches!(outcome, SearchOutcome::Found { slot: 3, .. }));
    assert_balanced(&handle);
}

// Facade

#[tokio::test(start_paused = true)]
async fn test_reporter_sees_every_outcome() {
    let reporter = Arc::new(CollectingReporter::new());
    let (scanner, handle) = scanner();
    let scanner = scanner.with_reporter(reporter.clone());
    handle.set_search_result(Some(SearchHit::no_match()));
    handle.present_finger(finger(1));

    scanner.search(Duration::from_secs(1)).await.unwrap();
    scanner.search(Duration::from_secs(1)).await.unwrap_err();

    let reports = reporter.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].operation, Operation::Search);
    assert_eq!(
        reports[0].outcome,
        OperationOutcome::Succeeded {
            payload: OutcomePayload::Search(SearchOutcome::NotFound)
        }
    );
    assert!(matches!(
        reports[1].outcome,
        OperationOutcome::Failed {
            kind: ErrorKind::CaptureTimeout,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_same_port_operations_are_serialized() {
    let locks = PortLocks::new();
    let (connector, handle) = MockConnector::new();
    handle.set_latency(Duration::from_millis(50));
    preload(&handle, 0..3);

    let first = FingerprintScanner::new(common::scanner_config(), connector.clone())
        .with_port_locks(locks.clone());
    let second = FingerprintScanner::new(common::scanner_config(), connector)
        .with_port_locks(locks);

    let (a, b) = tokio::join!(first.status(), second.status());
    assert_eq!((a.unwrap(), b.unwrap()), (3, 3));

    // Never two sessions open at once: each open is closed before the next.
    let calls = handle.calls();
    let closes: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| **call == MockCall::Close)
        .map(|(i, _)| i)
        .collect();
    let handshakes: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| **call == MockCall::VerifyPassword)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(handshakes.len(), 2);
    assert!(closes[0] < handshakes[1]);
    assert_balanced(&handle);
}

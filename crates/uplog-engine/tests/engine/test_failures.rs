//! Failure classification as seen from disk and queue

use uplog_core::domain::{ReportKind, SessionState};
use uplog_core::ports::TransferError;

use crate::common::{self, allowed, pending_is, status_reaches, Fixture, ScriptedTransport};

#[tokio::test]
async fn test_transient_failure_keeps_report_at_head() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    let a = fixture.write_report("a.bin", 1);
    let b = fixture.write_report("b.bin", 1);
    let transport =
        ScriptedTransport::scripted(vec![Err(TransferError::Connection("timed out".into()))]);

    let handle = fixture.start(transport.clone());
    status_reaches(&handle, "suspended after timeout", |s| {
        s.state == SessionState::Suspended && !s.is_uploading
    })
    .await;
    pending_is(&handle, &["a.bin", "b.bin"]).await;
    assert!(a.exists());
    assert!(b.exists());
    assert_eq!(transport.uploads(), vec!["a.bin"]);

    // No timer: nothing happens until the next trigger
    common::settle().await;
    assert_eq!(transport.uploads(), vec!["a.bin"]);

    // A queue mutation retries the same head first
    let c = fixture.write_report("c.bin", 1);
    handle.report_ready(&c).await;
    status_reaches(&handle, "drained", |s| s.state == SessionState::Idle).await;
    assert_eq!(transport.uploads(), vec!["a.bin", "a.bin", "b.bin", "c.bin"]);

    handle.stop().await;
}

#[tokio::test]
async fn test_transient_failure_retried_on_reconnect() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    fixture.write_report("a.bin", 1);
    fixture.write_report("b.bin", 1);
    let transport =
        ScriptedTransport::scripted(vec![Err(TransferError::ServerUnavailable { status: 503 })]);

    let handle = fixture.start(transport.clone());
    status_reaches(&handle, "suspended", |s| s.state == SessionState::Suspended).await;

    fixture.connectivity.set(false);
    common::settle().await;
    fixture.connectivity.set(true);

    status_reaches(&handle, "drained", |s| s.state == SessionState::Idle).await;
    assert_eq!(transport.uploads(), vec!["a.bin", "a.bin", "b.bin"]);

    handle.stop().await;
}

#[tokio::test]
async fn test_connectivity_loss_cancels_in_flight_transfer() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    let a = fixture.write_report("a.bin", 1);
    let transport = ScriptedTransport::hanging();

    let handle = fixture.start(transport.clone());
    common::eventually("transfer started", || transport.active() == 1).await;

    fixture.connectivity.set(false);
    status_reaches(&handle, "suspended after cancel", |s| {
        s.state == SessionState::Suspended && !s.is_uploading && s.pending_count == 1
    })
    .await;
    assert_eq!(transport.active(), 0);
    assert!(a.exists());

    handle.stop().await;
}

#[tokio::test]
async fn test_permanent_failure_skips_report() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    let a = fixture.write_report("a.bin", 1);
    let b = fixture.write_report("b.bin", 1);
    let c = fixture.write_report("c.bin", 1);
    let transport =
        ScriptedTransport::scripted(vec![Err(TransferError::RejectedReport { status: 415 })]);

    let handle = fixture.start(transport.clone());
    status_reaches(&handle, "drained", |s| s.state == SessionState::Idle && s.pending_count == 0)
        .await;
    common::eventually("all deleted", || !a.exists() && !b.exists() && !c.exists()).await;
    assert_eq!(transport.uploads(), vec!["a.bin", "b.bin", "c.bin"]);

    handle.stop().await;
}

#[tokio::test]
async fn test_unreadable_report_is_dropped() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    let a = fixture.write_report("a.bin", 1);
    let b = fixture.write_report("b.bin", 1);
    let transport =
        ScriptedTransport::scripted(vec![Err(TransferError::Unreadable("permission denied".into()))]);

    let handle = fixture.start(transport.clone());
    common::eventually("all deleted", || !a.exists() && !b.exists()).await;
    assert_eq!(transport.uploads(), vec!["a.bin", "b.bin"]);

    handle.stop().await;
}

#[tokio::test]
async fn test_rejected_request_deletes_and_stops() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    let a = fixture.write_report("a.bin", 1);
    let b = fixture.write_report("b.bin", 1);
    let transport =
        ScriptedTransport::scripted(vec![Err(TransferError::BadRequest { status: 400 })]);

    let handle = fixture.start(transport.clone());
    common::eventually("rejected report deleted", || !a.exists()).await;
    status_reaches(&handle, "suspended", |s| {
        s.state == SessionState::Suspended && s.pending_count == 1
    })
    .await;

    common::settle().await;
    assert!(b.exists());
    assert_eq!(transport.uploads(), vec!["a.bin"]);

    handle.stop().await;
}

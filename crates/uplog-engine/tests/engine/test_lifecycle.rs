//! Engine lifecycle: quota, collection, ordering and the happy path

use std::time::Duration;

use uplog_core::domain::{ConsentState, ReportKind, SessionState};

use crate::common::{
    self, allowed, denied, pending_is, status_reaches, Fixture, ScriptedTransport,
};

#[tokio::test]
async fn test_uploads_collected_reports_and_deletes_them() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    let a = fixture.write_report("a.bin", 10);
    let b = fixture.write_report("b.bin", 20);
    let transport = ScriptedTransport::succeeding();

    let handle = fixture.start(transport.clone());

    common::eventually("both files deleted", || !a.exists() && !b.exists()).await;
    status_reaches(&handle, "idle and empty", |s| {
        s.state == SessionState::Idle && s.pending_count == 0 && !s.is_uploading
    })
    .await;
    assert_eq!(transport.uploads(), vec!["a.bin", "b.bin"]);

    handle.stop().await;
}

#[tokio::test]
async fn test_quota_trims_oldest_before_collection() {
    let mut fixture = Fixture::new(ReportKind::BlackBox, false, allowed());
    for name in ["1", "2", "3", "4"] {
        fixture.write_report(name, 100);
    }
    fixture.settings.quota_bytes = Some(250);

    let engine = fixture.engine(ScriptedTransport::succeeding());
    let outcome = engine.quota_outcome().expect("quota ran");
    assert_eq!(outcome.evicted, 2);
    assert_eq!(outcome.remaining_bytes, 200);
    assert!(!fixture.root().join("1").exists());
    assert!(!fixture.root().join("2").exists());

    let handle = engine.start();
    pending_is(&handle, &["3", "4"]).await;
    handle.stop().await;
}

#[tokio::test]
async fn test_quota_never_touches_work_dir() {
    let mut fixture = Fixture::new(ReportKind::FlightLog, false, allowed());
    let in_work = fixture.write_work_report("big.bin", 1000);
    fixture.write_report("small.bin", 10);
    fixture.settings.quota_bytes = Some(100);

    let handle = fixture.start(ScriptedTransport::succeeding());
    pending_is(&handle, &["big.bin", "small.bin"]).await;
    assert!(in_work.exists());
    handle.stop().await;
}

#[tokio::test]
async fn test_live_notification_after_sweep_is_appended() {
    let fixture = Fixture::new(ReportKind::FlightLog, false, allowed());
    fixture.write_report("a.bin", 1);
    fixture.write_report("b.bin", 1);

    let handle = fixture.start(ScriptedTransport::succeeding());
    pending_is(&handle, &["a.bin", "b.bin"]).await;

    let x = fixture.write_work_report("x.bin", 1);
    handle.report_ready(&x).await;
    pending_is(&handle, &["a.bin", "b.bin", "x.bin"]).await;

    handle.stop().await;
}

#[tokio::test]
async fn test_duplicate_notification_is_ignored() {
    let fixture = Fixture::new(ReportKind::GutmaLog, false, allowed());
    let handle = fixture.start(ScriptedTransport::succeeding());
    pending_is(&handle, &[]).await;

    let x = fixture.write_report("x.gutma", 1);
    handle.report_ready(&x).await;
    handle.report_ready(&x).await;
    pending_is(&handle, &["x.gutma"]).await;
    assert_eq!(handle.status().pending_count, 1);

    handle.stop().await;
}

#[tokio::test]
async fn test_foreign_notifications_are_ignored() {
    let fixture = Fixture::new(ReportKind::FlightLog, false, allowed());
    let handle = fixture.start(ScriptedTransport::succeeding());

    let wrong_kind = fixture.write_report("notes.txt", 1);
    let in_progress = fixture.write_work_report("x.bin.tmp", 1);
    handle.report_ready(&wrong_kind).await;
    handle.report_ready(&in_progress).await;
    handle.report_ready(fixture.root().join("missing.bin")).await;

    common::settle().await;
    pending_is(&handle, &[]).await;
    handle.stop().await;
}

#[tokio::test]
async fn test_uploads_start_when_connectivity_is_regained() {
    let fixture = Fixture::new(ReportKind::FlightLog, false, allowed());
    let a = fixture.write_report("a.bin", 1);
    let transport = ScriptedTransport::succeeding();

    let handle = fixture.start(transport.clone());
    pending_is(&handle, &["a.bin"]).await;
    assert_eq!(handle.status().state, SessionState::Suspended);
    assert!(transport.uploads().is_empty());

    fixture.connectivity.set(true);
    common::eventually("a uploaded", || !a.exists()).await;
    assert_eq!(transport.uploads(), vec!["a.bin"]);

    handle.stop().await;
}

#[tokio::test]
async fn test_single_transfer_in_flight() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    for i in 0..5 {
        fixture.write_report(&format!("r{i}.bin"), 1);
    }
    let transport = ScriptedTransport::slow(Duration::from_millis(30));

    let handle = fixture.start(transport.clone());
    // Notifications while uploading must not start a second transfer
    let late = fixture.write_report("late.bin", 1);
    handle.report_ready(&late).await;

    status_reaches(&handle, "queue drained", |s| s.state == SessionState::Idle && s.pending_count == 0)
        .await;
    assert_eq!(transport.uploads().len(), 6);
    assert_eq!(transport.max_concurrent(), 1);

    handle.stop().await;
}

#[tokio::test]
async fn test_paired_variant_deleted_with_uploaded_report() {
    let consent = ConsentState {
        account: Some("pilot-1".to_string()),
        ..ConsentState::default()
    };
    let fixture = Fixture::new(ReportKind::CrashReport, true, consent);
    let full = fixture.write_report("crash-01.gz", 10);
    let redacted = fixture.write_report("crash-01.gz.anon", 5);
    let transport = ScriptedTransport::succeeding();

    let handle = fixture.start(transport.clone());
    common::eventually("both variants deleted", || !full.exists() && !redacted.exists()).await;
    status_reaches(&handle, "idle", |s| s.state == SessionState::Idle).await;
    assert_eq!(transport.uploads(), vec!["crash-01.gz"]);

    handle.stop().await;
}

#[tokio::test]
async fn test_live_report_settled_before_sweep_is_uploaded_once() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    let a = fixture.write_report("a.bin", 1);
    let transport = ScriptedTransport::succeeding();

    let handle = fixture.start(transport.clone());
    handle.report_ready(&a).await;
    common::eventually("report deleted", || !a.exists()).await;
    common::settle().await;

    assert_eq!(transport.uploads(), vec!["a.bin"]);
    pending_is(&handle, &[]).await;
    assert_eq!(handle.status().state, SessionState::Idle);

    handle.stop().await;
}

#[tokio::test]
async fn test_status_mirror_reports_uploading() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    fixture.write_report("a.bin", 1);

    let handle = fixture.start(ScriptedTransport::hanging());
    let mut status = handle.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.is_uploading && s.state == SessionState::Uploading),
    )
    .await
    .expect("engine started uploading")
    .expect("status channel open");
    assert_eq!(handle.status().pending_count, 1);

    handle.stop().await;
}

#[tokio::test]
async fn test_stop_keeps_queued_files() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, denied());
    let a = fixture.write_report("a.bin", 1);
    let b = fixture.write_report("b.bin", 1);

    let handle = fixture.start(ScriptedTransport::succeeding());
    pending_is(&handle, &["a.bin", "b.bin"]).await;
    handle.stop().await;

    common::settle().await;
    assert!(a.exists());
    assert!(b.exists());
}

#[tokio::test]
async fn test_stop_abandons_in_flight_transfer() {
    let fixture = Fixture::new(ReportKind::FlightLog, true, allowed());
    let a = fixture.write_report("a.bin", 1);
    let transport = ScriptedTransport::hanging();

    let handle = fixture.start(transport.clone());
    common::eventually("transfer started", || transport.active() == 1).await;
    handle.stop().await;

    common::eventually("transfer dropped", || transport.active() == 0).await;
    assert!(a.exists());
}

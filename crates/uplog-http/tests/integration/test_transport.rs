//! HTTP transport against a mock collection service

use std::time::Duration;

use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use uplog_core::domain::{Report, ReportKind};
use uplog_core::ports::{IReportTransport, TransferError};
use uplog_http::ACCOUNT_HEADER;

use crate::common::{mount_status, setup_collect_mock, transport_for, write_report};

#[tokio::test]
async fn test_upload_posts_bytes_with_kind_headers() {
    let (server, transport) = setup_collect_mock().await;
    let (_dir, report) = write_report("crash_001.gz", b"\x1f\x8bcrash");

    Mock::given(method("POST"))
        .and(path("/apiv1/crashreport"))
        .and(header("content-type", "application/gzip"))
        .and(header(ACCOUNT_HEADER, "pilot-1"))
        .and(body_bytes(b"\x1f\x8bcrash".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let result = transport
        .upload(ReportKind::CrashReport, &report, Some("pilot-1"))
        .await;
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_anonymous_upload_has_no_account_header() {
    let (server, transport) = setup_collect_mock().await;
    let (_dir, report) = write_report("flight_001.bin", b"log");
    mount_status(&server, ReportKind::FlightLog, 201).await;

    let result = transport.upload(ReportKind::FlightLog, &report, None).await;
    assert_eq!(result, Ok(()));

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get(ACCOUNT_HEADER).is_none());
    assert_eq!(
        requests[0]
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/octet-stream")
    );
}

#[tokio::test]
async fn test_bad_request_and_forbidden_reject_the_session() {
    for status in [400u16, 403] {
        let (server, transport) = setup_collect_mock().await;
        let (_dir, report) = write_report("bbox_001.gz", b"bbox");
        mount_status(&server, ReportKind::BlackBox, status).await;

        let result = transport.upload(ReportKind::BlackBox, &report, None).await;
        assert_eq!(result, Err(TransferError::BadRequest { status }));
    }
}

#[tokio::test]
async fn test_throttling_and_server_errors_are_transient() {
    for status in [429u16, 500, 503] {
        let (server, transport) = setup_collect_mock().await;
        let (_dir, report) = write_report("gutma_001.json", b"{}");
        mount_status(&server, ReportKind::GutmaLog, status).await;

        let result = transport.upload(ReportKind::GutmaLog, &report, None).await;
        assert_eq!(result, Err(TransferError::ServerUnavailable { status }));
    }
}

#[tokio::test]
async fn test_other_statuses_reject_the_report() {
    let (server, transport) = setup_collect_mock().await;
    let (_dir, report) = write_report("flight_002.bin", b"log");
    mount_status(&server, ReportKind::FlightLog, 415).await;

    let result = transport.upload(ReportKind::FlightLog, &report, None).await;
    assert_eq!(result, Err(TransferError::RejectedReport { status: 415 }));
}

#[tokio::test]
async fn test_missing_file_is_unreadable() {
    let (server, transport) = setup_collect_mock().await;
    let (dir, report) = write_report("flight_003.bin", b"log");
    std::fs::remove_file(report.location()).unwrap();

    let result = transport.upload(ReportKind::FlightLog, &report, None).await;
    assert!(matches!(result, Err(TransferError::Unreadable(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
    drop(dir);
}

#[tokio::test]
async fn test_refused_connection_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = transport_for(&format!("http://{addr}"), Duration::from_secs(2));
    let (_dir, report) = write_report("flight_004.bin", b"log");

    let result = transport.upload(ReportKind::FlightLog, &report, None).await;
    let error = result.unwrap_err();
    assert!(matches!(error, TransferError::Connection(_)), "{error:?}");
}

#[tokio::test]
async fn test_slow_service_times_out_as_connection_error() {
    let (server, _) = setup_collect_mock().await;
    Mock::given(method("POST"))
        .and(path(ReportKind::FlightLog.api_path()))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let transport = transport_for(&server.uri(), Duration::from_millis(200));
    let (_dir, report): (_, Report) = write_report("flight_005.bin", b"log");

    let result = transport.upload(ReportKind::FlightLog, &report, None).await;
    assert!(matches!(result, Err(TransferError::Connection(_))));
}

#[tokio::test]
async fn test_peer_closing_mid_body_is_transient() {
    use tokio::io::AsyncReadExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = [0u8; 64];
        let _ = socket.read(&mut head).await;
        drop(socket);
    });

    let transport = transport_for(&format!("http://{addr}"), Duration::from_secs(5));
    let (_dir, report) = write_report("crash_006.gz", &vec![0x1f; 4 * 1024 * 1024]);

    let error = transport
        .upload(ReportKind::CrashReport, &report, None)
        .await
        .unwrap_err();
    assert!(matches!(error, TransferError::Connection(_)), "{error:?}");
    assert_eq!(error.class(), uplog_core::domain::FailureClass::Transient);

    server.await.unwrap();
}

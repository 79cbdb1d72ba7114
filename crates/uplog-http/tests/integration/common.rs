//! Shared helpers for transport integration tests

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use uplog_core::domain::{Report, ReportKind};
use uplog_http::{CollectClient, HttpReportTransport};

/// Starts a mock collection service and a transport pointed at it
pub async fn setup_collect_mock() -> (MockServer, HttpReportTransport) {
    let server = MockServer::start().await;
    let transport = transport_for(&server.uri(), Duration::from_secs(5));
    (server, transport)
}

pub fn transport_for(base_url: &str, timeout: Duration) -> HttpReportTransport {
    let client = CollectClient::new(base_url, timeout, "uplog-test/1.0")
        .expect("client builds");
    HttpReportTransport::new(client)
}

/// Mounts a response with `status` on the endpoint of `kind`
pub async fn mount_status(server: &MockServer, kind: ReportKind, status: u16) {
    Mock::given(method("POST"))
        .and(path(kind.api_path()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Writes `contents` to `name` in a fresh temp directory
pub fn write_report(name: &str, contents: &[u8]) -> (TempDir, Report) {
    let dir = TempDir::new().expect("temp dir");
    let location: PathBuf = dir.path().join(name);
    std::fs::write(&location, contents).expect("write report");
    let report = Report::from_path(&location).expect("report metadata");
    (dir, report)
}

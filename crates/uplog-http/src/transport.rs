//! HTTP report transport
//!
//! Posts the raw bytes of one report to `<base_url><kind api path>` with the
//! kind's `Content-Type`, and an `x-account` header when signed in.
//!
//! ## Status classification
//!
//! | Status            | Error                                  | Session effect       |
//! |-------------------|----------------------------------------|----------------------|
//! | 2xx               | none                                   | delete, next         |
//! | 400, 403          | [`TransferError::BadRequest`]          | delete, stop         |
//! | 429, 5xx          | [`TransferError::ServerUnavailable`]   | keep, suspend        |
//! | any other         | [`TransferError::RejectedReport`]      | delete, next         |

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use tracing::debug;
use uplog_core::domain::{Report, ReportKind};
use uplog_core::ports::{IReportTransport, TransferError};

use crate::client::CollectClient;

/// Header attributing an upload to a signed-in account
pub const ACCOUNT_HEADER: &str = "x-account";

/// [`IReportTransport`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpReportTransport {
    client: CollectClient,
}

impl HttpReportTransport {
    pub fn new(client: CollectClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CollectClient {
        &self.client
    }
}

/// Maps a response status onto the upload outcome
pub fn classify_status(status: StatusCode) -> Result<(), TransferError> {
    let code = status.as_u16();
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::BAD_REQUEST || status == StatusCode::FORBIDDEN {
        Err(TransferError::BadRequest { status: code })
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(TransferError::ServerUnavailable { status: code })
    } else {
        Err(TransferError::RejectedReport { status: code })
    }
}

/// Maps a failed send onto the upload outcome
///
/// Only errors raised before anything reached the network (request building,
/// redirect policy) are permanent. Timeouts, refused connections, resets and
/// a peer closing mid-body all leave the report for a later attempt.
fn classify_error(error: reqwest::Error) -> TransferError {
    if error.is_builder() || error.is_redirect() {
        TransferError::Other(error.to_string())
    } else {
        TransferError::Connection(error.to_string())
    }
}

#[async_trait]
impl IReportTransport for HttpReportTransport {
    async fn upload(
        &self,
        kind: ReportKind,
        report: &Report,
        account: Option<&str>,
    ) -> Result<(), TransferError> {
        let body = tokio::fs::read(report.location())
            .await
            .map_err(|e| TransferError::Unreadable(format!("{}: {e}", report.location().display())))?;

        debug!(
            kind = %kind,
            location = %report.location().display(),
            bytes = body.len(),
            "Posting report"
        );

        let mut request = self
            .client
            .request(Method::POST, kind.api_path())
            .header(CONTENT_TYPE, kind.content_type())
            .body(body);
        if let Some(account) = account {
            request = request.header(ACCOUNT_HEADER, account);
        }

        let response = request.send().await.map_err(classify_error)?;
        let status = response.status();
        debug!(kind = %kind, status = status.as_u16(), "Collection service responded");

        classify_status(status)
    }
}

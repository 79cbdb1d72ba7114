//! Report engine - the per-kind upload actor
//!
//! A [`ReportEngine`] owns one [`UploadSession`] and serializes every input
//! onto a single task:
//!
//! ```text
//!  producers ──report_ready──┐
//!  collector ──batch─────────┤                       ┌──▶ transfer task (one at a time)
//!  transfers ──completion────┼──▶ mpsc ──▶ actor ────┤
//!  connectivity ──watch──────┤      UploadSession    └──▶ spawn_blocking(delete files)
//!  consent ──watch───────────┘
//!                                   │
//!                                   └──▶ watch<UploadStatus> (facility mirror)
//! ```
//!
//! Filesystem and network work never runs on the actor task. Completions come
//! back through the mailbox, so the session only ever sees one event at a time.
//!
//! ## Lifecycle
//!
//! [`ReportEngine::new`] prepares the storage layout and enforces the quota.
//! [`ReportEngine::start`] subscribes to connectivity and consent, spawns the
//! actor and the collector sweep, and returns the [`EngineHandle`].
//! [`EngineHandle::stop`] cancels the actor; an in-flight transfer is
//! abandoned and no queued file is deleted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uplog_core::config::EngineSettings;
use uplog_core::domain::{
    ConsentState, Report, ReportKind, SessionCommand, SessionEvent, SessionState, TransferId,
    UploadSession,
};
use uplog_core::ports::{IConnectivityMonitor, IConsentProvider, IReportTransport, TransferError};
use uplog_telemetry::MetricsRegistry;

use crate::collector::ReportCollector;
use crate::quota::{self, QuotaOutcome};
use crate::storage::{self, ReportStorage};
use crate::EngineError;

// ============================================================================
// UploadStatus
// ============================================================================

/// Read-only projection of an engine for presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UploadStatus {
    /// Session state
    pub state: SessionState,
    /// Whether a transfer is in flight
    pub is_uploading: bool,
    /// Reports waiting for upload, including the one in flight
    pub pending_count: usize,
}

impl UploadStatus {
    fn of(session: &UploadSession) -> Self {
        Self {
            state: session.state(),
            is_uploading: session.current().is_some(),
            pending_count: session.queue().len(),
        }
    }
}

// ============================================================================
// ReportEngine
// ============================================================================

/// One upload engine, parameterized by its [`EngineSettings`]
pub struct ReportEngine {
    settings: EngineSettings,
    storage: ReportStorage,
    transport: Arc<dyn IReportTransport>,
    connectivity: Arc<dyn IConnectivityMonitor>,
    consent: Arc<dyn IConsentProvider>,
    metrics: Option<Arc<MetricsRegistry>>,
    quota: Option<QuotaOutcome>,
}

impl ReportEngine {
    /// Builds an engine and enforces its storage quota
    ///
    /// Directory creation and quota failures are logged; they never prevent
    /// the engine from starting.
    ///
    /// # Arguments
    /// * `settings` - Kind, storage layout and quota
    /// * `transport` - Uploads one report at a time
    /// * `connectivity` - Reachability of the collection service
    /// * `consent` - The user's consent
    pub fn new(
        settings: EngineSettings,
        transport: Arc<dyn IReportTransport>,
        connectivity: Arc<dyn IConnectivityMonitor>,
        consent: Arc<dyn IConsentProvider>,
    ) -> Self {
        let storage = ReportStorage::new(&settings);
        if let Err(e) = storage.prepare() {
            warn!(kind = %settings.kind, error = %e, "Cannot create report directories");
        }

        let quota = settings.quota_bytes.and_then(|max_bytes| {
            quota::enforce(storage.root(), max_bytes)
                .map_err(|e| warn!(kind = %settings.kind, error = %e, "Quota enforcement skipped"))
                .ok()
        });

        Self {
            settings,
            storage,
            transport,
            connectivity,
            consent,
            metrics: None,
            quota,
        }
    }

    /// Records outcomes in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn kind(&self) -> ReportKind {
        self.settings.kind
    }

    /// Result of the quota pass run by [`ReportEngine::new`]
    pub fn quota_outcome(&self) -> Option<QuotaOutcome> {
        self.quota
    }

    /// Spawns the actor and the collector sweep
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> EngineHandle {
        let kind = self.settings.kind;
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let mut connectivity = self.connectivity.subscribe();
        let mut consent = self.consent.subscribe();
        let online = *connectivity.borrow_and_update();
        let initial_consent = consent.borrow_and_update().clone();

        let session = UploadSession::new(initial_consent, online)
            .with_paired_variants(kind.has_redacted_variant());
        let (status_tx, status_rx) = watch::channel(UploadStatus::of(&session));

        if let (Some(metrics), Some(outcome)) = (&self.metrics, self.quota) {
            metrics.record_evictions(kind.as_str(), outcome.evicted as u64);
        }

        let actor = EngineActor {
            kind,
            session,
            transport: self.transport,
            mailbox: mailbox_rx,
            mailbox_tx: mailbox_tx.clone(),
            connectivity,
            consent,
            status: status_tx,
            shutdown: shutdown.clone(),
            transfer: None,
            metrics: self.metrics,
        };

        info!(
            kind = %kind,
            root = %self.storage.root().display(),
            online,
            "Starting report engine"
        );
        let task = tokio::spawn(actor.run());

        let collector = ReportCollector::new(self.storage.clone());
        let collected_tx = mailbox_tx.clone();
        tokio::spawn(async move {
            let batch = collector.collect().await;
            let _ = collected_tx.send(Message::Collected(batch));
        });

        EngineHandle {
            kind,
            storage: self.storage,
            mailbox: mailbox_tx,
            status: status_rx,
            shutdown,
            task,
        }
    }
}

// ============================================================================
// EngineHandle
// ============================================================================

/// Handle to a running engine: producer notification, status mirror, stop
pub struct EngineHandle {
    kind: ReportKind,
    storage: ReportStorage,
    mailbox: mpsc::UnboundedSender<Message>,
    status: watch::Receiver<UploadStatus>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Notifies the engine that a producer finished writing `location`
    ///
    /// Never fails: files that are not finalized reports of this kind, or
    /// that cannot be read, are ignored.
    pub async fn report_ready(&self, location: impl Into<PathBuf>) {
        let location = location.into();
        match self.resolve(&location).await {
            Ok(report) => {
                let _ = self.mailbox.send(Message::ReportReady(report));
            }
            Err(e) => debug!(kind = %self.kind, error = %e, "Ignoring report notification"),
        }
    }

    async fn resolve(&self, location: &Path) -> Result<Report, EngineError> {
        if !self.storage.owns(location) {
            return Err(EngineError::Foreign {
                kind: self.kind,
                path: location.to_path_buf(),
            });
        }
        let metadata = tokio::fs::metadata(location)
            .await
            .map_err(|e| EngineError::io(location, e))?;
        if !metadata.is_file() {
            return Err(EngineError::Foreign {
                kind: self.kind,
                path: location.to_path_buf(),
            });
        }
        Ok(Report::from_metadata(location, &metadata))
    }

    /// Current status
    pub fn status(&self) -> UploadStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes
    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.status.clone()
    }

    /// Snapshot of queued locations, head first
    ///
    /// Empty once the engine has stopped.
    pub async fn pending(&self) -> Vec<PathBuf> {
        let (tx, rx) = oneshot::channel();
        if self.mailbox.send(Message::Pending(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Stops the engine and waits for the actor to exit
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(kind = %self.kind, error = %e, "Engine task ended abnormally");
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

#[derive(Debug)]
enum Message {
    ReportReady(Report),
    Collected(Vec<Report>),
    TransferFinished {
        id: TransferId,
        result: Result<(), TransferError>,
        elapsed: Duration,
    },
    Pending(oneshot::Sender<Vec<PathBuf>>),
}

struct RunningTransfer {
    id: TransferId,
    cancel: CancellationToken,
    size_bytes: u64,
}

struct EngineActor {
    kind: ReportKind,
    session: UploadSession,
    transport: Arc<dyn IReportTransport>,
    mailbox: mpsc::UnboundedReceiver<Message>,
    mailbox_tx: mpsc::UnboundedSender<Message>,
    connectivity: watch::Receiver<bool>,
    consent: watch::Receiver<ConsentState>,
    status: watch::Sender<UploadStatus>,
    shutdown: CancellationToken,
    transfer: Option<RunningTransfer>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl EngineActor {
    async fn run(mut self) {
        let mut connectivity_open = true;
        let mut consent_open = true;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                Some(message) = self.mailbox.recv() => self.on_message(message),

                changed = self.connectivity.changed(), if connectivity_open => match changed {
                    Ok(()) => {
                        let online = *self.connectivity.borrow_and_update();
                        info!(kind = %self.kind, online, "Connectivity changed");
                        self.apply(SessionEvent::ConnectivityChanged(online));
                    }
                    Err(_) => {
                        debug!(kind = %self.kind, "Connectivity source closed");
                        connectivity_open = false;
                    }
                },

                changed = self.consent.changed(), if consent_open => match changed {
                    Ok(()) => {
                        let consent = self.consent.borrow_and_update().clone();
                        info!(
                            kind = %self.kind,
                            signed_in = consent.has_account(),
                            upload_allowed = consent.is_upload_allowed(),
                            "Consent changed"
                        );
                        self.apply(SessionEvent::ConsentChanged(consent));
                    }
                    Err(_) => {
                        debug!(kind = %self.kind, "Consent source closed");
                        consent_open = false;
                    }
                },
            }
        }

        if let Some(transfer) = self.transfer.take() {
            debug!(kind = %self.kind, transfer = %transfer.id, "Abandoning in-flight transfer");
            transfer.cancel.cancel();
        }
        info!(
            kind = %self.kind,
            pending = self.session.queue().len(),
            "Report engine stopped"
        );
    }

    fn on_message(&mut self, message: Message) {
        match message {
            Message::ReportReady(report) => {
                debug!(kind = %self.kind, location = %report.location().display(), "Report ready");
                self.apply(SessionEvent::ReportsQueued(vec![report]));
            }
            Message::Collected(batch) => {
                debug!(kind = %self.kind, count = batch.len(), "Merging collected reports");
                self.apply(SessionEvent::ReportsCollected(batch));
            }
            Message::TransferFinished {
                id,
                result,
                elapsed,
            } => self.on_transfer_finished(id, result, elapsed),
            Message::Pending(reply) => {
                let _ = reply.send(self.session.queue().locations());
            }
        }
    }

    fn on_transfer_finished(
        &mut self,
        id: TransferId,
        result: Result<(), TransferError>,
        elapsed: Duration,
    ) {
        let size_bytes = match self.transfer.take() {
            Some(transfer) if transfer.id == id => transfer.size_bytes,
            other => {
                self.transfer = other;
                0
            }
        };

        let label = match &result {
            Ok(()) => {
                info!(
                    kind = %self.kind,
                    transfer = %id,
                    bytes = size_bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Report uploaded"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_bytes_uploaded(self.kind.as_str(), size_bytes);
                }
                "success"
            }
            Err(TransferError::Cancelled) => {
                debug!(kind = %self.kind, transfer = %id, "Transfer cancelled");
                "cancelled"
            }
            Err(e) => {
                warn!(
                    kind = %self.kind,
                    transfer = %id,
                    error = %e,
                    class = ?e.class(),
                    "Report upload failed"
                );
                "failure"
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.observe_upload_duration(self.kind.as_str(), label, elapsed.as_secs_f64());
        }

        self.apply(SessionEvent::TransferFinished {
            id,
            result: result.map_err(|e| e.class()),
        });
    }

    fn apply(&mut self, event: SessionEvent) {
        let transition = self.session.handle(event);
        for command in transition.commands {
            self.execute(command);
        }
        self.publish_status();
    }

    fn execute(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartTransfer {
                id,
                report,
                account,
            } => self.start_transfer(id, report, account),
            SessionCommand::CancelTransfer(id) => {
                if let Some(transfer) = self.transfer.as_ref().filter(|t| t.id == id) {
                    info!(kind = %self.kind, transfer = %id, "Cancelling transfer");
                    transfer.cancel.cancel();
                }
            }
            SessionCommand::DeleteFiles { locations, reason } => {
                info!(
                    kind = %self.kind,
                    count = locations.len(),
                    reason = reason.as_str(),
                    "Deleting reports"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_outcome(self.kind.as_str(), reason.as_str(), locations.len() as u64);
                }
                tokio::task::spawn_blocking(move || storage::remove_files(&locations));
            }
        }
    }

    fn start_transfer(&mut self, id: TransferId, report: Report, account: Option<String>) {
        info!(
            kind = %self.kind,
            transfer = %id,
            location = %report.location().display(),
            variant = %report.variant(),
            "Starting upload"
        );

        let cancel = self.shutdown.child_token();
        self.transfer = Some(RunningTransfer {
            id,
            cancel: cancel.clone(),
            size_bytes: report.size_bytes(),
        });

        let transport = Arc::clone(&self.transport);
        let mailbox = self.mailbox_tx.clone();
        let kind = self.kind;
        tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(TransferError::Cancelled),
                result = transport.upload(kind, &report, account.as_deref()) => result,
            };
            let _ = mailbox.send(Message::TransferFinished {
                id,
                result,
                elapsed: started.elapsed(),
            });
        });
    }

    fn publish_status(&self) {
        let status = UploadStatus::of(&self.session);
        if let Some(metrics) = &self.metrics {
            metrics.set_pending(self.kind.as_str(), status.pending_count);
        }
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

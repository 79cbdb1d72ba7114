//! Shared helpers for engine integration tests
//!
//! Provides a scripted in-memory transport and a fixture owning a temporary
//! storage root plus the connectivity and consent signals an engine listens to.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uplog_core::config::EngineSettings;
use uplog_core::domain::{
    AccountlessPersonalDataPolicy, AnonymousDataPolicy, ConsentState, Report, ReportKind,
};
use uplog_core::ports::{ConnectivitySignal, ConsentSignal, IReportTransport, TransferError};
use uplog_engine::{EngineHandle, ReportEngine, UploadStatus};

// ============================================================================
// ScriptedTransport
// ============================================================================

/// One call received by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub name: String,
    pub account: Option<String>,
}

/// Transport answering from a script, `Ok` once the script runs out
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<(), TransferError>>>,
    calls: Mutex<Vec<Upload>>,
    delay: Duration,
    hang: bool,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    fn build(script: Vec<Result<(), TransferError>>, delay: Duration, hang: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            delay,
            hang,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    /// Accepts every report
    pub fn succeeding() -> Arc<Self> {
        Self::build(Vec::new(), Duration::from_millis(5), false)
    }

    /// Answers the first calls from `script`
    pub fn scripted(script: Vec<Result<(), TransferError>>) -> Arc<Self> {
        Self::build(script, Duration::from_millis(5), false)
    }

    /// Accepts every report after `delay`
    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(Vec::new(), delay, false)
    }

    /// Never completes; only cancellation ends a call
    pub fn hanging() -> Arc<Self> {
        Self::build(Vec::new(), Duration::ZERO, true)
    }

    /// File names uploaded so far, in call order
    pub fn uploads(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.name.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<Upload> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of simultaneous calls observed
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IReportTransport for ScriptedTransport {
    async fn upload(
        &self,
        _kind: ReportKind,
        report: &Report,
        account: Option<&str>,
    ) -> Result<(), TransferError> {
        self.calls.lock().unwrap().push(Upload {
            name: file_name(report.location()),
            account: account.map(str::to_string),
        });

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if self.hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub fn allowed() -> ConsentState {
    ConsentState::anonymous(
        AnonymousDataPolicy::Allow,
        AccountlessPersonalDataPolicy::AllowUpload,
    )
}

pub fn denied() -> ConsentState {
    ConsentState::anonymous(AnonymousDataPolicy::Deny, AccountlessPersonalDataPolicy::DenyUpload)
}

/// Temporary storage for one engine plus its input signals
pub struct Fixture {
    _dir: TempDir,
    pub settings: EngineSettings,
    pub connectivity: ConnectivitySignal,
    pub consent: ConsentSignal,
}

impl Fixture {
    pub fn new(kind: ReportKind, online: bool, consent: ConsentState) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().join(kind.dir_name());
        let work_dir = root.join("work");
        std::fs::create_dir_all(&work_dir).expect("create layout");

        Self {
            _dir: dir,
            settings: EngineSettings {
                kind,
                root,
                work_dir,
                quota_bytes: None,
            },
            connectivity: ConnectivitySignal::new(online),
            consent: ConsentSignal::new(consent),
        }
    }

    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    /// Writes a finalized report into the root
    ///
    /// Sleeps briefly afterwards so consecutive files get distinct creation times.
    pub fn write_report(&self, name: &str, size: usize) -> PathBuf {
        write_file(&self.settings.root.join(name), size)
    }

    /// Writes a finalized report into the work directory
    pub fn write_work_report(&self, name: &str, size: usize) -> PathBuf {
        write_file(&self.settings.work_dir.join(name), size)
    }

    pub fn engine(&self, transport: Arc<ScriptedTransport>) -> ReportEngine {
        ReportEngine::new(
            self.settings.clone(),
            transport,
            Arc::new(self.connectivity.clone()),
            Arc::new(self.consent.clone()),
        )
    }

    pub fn start(&self, transport: Arc<ScriptedTransport>) -> EngineHandle {
        self.engine(transport).start()
    }
}

fn write_file(path: &Path, size: usize) -> PathBuf {
    std::fs::write(path, vec![7u8; size]).expect("write report");
    std::thread::sleep(Duration::from_millis(15));
    path.to_path_buf()
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ============================================================================
// Polling
// ============================================================================

const WAIT_LIMIT: Duration = Duration::from_secs(5);
const POLL_EVERY: Duration = Duration::from_millis(10);

/// Polls `check` until it holds, panicking with `what` after a few seconds
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(POLL_EVERY).await;
    }
}

/// Waits until the engine status satisfies `check`
pub async fn status_reaches(handle: &EngineHandle, what: &str, check: impl Fn(&UploadStatus) -> bool) {
    eventually(what, || check(&handle.status())).await;
}

/// Waits until the pending queue holds exactly `expected` file names
pub async fn pending_is(handle: &EngineHandle, expected: &[&str]) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let names: Vec<String> = handle.pending().await.iter().map(|p| file_name(p)).collect();
        if names == expected {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("pending queue is {names:?}, expected {expected:?}");
        }
        tokio::time::sleep(POLL_EVERY).await;
    }
}

/// Lets the actor drain events whose effects are not observable
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

//! uplog Daemon - Background report upload service
//!
//! This binary runs as a user service and handles:
//! - One upload engine per enabled report kind
//! - Reachability probing of the collection service
//! - Consent reload from the configuration file on SIGHUP
//! - Optional Prometheus metrics endpoint
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! Engines share one HTTP transport, one connectivity signal and one consent
//! signal. Everything is driven by a `CancellationToken` that is triggered on
//! receipt of SIGTERM or SIGINT; engines are then stopped, leaving any
//! unsent reports on disk for the next run.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uplog_core::{
    config::{Config, EngineSettings, LoggingConfig},
    domain::ConsentState,
    ports::{ConnectivitySignal, ConsentSignal, IConsentProvider},
};
use uplog_engine::{EngineHandle, ReportEngine};
use uplog_http::{CollectClient, HttpReportTransport, ReachabilityProbe};
use uplog_telemetry::{MetricsRegistry, MetricsServer};

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "UPLOG_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service wiring engines to the shared adapters
struct DaemonService {
    /// Application configuration loaded from YAML
    config: Config,
    /// Where `config` was loaded from, re-read on SIGHUP
    config_path: PathBuf,
    /// Consent shared by all engines
    consent: ConsentSignal,
    /// Token for signalling graceful shutdown to all async tasks
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Creates a new DaemonService
    ///
    /// Fails if the configuration does not validate.
    fn new(config: Config, config_path: PathBuf, shutdown: CancellationToken) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            for e in &errors {
                error!(field = %e.field, "Invalid configuration: {}", e.message);
            }
            bail!("{} configuration error(s) in {}", errors.len(), config_path.display());
        }

        let consent = ConsentSignal::new(config.consent.to_state());

        Ok(Self {
            config,
            config_path,
            consent,
            shutdown,
        })
    }

    // ========================================================================
    // DaemonService::run() - async main loop
    // ========================================================================

    /// Runs the daemon until the shutdown token is cancelled
    ///
    /// 1. Starts the metrics endpoint, if enabled
    /// 2. Starts the reachability probe
    /// 3. Starts one engine per enabled report kind
    /// 4. Waits for shutdown, reloading consent on SIGHUP
    /// 5. Stops engines and background tasks
    async fn run(&self) -> Result<()> {
        let metrics = if self.config.metrics.enabled {
            Some(Arc::new(
                MetricsRegistry::new().context("Failed to create metrics registry")?,
            ))
        } else {
            None
        };

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if let Some(metrics) = &metrics {
            let server = MetricsServer::new(Arc::clone(metrics), &self.config.metrics.endpoint)?;
            let token = self.shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = server.run(token).await {
                    error!(error = %e, "Metrics server failed");
                }
            }));
        }

        let connectivity = ConnectivitySignal::new(false);
        let probe = ReachabilityProbe::for_base_url(
            &self.config.upload.base_url,
            Duration::from_secs(self.config.connectivity.probe_interval_secs),
            Duration::from_secs(self.config.connectivity.probe_timeout_secs),
            connectivity.clone(),
        )?;
        tasks.push(tokio::spawn(probe.run(self.shutdown.clone())));

        let client = CollectClient::from_config(&self.config.upload)?;
        let transport = Arc::new(HttpReportTransport::new(client));

        let mut engines = Vec::new();
        for kind in self.config.enabled_kinds() {
            let mut engine = build_engine(
                self.config.engine_settings(kind),
                transport.clone(),
                connectivity.clone(),
                self.consent.clone(),
            )
            .await?;
            if let Some(metrics) = &metrics {
                engine = engine.with_metrics(Arc::clone(metrics));
            }
            let handle = engine.start();
            tasks.push(tokio::spawn(log_status(
                handle.subscribe(),
                kind.as_str(),
                self.shutdown.clone(),
            )));
            engines.push(handle);
        }

        if engines.is_empty() {
            warn!("No report kinds enabled; the daemon has nothing to upload");
        } else {
            info!(count = engines.len(), "Report engines started");
        }

        self.wait_for_shutdown().await;

        self.stop(engines, tasks).await;
        Ok(())
    }

    /// Waits for the shutdown token, handling SIGHUP in the meantime
    async fn wait_for_shutdown(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::hangup()) {
                Ok(mut hangup) => loop {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        Some(()) = hangup.recv() => self.reload_consent(),
                    }
                },
                Err(e) => warn!(error = %e, "Cannot install SIGHUP handler; consent reload disabled"),
            }
        }

        self.shutdown.cancelled().await;
    }

    /// Re-reads the configuration file and publishes its consent section
    fn reload_consent(&self) {
        let config = match Config::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %self.config_path.display(), error = %e, "Consent reload failed");
                return;
            }
        };

        let next = reloaded_consent(&self.consent.current(), &config);
        if self.consent.set(next) {
            info!(path = %self.config_path.display(), "Consent updated");
        } else {
            info!("Consent unchanged");
        }
    }

    /// Stops every engine, then waits for background tasks
    async fn stop(&self, engines: Vec<EngineHandle>, tasks: Vec<JoinHandle<()>>) {
        info!("Stopping report engines");
        for engine in engines {
            engine.stop().await;
        }

        self.shutdown.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
    }
}

/// Builds one engine off the async runtime
///
/// Construction creates directories and walks the storage root for the quota
/// pass, which may take a while on a large backlog.
async fn build_engine(
    settings: EngineSettings,
    transport: Arc<HttpReportTransport>,
    connectivity: ConnectivitySignal,
    consent: ConsentSignal,
) -> Result<ReportEngine> {
    let kind = settings.kind;
    tokio::task::spawn_blocking(move || {
        ReportEngine::new(settings, transport, Arc::new(connectivity), Arc::new(consent))
    })
    .await
    .with_context(|| format!("Failed to build the {kind} engine"))
}

/// Consent from a reloaded configuration
///
/// The account change time is carried over when the account is unchanged, so
/// a reload does not screen out reports already recorded under it. A new
/// account without a recorded sign-in time is stamped now.
fn reloaded_consent(current: &ConsentState, config: &Config) -> ConsentState {
    let mut next = config.consent.to_state();
    if next.account == current.account {
        next.account_changed_at = current.account_changed_at;
    } else if next.account.is_some() && next.account_changed_at.is_none() {
        next.account_changed_at = Some(Utc::now());
    }
    next
}

/// Logs every session state change of one engine
async fn log_status(
    mut status: tokio::sync::watch::Receiver<uplog_engine::UploadStatus>,
    kind: &'static str,
    shutdown: CancellationToken,
) {
    let mut last = status.borrow_and_update().state;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if current.state != last {
                    info!(
                        kind,
                        state = %current.state,
                        pending = current.pending_count,
                        "Upload session {} -> {}",
                        last,
                        current.state
                    );
                    last = current.state;
                }
            }
        }
    }
}

// ============================================================================
// Configuration and logging
// ============================================================================

/// Configuration file location: `$UPLOG_CONFIG` or the platform default
fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Loads the configuration, falling back to defaults when the file is absent
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        Ok(Config::default())
    }
}

/// Initializes tracing from the `logging` section
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(&config.logging);
    info!(
        config_path = %config_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "uplog daemon starting (uplogd)"
    );

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, config_path, shutdown_token)?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("uplog daemon shut down gracefully"),
        Err(e) => error!(error = %e, "uplog daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

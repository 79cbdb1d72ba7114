//! Reachability probe
//!
//! Periodically opens a TCP connection to the collection host and publishes
//! the result on a [`ConnectivitySignal`]. The signal only notifies on edges,
//! so engines see one event per outage rather than one per probe.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uplog_core::ports::ConnectivitySignal;

/// Periodic TCP reachability check
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    target: String,
    interval: Duration,
    timeout: Duration,
    signal: ConnectivitySignal,
}

impl ReachabilityProbe {
    /// Creates a probe for `host:port`
    pub fn new(
        target: impl Into<String>,
        interval: Duration,
        timeout: Duration,
        signal: ConnectivitySignal,
    ) -> Self {
        Self {
            target: target.into(),
            interval,
            timeout,
            signal,
        }
    }

    /// Creates a probe for the host and port of `base_url`
    ///
    /// # Errors
    /// Fails if the URL cannot be parsed or has no host.
    pub fn for_base_url(
        base_url: &str,
        interval: Duration,
        timeout: Duration,
        signal: ConnectivitySignal,
    ) -> Result<Self> {
        let url = Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("Base URL has no host: {base_url}"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("Base URL has no port: {base_url}"))?;

        Ok(Self::new(format!("{host}:{port}"), interval, timeout, signal))
    }

    /// `host:port` being probed
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Attempts one connection
    pub async fn probe_once(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(target = %self.target, error = %e, "Probe connection failed");
                false
            }
            Err(_) => {
                debug!(target = %self.target, "Probe timed out");
                false
            }
        }
    }

    /// Probes immediately, then every interval, until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(target = %self.target, interval_secs = self.interval.as_secs(), "Reachability probe started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let reachable = self.probe_once().await;
                    if self.signal.set(reachable) {
                        info!(target = %self.target, reachable, "Collection service reachability changed");
                    }
                }
            }
        }

        info!(target = %self.target, "Reachability probe stopped");
    }
}

//! Prometheus metrics registry for uplog
//!
//! Every metric carries a `kind` label so the four engines can share one
//! registry.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: reports leaving the queue by (kind, outcome)
    pub report_outcomes_total: IntCounterVec,
    /// Counter: bytes accepted by the collection service by kind
    pub bytes_uploaded_total: IntCounterVec,
    /// Gauge: reports waiting for upload by kind
    pub pending_reports: IntGaugeVec,
    /// Counter: files deleted by the startup quota pass by kind
    pub quota_evictions_total: IntCounterVec,
    /// Histogram: transfer duration in seconds by (kind, result)
    pub upload_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("uplog".to_string()), None)?;

        let report_outcomes_total = IntCounterVec::new(
            Opts::new(
                "report_outcomes_total",
                "Reports removed from the pending queue by outcome",
            ),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(report_outcomes_total.clone()))?;

        let bytes_uploaded_total = IntCounterVec::new(
            Opts::new("bytes_uploaded_total", "Total bytes of uploaded reports"),
            &["kind"],
        )?;
        registry.register(Box::new(bytes_uploaded_total.clone()))?;

        let pending_reports = IntGaugeVec::new(
            Opts::new("pending_reports", "Reports waiting for upload"),
            &["kind"],
        )?;
        registry.register(Box::new(pending_reports.clone()))?;

        let quota_evictions_total = IntCounterVec::new(
            Opts::new(
                "quota_evictions_total",
                "Report files deleted to honour the storage quota",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(quota_evictions_total.clone()))?;

        let upload_duration_seconds = HistogramVec::new(
            HistogramOpts::new("upload_duration_seconds", "Report transfer duration in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 30.0, 120.0, f64::INFINITY]),
            &["kind", "result"],
        )?;
        registry.register(Box::new(upload_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            report_outcomes_total,
            bytes_uploaded_total,
            pending_reports,
            quota_evictions_total,
            upload_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record reports leaving the queue, e.g. `uploaded`, `invalid`, `screened`.
    pub fn record_outcome(&self, kind: &str, outcome: &str, count: u64) {
        self.report_outcomes_total
            .with_label_values(&[kind, outcome])
            .inc_by(count);
    }

    /// Record bytes accepted by the collection service.
    pub fn record_bytes_uploaded(&self, kind: &str, bytes: u64) {
        self.bytes_uploaded_total
            .with_label_values(&[kind])
            .inc_by(bytes);
    }

    /// Set the pending queue length of an engine.
    pub fn set_pending(&self, kind: &str, count: usize) {
        self.pending_reports
            .with_label_values(&[kind])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record files evicted by the quota pass.
    pub fn record_evictions(&self, kind: &str, count: u64) {
        self.quota_evictions_total
            .with_label_values(&[kind])
            .inc_by(count);
    }

    /// Observe a transfer duration.
    pub fn observe_upload_duration(&self, kind: &str, result: &str, duration_secs: f64) {
        self.upload_duration_seconds
            .with_label_values(&[kind, result])
            .observe(duration_secs);
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

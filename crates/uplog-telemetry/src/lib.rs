//! uplog Telemetry - Observability for the report upload engines
//!
//! Provides:
//! - `MetricsRegistry`: Prometheus counters, gauges and histograms labeled by report kind
//! - `MetricsServer`: HTTP server for Prometheus scraping

pub mod metrics;
pub mod server;

pub use metrics::MetricsRegistry;
pub use server::MetricsServer;

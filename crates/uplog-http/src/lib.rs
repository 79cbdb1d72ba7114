//! uplog HTTP - Adapters talking to the collection service
//!
//! Provides:
//! - [`CollectClient`]: `reqwest` client bound to the service base URL
//! - [`HttpReportTransport`]: the [`IReportTransport`](uplog_core::ports::IReportTransport)
//!   adapter posting one report per request
//! - [`ReachabilityProbe`]: periodic TCP probe feeding a
//!   [`ConnectivitySignal`](uplog_core::ports::ConnectivitySignal)

pub mod client;
pub mod probe;
pub mod transport;

pub use client::CollectClient;
pub use probe::ReachabilityProbe;
pub use transport::{classify_status, HttpReportTransport, ACCOUNT_HEADER};

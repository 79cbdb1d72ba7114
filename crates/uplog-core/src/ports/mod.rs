//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits the upload engine depends on and
//! whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IReportTransport`] - Single-file upload to the collection service
//! - [`IConnectivityMonitor`] - Reachability of the collection service
//! - [`IConsentProvider`] - The user's current consent state
//!
//! The connectivity and consent ports come with in-process,
//! `tokio::sync::watch`-backed implementations ([`ConnectivitySignal`],
//! [`ConsentSignal`]) that adapters push changes into.

pub mod connectivity;
pub mod consent;
pub mod transport;

pub use connectivity::{ConnectivitySignal, IConnectivityMonitor};
pub use consent::{ConsentSignal, IConsentProvider};
pub use transport::{IReportTransport, TransferError};

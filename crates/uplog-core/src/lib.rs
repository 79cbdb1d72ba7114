//! uplog Core - Domain logic for the report upload engine
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Report`, `ReportKind`, `ConsentState`, `PendingQueue`
//! - **State machine** - `UploadSession`, a pure event-in / commands-out transition function
//! - **Port definitions** - Traits for adapters: `IReportTransport`, `IConnectivityMonitor`,
//!   `IConsentProvider`, plus watch-backed in-process signals
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module is pure: it never touches the network and only reads
//! file metadata when explicitly asked to build a [`Report`](domain::report::Report)
//! from a path. Ports define the boundaries the engine runtime plugs adapters into.

pub mod config;
pub mod domain;
pub mod ports;

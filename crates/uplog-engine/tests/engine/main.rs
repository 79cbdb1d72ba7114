//! Integration tests for uplog-engine
//!
//! Drive a real `ReportEngine` over a temporary storage root with scripted
//! in-memory transports, and observe it through its handle and the disk.

#[allow(dead_code)]
mod common;

mod test_failures;
mod test_lifecycle;

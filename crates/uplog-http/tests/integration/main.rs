//! Integration tests for uplog-http
//!
//! Uses wiremock to stand in for the collection service and checks the
//! request shape and the outcome classification of the HTTP transport.

mod common;

mod test_transport;

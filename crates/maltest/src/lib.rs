//! Shared fixtures for the workspace's integration tests
//!
//! `MockBackend` stands in for every client port, `handlers` has small
//! stub node handlers for engine tests, and `fixtures` builds the flows
//! and events the tests run.

mod clients;
pub mod fixtures;
pub mod handlers;

pub use clients::{ClientCall, MockBackend};
pub use handlers::{stub_registry, StubRegistry};

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

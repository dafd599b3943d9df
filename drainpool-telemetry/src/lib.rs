//! Logging and metrics bootstrap shared by drainpool binaries and tests.

pub mod metrics;
pub mod tracing;

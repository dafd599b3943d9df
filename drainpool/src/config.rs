//! Configuration types accepted by the executor and the stats reporter.

pub use drainpool_config::shared::{CancelMode, ExecutorConfig, ReporterConfig, ValidationError};

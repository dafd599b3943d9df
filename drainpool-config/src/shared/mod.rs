//! Configuration types shared by the executor library and its binaries.

mod base;
mod executor;
mod reporter;

pub use base::ValidationError;
pub use executor::{CancelMode, ExecutorConfig};
pub use reporter::ReporterConfig;

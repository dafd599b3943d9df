//! Bounded concurrent task executor with non-blocking admission and graceful drain.
//!
//! A fixed group of workers drains a bounded FIFO queue. Producers never spawn work directly:
//! [`Executor::submit`] either enqueues a task or rejects it immediately, and
//! [`Executor::submit_with_deadline`] waits for room at most until a deadline.
//! [`Executor::shutdown`] closes admission, lets the workers drain and waits for them to exit.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use drainpool::{Executor, Task};
//!
//! # async fn run() -> drainpool::DrainResult<()> {
//! let executor = Executor::new(4, 64)?;
//! executor.submit(Task::new(async { /* work */ }))?.into_result()?;
//! executor.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

mod macros;

pub mod admission;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod reporter;
pub mod stats;
pub mod task;
pub mod workers;

pub use admission::{RejectReason, SubmitResult};
pub use cache::BoundedCache;
pub use concurrency::cancellation::{CancelReason, CancellationToken};
pub use error::{DrainError, DrainResult, ErrorKind};
pub use executor::{Executor, ExecutorBuilder};
pub use reporter::{MetricsSink, RejectionRateMonitor, StatsSink, spawn_stats_reporter};
pub use stats::ExecutorStats;
pub use task::{Task, TaskHandle, TaskId, TaskInfo};
pub use workers::{NoopObserver, TaskObserver, WorkerId, WorkerState};

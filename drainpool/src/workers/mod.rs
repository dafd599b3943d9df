//! Fixed worker group executing queued tasks.

pub mod base;
pub mod lifecycle;
pub(crate) mod pool;
pub(crate) mod task_worker;

pub use lifecycle::{NoopObserver, TaskObserver};
pub use task_worker::{WorkerId, WorkerState};

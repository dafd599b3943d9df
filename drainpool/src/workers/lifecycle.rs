use std::fmt;
use std::sync::Arc;

use crate::error::DrainError;
use crate::task::TaskInfo;

/// Receives the outcome of every task executed by the workers.
///
/// Callbacks run inline on the worker that executed the task, before it claims the next one,
/// so they should be quick. A panicking callback is contained and logged; it does not take the
/// worker down.
pub trait TaskObserver: Send + Sync + 'static {
    /// Called when a task finished successfully.
    fn on_complete(&self, _task: &TaskInfo) {}

    /// Called when a task returned an error.
    fn on_error(&self, _task: &TaskInfo, _error: &DrainError) {}

    /// Called when a task panicked, with the panic message.
    fn on_panic(&self, _task: &TaskInfo, _panic: &str) {}
}

/// Observer ignoring every outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TaskObserver for NoopObserver {}

impl<O> TaskObserver for Arc<O>
where
    O: TaskObserver + ?Sized,
{
    fn on_complete(&self, task: &TaskInfo) {
        (**self).on_complete(task)
    }

    fn on_error(&self, task: &TaskInfo, error: &DrainError) {
        (**self).on_error(task, error)
    }

    fn on_panic(&self, task: &TaskInfo, panic: &str) {
        (**self).on_panic(task, panic)
    }
}

/// Shared, type-erased observer handed to every worker.
#[derive(Clone)]
pub(crate) struct SharedObserver(Arc<dyn TaskObserver>);

impl SharedObserver {
    pub(crate) fn new<O>(observer: O) -> Self
    where
        O: TaskObserver,
    {
        Self(Arc::new(observer))
    }
}

impl Default for SharedObserver {
    fn default() -> Self {
        Self::new(NoopObserver)
    }
}

impl std::ops::Deref for SharedObserver {
    type Target = dyn TaskObserver;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for SharedObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedObserver")
    }
}

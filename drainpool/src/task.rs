//! Units of work accepted by the executor.
//!
//! A [`Task`] wraps a future factory. The factory receives the executor's task
//! [`CancellationToken`] so that long-running work can stop cooperatively on a hard cancel.
//! Nothing is spawned when a task is built: the future is created and polled by the worker
//! that claims the task.

use std::any::Any;
use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::bail;
use crate::concurrency::cancellation::CancellationToken;
use crate::drain_error;
use crate::error::{BoxError, DrainError, DrainResult, ErrorKind};

pub(crate) type TaskFn =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, DrainResult<()>> + Send + 'static>;

/// Identifier assigned to a task when it is submitted.
///
/// Identifiers are unique within one executor and increase with submission order. They are not
/// dense: rejected submissions consume an identifier too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a task as seen by a [`crate::workers::lifecycle::TaskObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    id: TaskId,
    label: Option<Cow<'static, str>>,
}

impl TaskInfo {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "task {} ({label})", self.id),
            None => write!(f, "task {}", self.id),
        }
    }
}

/// An opaque unit of work.
///
/// [`Task::default`] is the empty task. It carries no work and is refused at submission with
/// [`ErrorKind::InvalidTask`].
#[derive(Default)]
pub struct Task {
    label: Option<Cow<'static, str>>,
    run: Option<TaskFn>,
}

impl Task {
    /// Creates a task from a future that cannot fail.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::from_fn(move |_| async move {
            future.await;
            Ok(())
        })
    }

    /// Creates a task from a future whose error is recorded as a task failure.
    pub fn fallible<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_fn(move |_| async move { future.await.map_err(task_failed) })
    }

    /// Creates a task that receives the executor's task cancellation token.
    ///
    /// The token fires on a hard cancel. Work is never aborted by the executor: the task decides
    /// when to observe the token and how to wind down.
    pub fn cancellable<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::from_fn(move |token| {
            let future = f(token);
            async move {
                future.await;
                Ok(())
            }
        })
    }

    /// Creates a task running a synchronous closure on the blocking thread pool.
    ///
    /// The claiming worker waits for the closure, so blocking work still occupies exactly one
    /// worker. A panic inside the closure is reported like a panic of any other task.
    pub fn blocking<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_fn(move |_| async move {
            match tokio::task::spawn_blocking(f).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
                Err(err) => bail!(
                    ErrorKind::TaskFailed,
                    "Blocking task was cancelled by the runtime",
                    err
                ),
            }
        })
    }

    /// Creates a result-bearing task and the handle resolving to its value.
    pub fn with_result<F, T>(future: F) -> (Self, TaskHandle<T>)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Self::try_with_result(async move { Ok::<T, Infallible>(future.await) })
    }

    /// Creates a result-bearing task from a fallible future.
    ///
    /// An error is delivered to the handle and also recorded as a task failure. A panic is
    /// delivered to the handle as [`ErrorKind::TaskPanicked`] and then resumed, so the worker
    /// still records it as a panic.
    pub fn try_with_result<F, T, E>(future: F) -> (Self, TaskHandle<T>)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
    {
        let (tx, rx) = oneshot::channel();

        let task = Self::from_fn(move |_| async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result.map_err(task_failed),
                Err(payload) => {
                    let _ = tx.send(Err(drain_error!(
                        ErrorKind::TaskPanicked,
                        "Task panicked",
                        detail = panic_message(payload.as_ref())
                    )));
                    panic::resume_unwind(payload);
                }
            };
            let outcome = match &result {
                Ok(_) => Ok(()),
                Err(err) => Err(err.clone()),
            };

            // The handle may have been dropped; the outcome is still recorded.
            let _ = tx.send(result);

            outcome
        });

        (task, TaskHandle { rx })
    }

    /// Attaches a label used in logs and observer callbacks.
    pub fn named(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns `true` for a task carrying no work.
    pub fn is_empty(&self) -> bool {
        self.run.is_none()
    }

    /// Refuses the empty task, then assigns it the id returned by `next_id`.
    pub(crate) fn into_queued(self, next_id: impl FnOnce() -> TaskId) -> DrainResult<QueuedTask> {
        let Some(run) = self.run else {
            bail!(
                ErrorKind::InvalidTask,
                "Cannot submit an empty task",
                detail = match self.label {
                    Some(label) => format!("task labelled `{label}` has no body"),
                    None => "task has no body".to_owned(),
                }
            );
        };

        Ok(QueuedTask {
            info: TaskInfo {
                id: next_id(),
                label: self.label,
            },
            run,
        })
    }

    fn from_fn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = DrainResult<()>> + Send + 'static,
    {
        Self {
            label: None,
            run: Some(Box::new(move |token| f(token).boxed())),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("empty", &self.run.is_none())
            .finish()
    }
}

fn task_failed<E>(err: E) -> DrainError
where
    E: Into<BoxError>,
{
    let err = err.into();
    drain_error!(ErrorKind::TaskFailed, "Task returned an error", err).with_boxed_source(err)
}

/// Extracts the message of a panic payload raised by `panic!`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_owned()
    }
}

/// A task that passed admission and waits in the queue.
pub(crate) struct QueuedTask {
    pub(crate) info: TaskInfo,
    pub(crate) run: TaskFn,
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// How the execution of a claimed task ended.
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    Succeeded,
    Failed(DrainError),
    Panicked(String),
}

/// Resolves to the value of a task built with [`Task::with_result`] or
/// [`Task::try_with_result`].
///
/// A panicking task resolves its handle to [`ErrorKind::TaskPanicked`]. If the task was dropped
/// without running, because it was rejected at admission or discarded by a hard cancel, the
/// handle resolves to [`ErrorKind::TaskAbandoned`].
#[must_use = "a task handle does nothing unless awaited"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<DrainResult<T>>,
}

impl<T> TaskHandle<T> {
    /// Waits for the task result.
    pub async fn join(self) -> DrainResult<T> {
        self.await
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = DrainResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(drain_error!(
                ErrorKind::TaskAbandoned,
                "Task finished without producing a result"
            )),
        })
    }
}

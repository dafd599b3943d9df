//! Bounded task executor.
//!
//! An [`Executor`] owns a fixed group of workers draining a bounded FIFO queue. Producers submit
//! tasks through [`Executor::submit`], which never waits, or [`Executor::submit_with_deadline`],
//! which waits for room at most until a deadline. [`Executor::shutdown`] stops admission and
//! waits for the workers to drain.
//!
//! # Ordering
//!
//! Tasks submitted sequentially by one producer are claimed in submission order. Tasks
//! submitted concurrently by several producers are claimed in the order in which their
//! submissions reached the queue; no fairness between producers is provided. Completion order
//! follows execution time, not submission order.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use drainpool_config::shared::{CancelMode, ExecutorConfig};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::info;

use crate::admission::{AdmissionController, SubmitResult};
use crate::bail;
use crate::concurrency::cancellation::{CancelReason, CancellationToken};
use crate::concurrency::queue::{QueueReceiver, bounded_queue};
use crate::drain_error;
use crate::error::{DrainResult, ErrorKind};
use crate::stats::{Counters, ExecutorStats};
use crate::task::{QueuedTask, Task};
use crate::workers::lifecycle::{SharedObserver, TaskObserver};
use crate::workers::pool::WorkerPool;
use crate::workers::task_worker::WorkerState;

/// Configures and starts an [`Executor`].
#[derive(Debug)]
pub struct ExecutorBuilder {
    config: ExecutorConfig,
    observer: SharedObserver,
}

impl ExecutorBuilder {
    /// Registers an observer notified of every task outcome.
    pub fn observer<O>(mut self, observer: O) -> Self
    where
        O: TaskObserver,
    {
        self.observer = SharedObserver::new(observer);
        self
    }

    /// Validates the configuration and spawns the workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> DrainResult<Executor> {
        let ExecutorBuilder { config, observer } = self;
        config.validate()?;

        let capacity = NonZeroUsize::new(config.queue_capacity).ok_or_else(|| {
            drain_error!(
                ErrorKind::ConfigError,
                "Queue capacity must be greater than 0"
            )
        })?;

        let (queue_tx, queue_rx) = bounded_queue(capacity);
        let stop_token = CancellationToken::new();
        let task_token = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let pool = WorkerPool::spawn(
            config.worker_count,
            &queue_rx,
            &task_token,
            &counters,
            &observer,
        )?;

        info!(
            worker_count = config.worker_count,
            queue_capacity = config.queue_capacity,
            cancel_mode = ?config.cancel_mode,
            "executor started"
        );

        let admission = AdmissionController::new(queue_tx, stop_token.clone(), counters.clone());

        Ok(Executor {
            inner: Arc::new(ExecutorInner {
                config,
                admission,
                queue: queue_rx,
                pool,
                stop_token,
                task_token,
                counters,
            }),
        })
    }
}

struct ExecutorInner {
    config: ExecutorConfig,
    admission: AdmissionController,
    /// Consumer side kept to discard leftovers after a hard cancel.
    queue: QueueReceiver<QueuedTask>,
    pool: WorkerPool,
    /// Fired when shutdown starts. Stops admission, including blocked deadline submissions.
    stop_token: CancellationToken,
    /// Fired by a hard cancel. Handed to tasks and observed by workers between tasks.
    task_token: CancellationToken,
    counters: Arc<Counters>,
}

/// Bounded concurrent task executor with non-blocking admission and graceful drain.
///
/// Cloning is cheap and every clone drives the same executor. When the last clone is dropped
/// without a shutdown, admission closes and the workers exit once the queue is empty.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl Executor {
    /// Returns a builder for an executor with the given configuration.
    pub fn builder(config: ExecutorConfig) -> ExecutorBuilder {
        ExecutorBuilder {
            config,
            observer: SharedObserver::default(),
        }
    }

    /// Starts an executor with the given configuration and no observer.
    pub fn start(config: ExecutorConfig) -> DrainResult<Self> {
        Self::builder(config).start()
    }

    /// Starts a graceful executor with `worker_count` workers and room for `queue_capacity`
    /// pending tasks.
    pub fn new(worker_count: usize, queue_capacity: usize) -> DrainResult<Self> {
        Self::start(ExecutorConfig::new(worker_count, queue_capacity))
    }

    /// Submits `task` without waiting.
    ///
    /// Returns an error only for an invalid task. A full queue or a shut down executor yields
    /// [`SubmitResult::Rejected`] and the task is dropped.
    pub fn submit(&self, task: Task) -> DrainResult<SubmitResult> {
        self.inner.admission.submit(task)
    }

    /// Submits `task`, waiting for room in the queue until `deadline`.
    ///
    /// Returns [`SubmitResult::TimedOut`] if the deadline elapses first and
    /// [`SubmitResult::Rejected`] if shutdown starts while waiting.
    pub async fn submit_with_deadline(
        &self,
        task: Task,
        deadline: Instant,
    ) -> DrainResult<SubmitResult> {
        self.inner.admission.submit_with_deadline(task, deadline).await
    }

    /// Submits `task`, waiting for room in the queue for at most `timeout`.
    pub async fn submit_with_timeout(
        &self,
        task: Task,
        timeout: Duration,
    ) -> DrainResult<SubmitResult> {
        self.submit_with_deadline(task, Instant::now() + timeout)
            .await
    }

    /// Stops admission and waits up to `drain_timeout` for every worker to exit.
    ///
    /// In [`CancelMode::Graceful`] the workers first execute every queued task. In
    /// [`CancelMode::Hard`] tasks are cancelled as with [`Executor::cancel_tasks`].
    ///
    /// If the timeout elapses, an error of kind [`ErrorKind::ShutdownTimedOut`] is returned and
    /// the workers keep running in the background until they finish; calling `shutdown` again
    /// resumes waiting. Concurrent and repeated calls are safe. Abnormal worker exits are
    /// reported, as [`ErrorKind::WorkerPanic`], to the call that joins the workers.
    pub async fn shutdown(&self, drain_timeout: Duration) -> DrainResult<()> {
        let inner = &self.inner;

        // Admission is closed before the stop token fires, so a producer that observes the
        // cancellation can never get a task accepted.
        if inner.admission.close() {
            info!(
                cancel_mode = ?inner.config.cancel_mode,
                drain_timeout_ms = saturating_millis(drain_timeout),
                "executor shutting down"
            );
        }
        inner.stop_token.cancel(CancelReason::Shutdown);

        if inner.config.cancel_mode == CancelMode::Hard {
            self.cancel_tasks();
        }

        if time::timeout(drain_timeout, inner.pool.wait_stopped())
            .await
            .is_err()
        {
            bail!(
                ErrorKind::ShutdownTimedOut,
                "Executor did not drain before the timeout",
                format!(
                    "{} of {} workers still running after {drain_timeout:?}",
                    inner.pool.live_workers(),
                    inner.config.worker_count
                )
            );
        }

        self.discard_queued();

        if inner.pool.join_all().await? > 0 {
            let stats = self.stats();
            info!(
                submitted = stats.submitted,
                completed = stats.completed,
                rejected = stats.rejected,
                discarded = stats.discarded,
                "executor stopped"
            );
        }

        Ok(())
    }

    /// Cancels running and queued tasks.
    ///
    /// Admission is closed, the task cancellation token fires, workers stop claiming tasks,
    /// and tasks still queued are discarded. Running tasks are never aborted: they finish on
    /// their own or by observing the token. Call [`Executor::shutdown`] to wait for the
    /// workers.
    pub fn cancel_tasks(&self) {
        let inner = &self.inner;

        inner.admission.close();
        inner.stop_token.cancel(CancelReason::Shutdown);

        if inner.task_token.cancel(CancelReason::TasksCancelled) {
            info!("executor tasks cancelled");
        }

        self.discard_queued();
    }

    /// Waits until every worker has exited, without initiating shutdown.
    pub async fn stopped(&self) {
        self.inner.pool.wait_stopped().await
    }

    /// Returns a lock-free snapshot of the counters.
    pub fn stats(&self) -> ExecutorStats {
        let inner = &self.inner;
        let mut stats = inner
            .counters
            .snapshot(|| inner.admission.queue_depth());
        stats.live_workers = inner.pool.live_workers() as u64;

        stats
    }

    /// Returns `true` once admission is closed by a shutdown or a hard cancel.
    pub fn is_shutdown(&self) -> bool {
        self.inner.admission.is_closed()
    }

    /// Returns the token handed to tasks, fired by a hard cancel.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.task_token.clone()
    }

    /// Returns the state of every worker, indexed by worker id.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.inner.pool.states()
    }

    /// Number of workers that have not exited.
    pub fn live_workers(&self) -> usize {
        self.inner.pool.live_workers()
    }

    pub fn worker_count(&self) -> usize {
        self.inner.config.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.admission.capacity()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Returns a reference that does not keep the executor alive.
    pub(crate) fn downgrade(&self) -> WeakExecutor {
        WeakExecutor {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribes to the number of workers that have not exited. The channel outlives the
    /// executor until the last worker exits.
    pub(crate) fn subscribe_live_workers(&self) -> watch::Receiver<usize> {
        self.inner.pool.subscribe_live_workers()
    }

    /// Drops every task still queued once workers no longer claim them.
    fn discard_queued(&self) {
        let inner = &self.inner;
        if !inner.task_token.is_cancelled() {
            return;
        }

        while inner.queue.try_pop().is_some() {
            inner.counters.record_discarded();
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.inner.config)
            .field("shutdown", &self.is_shutdown())
            .field("live_workers", &self.live_workers())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Non-owning reference to an [`Executor`], held by background tasks that must not keep
/// admission open.
#[derive(Debug, Clone)]
pub(crate) struct WeakExecutor {
    inner: Weak<ExecutorInner>,
}

impl WeakExecutor {
    /// Returns the executor if at least one [`Executor`] clone is still alive.
    pub(crate) fn upgrade(&self) -> Option<Executor> {
        self.inner.upgrade().map(|inner| Executor { inner })
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

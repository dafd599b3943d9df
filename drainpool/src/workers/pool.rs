use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::concurrency::cancellation::CancellationToken;
use crate::concurrency::queue::QueueReceiver;
use crate::error::{DrainError, DrainResult};
use crate::stats::Counters;
use crate::task::QueuedTask;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::lifecycle::SharedObserver;
use crate::workers::task_worker::{
    TaskWorker, TaskWorkerHandle, WorkerExitGuard, WorkerId, WorkerState,
};

/// Fixed-size group of [`TaskWorker`]s sharing one queue.
///
/// Workers are spawned once, in [`WorkerPool::spawn`], and never replaced. The pool tracks how
/// many of them are still alive so that shutdown can wait for all of them to exit without
/// holding their join handles.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    handles: Mutex<Option<Vec<TaskWorkerHandle>>>,
    states: Vec<watch::Receiver<WorkerState>>,
    live_workers: Arc<watch::Sender<usize>>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers draining `queue`.
    pub(crate) fn spawn(
        worker_count: usize,
        queue: &QueueReceiver<QueuedTask>,
        task_token: &CancellationToken,
        counters: &Arc<Counters>,
        observer: &SharedObserver,
    ) -> DrainResult<Self> {
        let live_workers = Arc::new(watch::Sender::new(0));
        let mut handles = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let (state_tx, _) = watch::channel(WorkerState::Waiting);
            let worker = TaskWorker::new(
                WorkerId::new(index),
                queue.clone(),
                task_token.clone(),
                counters.clone(),
                observer.clone(),
                WorkerExitGuard::register(state_tx, live_workers.clone()),
            );

            handles.push(worker.start()?);
        }

        debug!(worker_count, "spawned task workers");

        let states = handles
            .iter()
            .map(TaskWorkerHandle::state_receiver)
            .collect();

        Ok(Self {
            handles: Mutex::new(Some(handles)),
            states,
            live_workers,
        })
    }

    /// Returns the current state of every worker, indexed by [`WorkerId`].
    pub(crate) fn states(&self) -> Vec<WorkerState> {
        self.states.iter().map(|state| *state.borrow()).collect()
    }

    /// Number of workers that have not exited yet.
    pub(crate) fn live_workers(&self) -> usize {
        *self.live_workers.borrow()
    }

    /// Subscribes to the number of workers that have not exited yet.
    pub(crate) fn subscribe_live_workers(&self) -> watch::Receiver<usize> {
        self.live_workers.subscribe()
    }

    /// Waits until every worker has exited.
    pub(crate) async fn wait_stopped(&self) {
        let mut live_workers = self.live_workers.subscribe();
        // The sender is owned by the pool, so the channel cannot close while waiting.
        let _ = live_workers.wait_for(|live| *live == 0).await;
    }

    /// Joins every worker and aggregates abnormal exits.
    ///
    /// Only the first call joins; later calls return `Ok(0)`. Returns the number of workers
    /// joined.
    pub(crate) async fn join_all(&self) -> DrainResult<usize> {
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(handles) = handles else {
            return Ok(0);
        };

        let joined = handles.len();
        let mut errors: Vec<DrainError> = Vec::new();
        for handle in handles {
            if let Err(err) = handle.wait().await {
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(joined)
        } else {
            Err(errors.into())
        }
    }
}

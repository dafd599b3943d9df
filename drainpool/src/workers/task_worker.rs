use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::concurrency::cancellation::CancellationToken;
use crate::concurrency::queue::QueueReceiver;
use crate::drain_error;
use crate::error::{DrainError, DrainResult, ErrorKind};
use crate::stats::Counters;
use crate::task::{QueuedTask, TaskFn, TaskInfo, TaskOutcome, panic_message};
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::lifecycle::SharedObserver;

/// Index of a worker within its pool, in `[0, worker_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(usize);

impl WorkerId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of a task worker.
///
/// A worker alternates between [`WorkerState::Waiting`] and [`WorkerState::Running`] and ends
/// in [`WorkerState::Stopped`], which it never leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Executing a claimed task.
    Running,
    /// Waiting for the next task or for cancellation.
    Waiting,
    /// Exited its loop.
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Running => f.write_str("running"),
            WorkerState::Waiting => f.write_str("waiting"),
            WorkerState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Marks a worker as exited when dropped.
///
/// Held by the worker future, so the worker is reported as stopped whether its loop returns,
/// it unwinds, or the runtime drops it.
#[derive(Debug)]
pub(crate) struct WorkerExitGuard {
    state_tx: watch::Sender<WorkerState>,
    live_workers: Arc<watch::Sender<usize>>,
}

impl WorkerExitGuard {
    /// Registers one live worker.
    pub(crate) fn register(
        state_tx: watch::Sender<WorkerState>,
        live_workers: Arc<watch::Sender<usize>>,
    ) -> Self {
        live_workers.send_modify(|live| *live += 1);

        Self {
            state_tx,
            live_workers,
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state_tx.send_replace(state);
    }
}

impl Drop for WorkerExitGuard {
    fn drop(&mut self) {
        // The state is published before the count so that a drain waiter observing zero live
        // workers also observes every worker as stopped.
        self.state_tx.send_replace(WorkerState::Stopped);
        self.live_workers
            .send_modify(|live| *live = live.saturating_sub(1));
    }
}

/// Worker pulling tasks from the queue and executing them one at a time.
#[derive(Debug)]
pub struct TaskWorker {
    id: WorkerId,
    queue: QueueReceiver<QueuedTask>,
    task_token: CancellationToken,
    counters: Arc<Counters>,
    observer: SharedObserver,
    exit_guard: WorkerExitGuard,
}

impl TaskWorker {
    pub(crate) fn new(
        id: WorkerId,
        queue: QueueReceiver<QueuedTask>,
        task_token: CancellationToken,
        counters: Arc<Counters>,
        observer: SharedObserver,
        exit_guard: WorkerExitGuard,
    ) -> Self {
        Self {
            id,
            queue,
            task_token,
            counters,
            observer,
            exit_guard,
        }
    }

    async fn run(self) {
        let TaskWorker {
            id,
            queue,
            task_token,
            counters,
            observer,
            exit_guard,
        } = self;

        debug!(worker_id = %id, "task worker started");

        loop {
            // Checked between tasks so that a hard cancel is seen even when the queue is never
            // empty.
            if task_token.is_cancelled() {
                break;
            }

            exit_guard.set_state(WorkerState::Waiting);

            let task = tokio::select! {
                biased;

                _ = task_token.cancelled() => break,

                task = queue.pop() => task,
            };

            let Some(QueuedTask { info, run }) = task else {
                break;
            };

            exit_guard.set_state(WorkerState::Running);
            counters.record_started();

            let outcome = execute(run, task_token.clone()).await;

            counters.record_finished(&outcome);
            notify(&observer, id, &info, &outcome);
        }

        debug!(worker_id = %id, "task worker stopped");
    }
}

impl Worker<TaskWorkerHandle, WorkerState> for TaskWorker {
    type Error = DrainError;

    fn start(self) -> Result<TaskWorkerHandle, Self::Error> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| {
            drain_error!(
                ErrorKind::InvalidState,
                "Task workers must be started inside a tokio runtime",
                source: err
            )
        })?;

        let id = self.id;
        let state_rx = self.exit_guard.state_tx.subscribe();
        let handle = runtime.spawn(self.run());

        Ok(TaskWorkerHandle {
            id,
            state_rx,
            handle,
        })
    }
}

/// Handle to a running [`TaskWorker`].
#[derive(Debug)]
pub struct TaskWorkerHandle {
    id: WorkerId,
    state_rx: watch::Receiver<WorkerState>,
    handle: JoinHandle<()>,
}

impl TaskWorkerHandle {
    pub(crate) fn state_receiver(&self) -> watch::Receiver<WorkerState> {
        self.state_rx.clone()
    }
}

impl WorkerHandle<WorkerState> for TaskWorkerHandle {
    fn state(&self) -> WorkerState {
        *self.state_rx.borrow()
    }

    async fn wait(self) -> DrainResult<()> {
        self.handle.await.map_err(|err| {
            drain_error!(
                ErrorKind::WorkerPanic,
                "Task worker exited abnormally",
                format!("worker {}: {err}", self.id)
            )
        })
    }
}

/// Runs a claimed task, containing any panic raised while building or polling its future.
async fn execute(run: TaskFn, token: CancellationToken) -> TaskOutcome {
    let future = match panic::catch_unwind(AssertUnwindSafe(|| run(token))) {
        Ok(future) => future,
        Err(payload) => return TaskOutcome::Panicked(panic_message(payload.as_ref())),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => TaskOutcome::Succeeded,
        Ok(Err(err)) => TaskOutcome::Failed(err),
        Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
    }
}

fn notify(observer: &SharedObserver, worker_id: WorkerId, task: &TaskInfo, outcome: &TaskOutcome) {
    let notified = panic::catch_unwind(AssertUnwindSafe(|| match outcome {
        TaskOutcome::Succeeded => {
            debug!(%worker_id, task_id = %task.id(), label = task.label(), "task completed");
            observer.on_complete(task);
        }
        TaskOutcome::Failed(err) => {
            debug!(%worker_id, task_id = %task.id(), label = task.label(), error = %err, "task failed");
            observer.on_error(task, err);
        }
        TaskOutcome::Panicked(panic) => {
            debug!(%worker_id, task_id = %task.id(), label = task.label(), panic = panic.as_str(), "task panicked");
            observer.on_panic(task, panic);
        }
    }));

    if let Err(payload) = notified {
        error!(
            %worker_id,
            task_id = %task.id(),
            panic = %panic_message(payload.as_ref()),
            "task observer panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::concurrency::cancellation::CancelReason;
    use crate::concurrency::queue::{QueueSender, bounded_queue};
    use crate::task::{Task, TaskId};
    use crate::workers::lifecycle::TaskObserver;

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl TaskObserver for RecordingObserver {
        fn on_complete(&self, task: &TaskInfo) {
            self.events.lock().unwrap().push(format!("ok {}", task.id()));
        }

        fn on_error(&self, task: &TaskInfo, _error: &DrainError) {
            self.events.lock().unwrap().push(format!("err {}", task.id()));
        }

        fn on_panic(&self, task: &TaskInfo, panic: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("panic {} {panic}", task.id()));
        }
    }

    struct Harness {
        tx: QueueSender<QueuedTask>,
        token: CancellationToken,
        counters: Arc<Counters>,
        live_workers: Arc<watch::Sender<usize>>,
        handle: TaskWorkerHandle,
    }

    fn start_worker(observer: SharedObserver) -> Harness {
        let (tx, rx) = bounded_queue(NonZeroUsize::new(8).unwrap());
        let token = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let live_workers = Arc::new(watch::Sender::new(0));
        let (state_tx, _) = watch::channel(WorkerState::Waiting);

        let worker = TaskWorker::new(
            WorkerId::new(0),
            rx,
            token.clone(),
            counters.clone(),
            observer,
            WorkerExitGuard::register(state_tx, live_workers.clone()),
        );
        let handle = worker.start().unwrap();

        Harness {
            tx,
            token,
            counters,
            live_workers,
            handle,
        }
    }

    fn push(tx: &QueueSender<QueuedTask>, id: u64, task: Task) {
        tx.try_push(task.into_queued(|| TaskId::new(id)).unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn worker_survives_panicking_and_failing_tasks() {
        let observer = Arc::new(RecordingObserver::default());
        let harness = start_worker(SharedObserver::new(observer.clone()));

        push(&harness.tx, 0, Task::new(async { panic!("boom") }));
        push(
            &harness.tx,
            1,
            Task::fallible(async { Err(std::io::Error::other("nope")) }),
        );
        push(&harness.tx, 2, Task::new(async {}));
        harness.tx.close();

        harness.handle.wait().await.unwrap();

        let stats = harness.counters.snapshot(|| 0);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec!["panic 0 boom", "err 1", "ok 2"]
        );
        assert_eq!(*harness.live_workers.borrow(), 0);
    }

    #[tokio::test]
    async fn panic_while_building_the_future_is_contained() {
        let harness = start_worker(SharedObserver::default());

        let task = Task::cancellable(|_token| -> std::future::Ready<()> { panic!("eager") });
        push(&harness.tx, 0, task);
        harness.tx.close();

        harness.handle.wait().await.unwrap();
        assert_eq!(harness.counters.snapshot(|| 0).panicked, 1);
    }

    #[tokio::test]
    async fn cancelled_worker_stops_without_claiming_queued_tasks() {
        let harness = start_worker(SharedObserver::default());
        let state_rx = harness.handle.state_receiver();

        harness.token.cancel(CancelReason::TasksCancelled);
        push(&harness.tx, 0, Task::new(async {}));

        tokio::time::timeout(Duration::from_secs(5), harness.handle.wait())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*state_rx.borrow(), WorkerState::Stopped);
        assert_eq!(harness.tx.len(), 1);
        assert_eq!(harness.counters.snapshot(|| 0).completed, 0);
    }

    #[tokio::test]
    async fn state_follows_task_execution() {
        let harness = start_worker(SharedObserver::default());
        let mut state_rx = harness.handle.state_receiver();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        push(
            &harness.tx,
            0,
            Task::new(async move {
                let _ = release_rx.await;
            }),
        );

        state_rx
            .wait_for(|state| *state == WorkerState::Running)
            .await
            .unwrap();
        assert_eq!(harness.handle.state(), WorkerState::Running);

        release_tx.send(()).unwrap();
        state_rx
            .wait_for(|state| *state == WorkerState::Waiting)
            .await
            .unwrap();

        harness.tx.close();
        harness.handle.wait().await.unwrap();
        assert_eq!(*state_rx.borrow(), WorkerState::Stopped);
    }
}

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use drainpool::{DrainError, ErrorKind, Executor, ExecutorStats, Task, TaskInfo, TaskObserver};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

/// Upper bound for any wait in the integration tests.
///
/// Every wait here completes in milliseconds on a healthy executor; the bound only turns a hang
/// into a failure.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Awaits `future`, panicking if it takes longer than [`WAIT_TIMEOUT`].
pub async fn bounded<F>(future: F) -> F::Output
where
    F: Future,
{
    match timeout(WAIT_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("operation did not finish within {WAIT_TIMEOUT:?}"),
    }
}

/// Polls `condition` until it holds, panicking after [`WAIT_TIMEOUT`].
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    bounded(async {
        while !condition() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
}

/// Polls the stats of an executor until `condition` holds for a snapshot.
pub async fn wait_for_stats<F>(executor: &Executor, mut condition: F) -> ExecutorStats
where
    F: FnMut(&ExecutorStats) -> bool,
{
    bounded(async {
        loop {
            let stats = executor.stats();
            if condition(&stats) {
                return stats;
            }
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
}

/// Task that sleeps for `duration`.
pub fn sleeping_task(duration: Duration) -> Task {
    Task::new(sleep(duration))
}

/// Task that occupies a worker until the returned sender fires or is dropped.
pub fn blocking_gate() -> (Task, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();
    let task = Task::new(async move {
        let _ = rx.await;
    })
    .named("gate");

    (task, tx)
}

/// Shared log of sequence stamps written by tasks when they run.
#[derive(Debug, Clone, Default)]
pub struct SequenceRecorder {
    stamps: Arc<Mutex<Vec<(usize, u64)>>>,
}

impl SequenceRecorder {
    /// Returns a task stamping `(producer, sequence)` when executed.
    pub fn task(&self, producer: usize, sequence: u64) -> Task {
        let stamps = self.stamps.clone();
        Task::new(async move {
            stamps.lock().unwrap().push((producer, sequence));
        })
    }

    pub fn stamps(&self) -> Vec<(usize, u64)> {
        self.stamps.lock().unwrap().clone()
    }

    /// Sequences executed for `producer`, in execution order.
    pub fn sequences_of(&self, producer: usize) -> Vec<u64> {
        self.stamps()
            .into_iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, sequence)| sequence)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(Option<String>),
    Failed(Option<String>, ErrorKind),
    Panicked(Option<String>, String),
}

/// Observer keeping every outcome it is notified of.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingObserver {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }

    fn push(&self, outcome: Outcome) {
        self.outcomes.lock().unwrap().push(outcome);
    }
}

impl TaskObserver for RecordingObserver {
    fn on_complete(&self, task: &TaskInfo) {
        self.push(Outcome::Completed(task.label().map(str::to_owned)));
    }

    fn on_error(&self, task: &TaskInfo, error: &DrainError) {
        self.push(Outcome::Failed(task.label().map(str::to_owned), error.kind()));
    }

    fn on_panic(&self, task: &TaskInfo, panic: &str) {
        self.push(Outcome::Panicked(
            task.label().map(str::to_owned),
            panic.to_owned(),
        ));
    }
}

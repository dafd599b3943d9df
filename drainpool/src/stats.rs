use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::task::TaskOutcome;

/// Atomic task counters shared by admission and the workers.
///
/// Every task moves forward through `submitted`, then either `rejected` or the queue, then
/// `in_flight`, then `completed` (or `discarded` by a hard cancel). Each step increments the
/// downstream counter only after leaving the upstream one, and [`Counters::snapshot`] reads
/// downstream counters first, so a snapshot never counts one task twice.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
    in_flight: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_timed_out(&self) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        self.timed_out.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_started(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_finished(&self, outcome: &TaskOutcome) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        match outcome {
            TaskOutcome::Succeeded => {}
            TaskOutcome::Failed(_) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            TaskOutcome::Panicked(_) => {
                self.panicked.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }

    /// Reads every counter, sampling the queue depth between the worker-side and the
    /// admission-side counters.
    pub(crate) fn snapshot(&self, queue_depth: impl FnOnce() -> usize) -> ExecutorStats {
        let failed = self.failed.load(Ordering::SeqCst);
        let panicked = self.panicked.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        let discarded = self.discarded.load(Ordering::SeqCst);
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        let queue_depth = queue_depth() as u64;
        let timed_out = self.timed_out.load(Ordering::SeqCst);
        let rejected = self.rejected.load(Ordering::SeqCst);
        let submitted = self.submitted.load(Ordering::SeqCst);

        ExecutorStats {
            submitted,
            completed,
            rejected,
            timed_out,
            failed,
            panicked,
            discarded,
            in_flight,
            queue_depth,
            live_workers: 0,
        }
    }
}

/// Point-in-time view of an executor's counters.
///
/// `completed` includes failed and panicked tasks. `rejected` includes submissions whose
/// deadline elapsed (`timed_out`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    /// Valid tasks offered to the executor, accepted or not.
    pub submitted: u64,
    /// Tasks whose execution finished, whatever the outcome.
    pub completed: u64,
    /// Submissions that never entered the queue.
    pub rejected: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub panicked: u64,
    /// Accepted tasks dropped unexecuted by a hard cancel.
    pub discarded: u64,
    /// Tasks claimed by a worker and still running.
    pub in_flight: u64,
    /// Tasks waiting in the queue.
    pub queue_depth: u64,
    /// Workers that have not exited.
    pub live_workers: u64,
}

impl ExecutorStats {
    /// Returns the `(submitted, completed, rejected)` triple.
    pub fn triple(&self) -> (u64, u64, u64) {
        (self.submitted, self.completed, self.rejected)
    }

    /// Number of submissions that entered the queue.
    pub fn accepted(&self) -> u64 {
        self.submitted.saturating_sub(self.rejected)
    }

    /// Number of completed tasks that neither failed nor panicked.
    pub fn succeeded(&self) -> u64 {
        self.completed
            .saturating_sub(self.failed)
            .saturating_sub(self.panicked)
    }

    /// Accepted tasks not yet completed or discarded.
    pub fn pending(&self) -> u64 {
        self.queue_depth + self.in_flight
    }

    /// Returns `true` when every submitted task is accounted for exactly once.
    ///
    /// Holds for any snapshot taken while no submission or task is between two steps, for
    /// example after shutdown.
    pub fn is_conserved(&self) -> bool {
        self.submitted
            == self.rejected + self.queue_depth + self.in_flight + self.completed + self.discarded
    }

    /// Returns `true` when no task is counted more than once, which holds for every snapshot.
    pub fn is_consistent(&self) -> bool {
        self.rejected + self.queue_depth + self.in_flight + self.completed + self.discarded
            <= self.submitted
            && self.failed + self.panicked <= self.completed
            && self.timed_out <= self.rejected
    }
}

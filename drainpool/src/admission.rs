//! Per-submission admission decisions.
//!
//! Admission never spawns anything and never waits for a worker. A submission either lands in
//! the bounded queue or is turned away with a reason, and every attempt is counted.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::{self, Instant};

use crate::concurrency::cancellation::CancellationToken;
use crate::concurrency::queue::{PushError, QueueClosed, QueueSender};
use crate::drain_error;
use crate::error::{DrainResult, ErrorKind};
use crate::stats::Counters;
use crate::task::{QueuedTask, Task, TaskId};

/// Why a submission was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The queue held as many tasks as its capacity.
    QueueFull,
    /// The executor is shutting down or was cancelled.
    ShuttingDown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::QueueFull => f.write_str("queue full"),
            RejectReason::ShuttingDown => f.write_str("shutting down"),
        }
    }
}

/// Outcome of an admission attempt.
#[must_use = "a rejected task is dropped; check the submit result"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitResult {
    /// The task entered the queue.
    Accepted(TaskId),
    /// The task was dropped without being queued.
    Rejected(RejectReason),
    /// The deadline elapsed before the queue had room.
    TimedOut,
}

impl SubmitResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitResult::Accepted(_))
    }

    /// Returns the id of an accepted task.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            SubmitResult::Accepted(id) => Some(*id),
            _ => None,
        }
    }

    /// Converts rejections into errors of kind [`ErrorKind::Rejected`] or
    /// [`ErrorKind::TimedOut`].
    #[track_caller]
    pub fn into_result(self) -> DrainResult<TaskId> {
        match self {
            SubmitResult::Accepted(id) => Ok(id),
            SubmitResult::Rejected(reason) => Err(drain_error!(
                ErrorKind::Rejected,
                "Task was rejected by the executor",
                reason
            )),
            SubmitResult::TimedOut => Err(drain_error!(
                ErrorKind::TimedOut,
                "Deadline elapsed before the queue had room"
            )),
        }
    }
}

/// Admits tasks into the bounded queue and counts every attempt.
#[derive(Debug)]
pub(crate) struct AdmissionController {
    queue: QueueSender<QueuedTask>,
    stop_token: CancellationToken,
    counters: Arc<Counters>,
    next_id: AtomicU64,
}

impl AdmissionController {
    pub(crate) fn new(
        queue: QueueSender<QueuedTask>,
        stop_token: CancellationToken,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            queue,
            stop_token,
            counters,
            next_id: AtomicU64::new(0),
        }
    }

    /// Enqueues `task` if the queue has room, without waiting.
    pub(crate) fn submit(&self, task: Task) -> DrainResult<SubmitResult> {
        let task = self.prepare(task)?;

        if self.stop_token.is_cancelled() {
            return Ok(self.reject(RejectReason::ShuttingDown));
        }

        let id = task.info.id();
        let result = match self.queue.try_push(task) {
            Ok(()) => SubmitResult::Accepted(id),
            Err(PushError::Full(_)) => self.reject(RejectReason::QueueFull),
            Err(PushError::Closed(_)) => self.reject(RejectReason::ShuttingDown),
        };

        Ok(result)
    }

    /// Enqueues `task`, waiting for room until `deadline`.
    ///
    /// Cancellation while waiting is a [`RejectReason::ShuttingDown`] rejection, not a timeout.
    pub(crate) async fn submit_with_deadline(
        &self,
        task: Task,
        deadline: Instant,
    ) -> DrainResult<SubmitResult> {
        let task = self.prepare(task)?;

        if self.stop_token.is_cancelled() {
            return Ok(self.reject(RejectReason::ShuttingDown));
        }

        let id = task.info.id();
        let task = match self.queue.try_push(task) {
            Ok(()) => return Ok(SubmitResult::Accepted(id)),
            Err(PushError::Closed(_)) => return Ok(self.reject(RejectReason::ShuttingDown)),
            Err(PushError::Full(task)) => task,
        };

        let result = tokio::select! {
            biased;

            _ = self.stop_token.cancelled() => self.reject(RejectReason::ShuttingDown),

            pushed = time::timeout_at(deadline, self.queue.push(task)) => match pushed {
                Ok(Ok(())) => SubmitResult::Accepted(id),
                Ok(Err(QueueClosed(_))) => self.reject(RejectReason::ShuttingDown),
                Err(_) => {
                    self.counters.record_timed_out();
                    SubmitResult::TimedOut
                }
            },
        };

        Ok(result)
    }

    /// Closes admission. Returns `true` if this call closed it.
    pub(crate) fn close(&self) -> bool {
        self.queue.close()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub(crate) fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Validates the task, then counts it and assigns its id. An invalid task is a caller
    /// error and is not counted as a submission.
    fn prepare(&self, task: Task) -> DrainResult<QueuedTask> {
        task.into_queued(|| {
            self.counters.record_submitted();
            TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
        })
    }

    fn reject(&self, reason: RejectReason) -> SubmitResult {
        self.counters.record_rejected();
        SubmitResult::Rejected(reason)
    }
}

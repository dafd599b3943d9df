//! Metric names published by [`crate::reporter::MetricsSink`].

use metrics::{Unit, describe_counter, describe_gauge};

/// Label carrying the executor name.
pub const EXECUTOR_LABEL: &str = "executor";

// Task counters

/// Counter of valid tasks offered to the executor.
pub const DRAINPOOL_TASKS_SUBMITTED_TOTAL: &str = "drainpool_tasks_submitted_total";

/// Counter of tasks whose execution finished, whatever the outcome.
pub const DRAINPOOL_TASKS_COMPLETED_TOTAL: &str = "drainpool_tasks_completed_total";

/// Counter of submissions that never entered the queue.
pub const DRAINPOOL_TASKS_REJECTED_TOTAL: &str = "drainpool_tasks_rejected_total";

/// Counter of deadline submissions that timed out. Included in the rejected total.
pub const DRAINPOOL_TASKS_TIMED_OUT_TOTAL: &str = "drainpool_tasks_timed_out_total";

/// Counter of tasks that returned an error. Included in the completed total.
pub const DRAINPOOL_TASKS_FAILED_TOTAL: &str = "drainpool_tasks_failed_total";

/// Counter of tasks that panicked. Included in the completed total.
pub const DRAINPOOL_TASKS_PANICKED_TOTAL: &str = "drainpool_tasks_panicked_total";

/// Counter of accepted tasks dropped by a hard cancel.
pub const DRAINPOOL_TASKS_DISCARDED_TOTAL: &str = "drainpool_tasks_discarded_total";

// Gauges

/// Gauge of tasks waiting in the queue.
pub const DRAINPOOL_QUEUE_DEPTH: &str = "drainpool_queue_depth";

/// Gauge of tasks being executed.
pub const DRAINPOOL_TASKS_IN_FLIGHT: &str = "drainpool_tasks_in_flight";

/// Gauge of workers that have not exited.
pub const DRAINPOOL_LIVE_WORKERS: &str = "drainpool_live_workers";

/// Registers metric descriptions with the installed recorder.
pub fn register_metrics() {
    describe_counter!(
        DRAINPOOL_TASKS_SUBMITTED_TOTAL,
        Unit::Count,
        "Valid tasks offered to the executor, accepted or not"
    );
    describe_counter!(
        DRAINPOOL_TASKS_COMPLETED_TOTAL,
        Unit::Count,
        "Tasks whose execution finished, including failures and panics"
    );
    describe_counter!(
        DRAINPOOL_TASKS_REJECTED_TOTAL,
        Unit::Count,
        "Submissions that never entered the queue"
    );
    describe_counter!(
        DRAINPOOL_TASKS_TIMED_OUT_TOTAL,
        Unit::Count,
        "Deadline submissions that timed out waiting for room"
    );
    describe_counter!(
        DRAINPOOL_TASKS_FAILED_TOTAL,
        Unit::Count,
        "Tasks that returned an error"
    );
    describe_counter!(
        DRAINPOOL_TASKS_PANICKED_TOTAL,
        Unit::Count,
        "Tasks that panicked"
    );
    describe_counter!(
        DRAINPOOL_TASKS_DISCARDED_TOTAL,
        Unit::Count,
        "Accepted tasks dropped unexecuted by a hard cancel"
    );
    describe_gauge!(
        DRAINPOOL_QUEUE_DEPTH,
        Unit::Count,
        "Tasks waiting in the queue"
    );
    describe_gauge!(
        DRAINPOOL_TASKS_IN_FLIGHT,
        Unit::Count,
        "Tasks being executed by a worker"
    );
    describe_gauge!(
        DRAINPOOL_LIVE_WORKERS,
        Unit::Count,
        "Workers that have not exited"
    );
}

//! Periodic reporting of executor stats.
//!
//! [`spawn_stats_reporter`] starts exactly one background task that hands an
//! [`ExecutorStats`] snapshot to a [`StatsSink`] on every tick. The task ends by itself once
//! every worker of the executor has exited, after a final snapshot. It never keeps the executor
//! alive: dropping every [`Executor`] clone stops the workers, and with them the reporter.

use std::borrow::Cow;

use drainpool_config::shared::ReporterConfig;
use metrics::{counter, gauge};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::drain_error;
use crate::error::{DrainResult, ErrorKind};
use crate::executor::Executor;
use crate::metrics::{
    DRAINPOOL_LIVE_WORKERS, DRAINPOOL_QUEUE_DEPTH, DRAINPOOL_TASKS_COMPLETED_TOTAL,
    DRAINPOOL_TASKS_DISCARDED_TOTAL, DRAINPOOL_TASKS_FAILED_TOTAL, DRAINPOOL_TASKS_IN_FLIGHT,
    DRAINPOOL_TASKS_PANICKED_TOTAL, DRAINPOOL_TASKS_REJECTED_TOTAL,
    DRAINPOOL_TASKS_SUBMITTED_TOTAL, DRAINPOOL_TASKS_TIMED_OUT_TOTAL, EXECUTOR_LABEL,
};
use crate::stats::ExecutorStats;

/// Consumer of periodic stats snapshots.
pub trait StatsSink: Send + 'static {
    fn record(&mut self, stats: &ExecutorStats);
}

impl<A, B> StatsSink for (A, B)
where
    A: StatsSink,
    B: StatsSink,
{
    fn record(&mut self, stats: &ExecutorStats) {
        self.0.record(stats);
        self.1.record(stats);
    }
}

impl<F> StatsSink for F
where
    F: FnMut(&ExecutorStats) + Send + 'static,
{
    fn record(&mut self, stats: &ExecutorStats) {
        self(stats)
    }
}

/// Publishes snapshots through the `metrics` facade.
///
/// Counters are published as absolute values, so the sink can be recreated at any time without
/// double counting.
#[derive(Debug, Clone)]
pub struct MetricsSink {
    executor: Cow<'static, str>,
}

impl MetricsSink {
    /// Creates a sink labelling every metric with `executor`.
    pub fn new(executor: impl Into<Cow<'static, str>>) -> Self {
        Self {
            executor: executor.into(),
        }
    }
}

impl StatsSink for MetricsSink {
    fn record(&mut self, stats: &ExecutorStats) {
        let executor = self.executor.to_string();

        let counters = [
            (DRAINPOOL_TASKS_SUBMITTED_TOTAL, stats.submitted),
            (DRAINPOOL_TASKS_COMPLETED_TOTAL, stats.completed),
            (DRAINPOOL_TASKS_REJECTED_TOTAL, stats.rejected),
            (DRAINPOOL_TASKS_TIMED_OUT_TOTAL, stats.timed_out),
            (DRAINPOOL_TASKS_FAILED_TOTAL, stats.failed),
            (DRAINPOOL_TASKS_PANICKED_TOTAL, stats.panicked),
            (DRAINPOOL_TASKS_DISCARDED_TOTAL, stats.discarded),
        ];
        for (name, value) in counters {
            counter!(name, EXECUTOR_LABEL => executor.clone()).absolute(value);
        }

        let gauges = [
            (DRAINPOOL_QUEUE_DEPTH, stats.queue_depth),
            (DRAINPOOL_TASKS_IN_FLIGHT, stats.in_flight),
            (DRAINPOOL_LIVE_WORKERS, stats.live_workers),
        ];
        for (name, value) in gauges {
            gauge!(name, EXECUTOR_LABEL => executor.clone()).set(value as f64);
        }
    }
}

/// Warns when too many submissions are rejected between two snapshots.
#[derive(Debug, Clone)]
pub struct RejectionRateMonitor {
    threshold: f64,
    previous: Option<ExecutorStats>,
}

impl RejectionRateMonitor {
    /// Creates a monitor warning above `threshold`, a fraction in `[0.0, 1.0]`.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
        }
    }

    pub fn from_config(config: &ReporterConfig) -> Self {
        Self::new(config.rejection_rate_warn_threshold)
    }

    /// Records `stats` and returns the rejection rate of the window ending with it when the rate
    /// exceeds the threshold.
    ///
    /// The first snapshot opens a window that starts at zero. Windows without submissions are
    /// never reported.
    pub fn observe(&mut self, stats: &ExecutorStats) -> Option<f64> {
        let previous = self.previous.replace(*stats).unwrap_or_default();

        let submitted = stats.submitted.saturating_sub(previous.submitted);
        if submitted == 0 {
            return None;
        }

        let rejected = stats.rejected.saturating_sub(previous.rejected);
        let rate = rejected as f64 / submitted as f64;

        (rate > self.threshold).then_some(rate)
    }
}

impl StatsSink for RejectionRateMonitor {
    fn record(&mut self, stats: &ExecutorStats) {
        if let Some(rate) = self.observe(stats) {
            warn!(
                rejection_rate = rate,
                threshold = self.threshold,
                submitted = stats.submitted,
                rejected = stats.rejected,
                queue_depth = stats.queue_depth,
                "rejection rate exceeded threshold"
            );
        }
    }
}

/// Spawns one background task reporting `executor` stats to `sink` every interval.
///
/// The task stops once every worker has exited, after recording a final snapshot if an
/// [`Executor`] clone is still alive. It only holds a weak reference to the executor, so it never
/// keeps admission open. Must be called inside a tokio runtime.
pub fn spawn_stats_reporter<S>(
    executor: &Executor,
    config: &ReporterConfig,
    mut sink: S,
) -> DrainResult<JoinHandle<()>>
where
    S: StatsSink,
{
    config.validate()?;

    let runtime = Handle::try_current().map_err(|err| {
        drain_error!(
            ErrorKind::InvalidState,
            "Stats reporter must be started inside a tokio runtime",
            source: err
        )
    })?;

    let weak_executor = executor.downgrade();
    let mut live_workers = executor.subscribe_live_workers();
    let period = config.interval();

    let handle = runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                // Also resolves with an error once the last worker dropped the channel.
                _ = live_workers.wait_for(|live| *live == 0) => {
                    break;
                }

                _ = ticker.tick() => {
                    let Some(executor) = weak_executor.upgrade() else {
                        break;
                    };
                    sink.record(&executor.stats());
                }
            }
        }

        if let Some(executor) = weak_executor.upgrade() {
            sink.record(&executor.stats());
        }
        debug!("stats reporter stopped");
    });

    Ok(handle)
}

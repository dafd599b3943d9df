//! A fast producer feeding an unbounded buffer versus bounded admission.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use drainpool::{
    Executor, ExecutorStats, MetricsSink, RejectionRateMonitor, Task, spawn_stats_reporter,
};
use drainpool_telemetry::metrics::PrometheusHandle;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tracing::info;

use crate::config::DemoConfig;
use crate::report::{Report, Variant, VariantArgs};

/// Highest supported production rate, one item per microsecond.
const MAX_RATE: u64 = 1_000_000;

#[derive(Debug, clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub variant: VariantArgs,

    /// Items produced per second.
    #[arg(long, default_value_t = 2_000)]
    pub rate: u64,

    /// How long the producer runs, in seconds. Ctrl-C stops it earlier.
    #[arg(long, default_value_t = 5)]
    pub duration_secs: u64,

    /// Duration of each work item, in milliseconds.
    #[arg(long, default_value_t = 5)]
    pub work_ms: u64,
}

#[derive(Debug, Serialize)]
struct Outcome {
    produced: u64,
    /// Highest number of items waiting for a consumer.
    peak_backlog: u64,
    /// Items still waiting when the producer stopped.
    final_backlog: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<ExecutorStats>,
}

pub async fn run(args: Args, config: &DemoConfig, metrics: &PrometheusHandle) -> anyhow::Result<()> {
    let variant = args.variant.variant();
    let duration = Duration::from_secs(args.duration_secs);
    let work = Duration::from_millis(args.work_ms);

    let outcome = match variant {
        Variant::Leaky => buffer_unbounded(args.rate, duration, work).await?,
        Variant::Fixed => admit_bounded(args.rate, duration, work, config).await?,
    };
    info!(
        produced = outcome.produced,
        peak_backlog = outcome.peak_backlog,
        "producer stopped"
    );

    Report::new("backpressure", variant, outcome).print()?;

    if variant == Variant::Fixed {
        println!("{}", metrics.render());
    }

    Ok(())
}

/// Queues every item for a single consumer without any limit.
async fn buffer_unbounded(rate: u64, duration: Duration, work: Duration) -> anyhow::Result<Outcome> {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let processed = Arc::new(AtomicU64::new(0));

    let consumer = {
        let processed = processed.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                sleep(work).await;
                processed.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let mut sent: u64 = 0;
    let mut peak_backlog = 0;
    let produced = produce(rate, duration, || {
        tx.send(())?;
        sent += 1;
        peak_backlog = peak_backlog.max(sent.saturating_sub(processed.load(Ordering::SeqCst)));

        Ok(())
    })
    .await?;

    let final_backlog = produced.saturating_sub(processed.load(Ordering::SeqCst));

    // The consumer would need the whole backlog to finish; it is abandoned instead.
    consumer.abort();

    Ok(Outcome {
        produced,
        peak_backlog,
        final_backlog,
        stats: None,
    })
}

/// Submits every item without waiting, shedding what the executor has no room for.
async fn admit_bounded(
    rate: u64,
    duration: Duration,
    work: Duration,
    config: &DemoConfig,
) -> anyhow::Result<Outcome> {
    let executor = Executor::start(config.executor.clone())?;
    let reporter = spawn_stats_reporter(
        &executor,
        &config.reporter,
        (
            MetricsSink::new("backpressure"),
            RejectionRateMonitor::from_config(&config.reporter),
        ),
    )?;

    let mut peak_backlog = 0;
    let produced = produce(rate, duration, || {
        let _ = executor.submit(Task::new(sleep(work)))?;
        peak_backlog = peak_backlog.max(executor.stats().queue_depth);

        Ok(())
    })
    .await?;

    let final_backlog = executor.stats().queue_depth;

    executor.shutdown(config.executor.drain_timeout()).await?;
    reporter.await?;

    Ok(Outcome {
        produced,
        peak_backlog,
        final_backlog,
        stats: Some(executor.stats()),
    })
}

/// Calls `produce_one` `rate` times per second until `duration` elapses or Ctrl-C is pressed.
///
/// Returns how many items were produced.
async fn produce<F>(rate: u64, duration: Duration, mut produce_one: F) -> anyhow::Result<u64>
where
    F: FnMut() -> anyhow::Result<()>,
{
    let period = Duration::from_secs(1) / rate.clamp(1, MAX_RATE) as u32;
    let mut ticker = interval(period);

    let deadline = sleep(duration);
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut produced = 0;
    loop {
        tokio::select! {
            biased;

            result = &mut ctrl_c => {
                result?;
                info!("interrupted, stopping producer");
                break;
            }

            _ = &mut deadline => {
                break;
            }

            _ = ticker.tick() => {
                produce_one()?;
                produced += 1;
            }
        }
    }

    Ok(produced)
}

//! One task per work item versus a fixed worker group.

use std::time::{Duration, Instant};

use drainpool::{Executor, Task};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tracing::info;

use crate::config::DemoConfig;
use crate::report::{Report, Variant, VariantArgs};

/// Longest a producer waits for room in the executor queue.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub variant: VariantArgs,

    /// Number of work items.
    #[arg(long, default_value_t = 10_000)]
    pub items: usize,

    /// Duration of each work item, in milliseconds.
    #[arg(long, default_value_t = 20)]
    pub work_ms: u64,
}

#[derive(Debug, Serialize)]
struct Outcome {
    items: usize,
    peak_alive_tasks: usize,
    elapsed_ms: u64,
}

pub async fn run(args: Args, config: &DemoConfig) -> anyhow::Result<()> {
    let work = Duration::from_millis(args.work_ms);
    let started = Instant::now();

    let peak_alive_tasks = match args.variant.variant() {
        Variant::Leaky => spawn_per_item(args.items, work).await?,
        Variant::Fixed => submit_to_executor(args.items, work, config).await?,
    };

    let outcome = Outcome {
        items: args.items,
        peak_alive_tasks,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    info!(peak_alive_tasks, "all items processed");

    Report::new("unbounded-spawn", args.variant.variant(), outcome).print()
}

async fn spawn_per_item(items: usize, work: Duration) -> anyhow::Result<usize> {
    let metrics = Handle::current().metrics();
    let mut peak = 0;

    let mut handles = Vec::with_capacity(items);
    for _ in 0..items {
        handles.push(tokio::spawn(sleep(work)));
        peak = peak.max(metrics.num_alive_tasks());
    }

    for handle in handles {
        handle.await?;
    }

    Ok(peak)
}

async fn submit_to_executor(
    items: usize,
    work: Duration,
    config: &DemoConfig,
) -> anyhow::Result<usize> {
    let metrics = Handle::current().metrics();
    let mut peak = 0;

    let executor = Executor::start(config.executor.clone())?;
    for _ in 0..items {
        executor
            .submit_with_timeout(Task::new(sleep(work)), SUBMIT_TIMEOUT)
            .await?
            .into_result()?;
        peak = peak.max(metrics.num_alive_tasks());
    }
    executor.shutdown(config.executor.drain_timeout()).await?;

    Ok(peak)
}

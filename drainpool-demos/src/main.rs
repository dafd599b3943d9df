//! Demos of resource-lifetime defects in concurrent programs.
//!
//! Every scenario runs a leaky variant by default and its bounded counterpart with `--fixed`,
//! then prints a JSON report of the resources it held.

use clap::{Parser, Subcommand};
use drainpool::metrics::register_metrics;
use drainpool_telemetry::metrics::init_metrics_handle;
use drainpool_telemetry::tracing::init_tracing;
use tracing::info;

use crate::config::{DemoConfig, load_demo_config};
use crate::scenarios::{
    backpressure, deferred_cleanup, forgotten_worker, unbounded_cache, unbounded_spawn,
};

mod config;
mod report;
mod scenarios;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Subcommand, Debug)]
enum Scenario {
    /// Spawns one task per item, or routes items through a bounded executor.
    UnboundedSpawn(unbounded_spawn::Args),
    /// Starts background pollers that outlive their request, or scopes them to a token.
    ForgottenWorker(forgotten_worker::Args),
    /// Caches every lookup forever, or keeps the most recent ones in a bounded cache.
    UnboundedCache(unbounded_cache::Args),
    /// Holds every handle until the loop ends, or releases it each iteration.
    DeferredCleanup(deferred_cleanup::Args),
    /// Buffers a fast producer without limit, or sheds load through admission.
    Backpressure(backpressure::Args),
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;
    let config = load_demo_config()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args, config))
}

async fn async_main(args: Args, config: DemoConfig) -> anyhow::Result<()> {
    let metrics = init_metrics_handle()?;
    register_metrics();

    info!(
        worker_count = config.executor.worker_count,
        queue_capacity = config.executor.queue_capacity,
        "running scenario"
    );

    match args.scenario {
        Scenario::UnboundedSpawn(args) => unbounded_spawn::run(args, &config).await,
        Scenario::ForgottenWorker(args) => forgotten_worker::run(args).await,
        Scenario::UnboundedCache(args) => unbounded_cache::run(args),
        Scenario::DeferredCleanup(args) => deferred_cleanup::run(args),
        Scenario::Backpressure(args) => backpressure::run(args, &config, &metrics).await,
    }
}

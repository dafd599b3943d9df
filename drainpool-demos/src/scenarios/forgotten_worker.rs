//! Background pollers that outlive the request that started them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use drainpool::{CancelReason, CancellationToken};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tracing::{debug, info};

use crate::report::{Report, Variant, VariantArgs};

/// Longest the fixed variant waits for its pollers to exit.
const POLLER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub variant: VariantArgs,

    /// Number of requests, each starting one poller.
    #[arg(long, default_value_t = 100)]
    pub requests: usize,

    /// Poll interval, in milliseconds.
    #[arg(long, default_value_t = 10)]
    pub tick_ms: u64,

    /// How long each request lasts, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub request_ms: u64,

    /// How long to observe pollers after every request finished, in milliseconds.
    #[arg(long, default_value_t = 200)]
    pub linger_ms: u64,
}

#[derive(Debug, Serialize)]
struct Outcome {
    requests: usize,
    alive_tasks_after_requests: usize,
    ticks_after_requests: u64,
}

/// Cancels its token when the request scope ends, however it ends.
struct RequestScope {
    token: CancellationToken,
}

impl RequestScope {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.token
            .cancel(CancelReason::Requested("request finished".into()));
    }
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let variant = args.variant.variant();
    let tick = Duration::from_millis(args.tick_ms);
    let request = Duration::from_millis(args.request_ms);
    let ticks = Arc::new(AtomicU64::new(0));

    let requests: Vec<_> = (0..args.requests)
        .map(|_| {
            let ticks = ticks.clone();
            tokio::spawn(handle_request(variant, tick, request, ticks))
        })
        .collect();

    let mut pollers = Vec::with_capacity(args.requests);
    for request in requests {
        pollers.push(request.await?);
    }

    if variant == Variant::Fixed {
        timeout(POLLER_EXIT_TIMEOUT, async {
            for poller in pollers {
                let _ = poller.await;
            }
        })
        .await?;
    }

    let ticks_before = ticks.load(Ordering::SeqCst);
    sleep(Duration::from_millis(args.linger_ms)).await;

    let outcome = Outcome {
        requests: args.requests,
        alive_tasks_after_requests: Handle::current().metrics().num_alive_tasks(),
        ticks_after_requests: ticks.load(Ordering::SeqCst) - ticks_before,
    };
    info!(
        alive_tasks = outcome.alive_tasks_after_requests,
        "every request finished"
    );

    Report::new("forgotten-worker", variant, outcome).print()
}

/// Serves one request, starting a poller for its duration.
///
/// The leaky variant never stops the poller; the fixed one ties it to the request scope.
async fn handle_request(
    variant: Variant,
    tick: Duration,
    request: Duration,
    ticks: Arc<AtomicU64>,
) -> JoinHandle<()> {
    match variant {
        Variant::Leaky => {
            let poller = tokio::spawn(poll(tick, ticks));
            sleep(request).await;
            poller
        }
        Variant::Fixed => {
            let scope = RequestScope::new();
            let token = scope.token.clone();
            let poller = tokio::spawn(async move {
                if token.run_until_cancelled(poll(tick, ticks)).await.is_none() {
                    debug!(reason = ?token.reason(), "poller cancelled");
                }
            });
            sleep(request).await;
            poller
        }
    }
}

async fn poll(tick: Duration, ticks: Arc<AtomicU64>) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        ticks.fetch_add(1, Ordering::SeqCst);
    }
}

//! Resources released at the end of a loop versus at the end of each iteration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{info, trace};

use crate::report::{Report, Variant, VariantArgs};

#[derive(Debug, clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub variant: VariantArgs,

    /// Number of items, each needing one open handle.
    #[arg(long, default_value_t = 1_000)]
    pub items: usize,
}

#[derive(Debug, Serialize)]
struct Outcome {
    items: usize,
    peak_open_handles: usize,
    /// Distinct items seen by the cleanup callbacks.
    cleaned_items: usize,
}

/// Counts open handles and remembers the highest count.
#[derive(Debug, Default)]
struct HandleTracker {
    open: AtomicUsize,
    peak: AtomicUsize,
}

impl HandleTracker {
    fn open(self: &Arc<Self>, item: usize) -> ItemHandle {
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(open, Ordering::SeqCst);

        ItemHandle {
            item,
            tracker: self.clone(),
        }
    }

    fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Handle to a per-item resource, closed on drop.
#[derive(Debug)]
struct ItemHandle {
    item: usize,
    tracker: Arc<HandleTracker>,
}

impl Drop for ItemHandle {
    fn drop(&mut self) {
        self.tracker.open.fetch_sub(1, Ordering::SeqCst);
        trace!(item = self.item, "handle closed");
    }
}

type Cleanup = Box<dyn FnOnce() -> usize>;

pub fn run(args: Args) -> anyhow::Result<()> {
    let variant = args.variant.variant();
    let tracker = Arc::new(HandleTracker::default());

    let cleaned = match variant {
        Variant::Leaky => process_deferred(&tracker, args.items),
        Variant::Fixed => process_scoped(&tracker, args.items),
    };

    let outcome = Outcome {
        items: args.items,
        peak_open_handles: tracker.peak(),
        cleaned_items: cleaned.len(),
    };
    info!(
        peak_open_handles = outcome.peak_open_handles,
        open_handles = tracker.open_handles(),
        "items processed"
    );

    Report::new("deferred-cleanup", variant, outcome).print()
}

/// Defers every release and cleanup to the end of the loop.
///
/// Handles pile up until the loop ends, and the callbacks read a shared cursor instead of
/// their own item, so they all observe the last one.
fn process_deferred(tracker: &Arc<HandleTracker>, items: usize) -> BTreeSet<usize> {
    let cursor = Arc::new(AtomicUsize::new(0));
    let mut deferred = Vec::with_capacity(items);
    let mut cleanups: Vec<Cleanup> = Vec::with_capacity(items);

    for item in 0..items {
        cursor.store(item, Ordering::SeqCst);
        deferred.push(tracker.open(item));

        let cursor = cursor.clone();
        cleanups.push(Box::new(move || cursor.load(Ordering::SeqCst)));
    }

    drop(deferred);
    cleanups.into_iter().map(|cleanup| cleanup()).collect()
}

/// Processes each item in its own scope, so its handle closes before the next one opens.
fn process_scoped(tracker: &Arc<HandleTracker>, items: usize) -> BTreeSet<usize> {
    (0..items).map(|item| process_item(tracker, item)).collect()
}

fn process_item(tracker: &Arc<HandleTracker>, item: usize) -> usize {
    let _handle = tracker.open(item);
    let cleanup: Cleanup = Box::new(move || item);

    cleanup()
}

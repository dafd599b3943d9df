//! A lookup cache without eviction versus a bounded least-recently-used cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use anyhow::Context;
use drainpool::BoundedCache;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::report::{Report, Variant, VariantArgs};

/// Fraction of lookups hitting the hot set of keys.
const HOT_LOOKUP_RATIO: f64 = 0.8;

/// Fraction of the key space forming the hot set.
const HOT_KEY_RATIO: f64 = 0.01;

#[derive(Debug, clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub variant: VariantArgs,

    /// Number of lookups.
    #[arg(long, default_value_t = 200_000)]
    pub lookups: usize,

    /// Number of distinct keys that can be looked up.
    #[arg(long, default_value_t = 100_000)]
    pub key_space: u64,

    /// Capacity of the bounded cache.
    #[arg(long, default_value_t = 2_000)]
    pub capacity: usize,

    /// Size of each cached value, in bytes.
    #[arg(long, default_value_t = 256)]
    pub value_bytes: usize,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
struct Outcome {
    lookups: usize,
    hits: usize,
    misses: usize,
    evictions: usize,
    entries: usize,
    retained_bytes: usize,
}

/// Cache of values computed on a miss.
trait LookupCache {
    /// Looks `key` up, storing the output of `value` on a miss.
    fn lookup(&mut self, key: u64, value: impl FnOnce() -> Vec<u8>) -> Lookup;

    fn len(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Hit,
    Miss { evicted: bool },
}

impl LookupCache for HashMap<u64, Vec<u8>> {
    fn lookup(&mut self, key: u64, value: impl FnOnce() -> Vec<u8>) -> Lookup {
        if self.contains_key(&key) {
            return Lookup::Hit;
        }

        self.insert(key, value());
        Lookup::Miss { evicted: false }
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

impl LookupCache for BoundedCache<u64, Vec<u8>> {
    fn lookup(&mut self, key: u64, value: impl FnOnce() -> Vec<u8>) -> Lookup {
        if self.get(&key).is_some() {
            return Lookup::Hit;
        }

        let evicted = self.insert(key, value()).is_some();
        Lookup::Miss { evicted }
    }

    fn len(&self) -> usize {
        BoundedCache::len(self)
    }
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let variant = args.variant.variant();
    let keys = random_keys(args.lookups, args.key_space);

    let outcome = match variant {
        Variant::Leaky => replay(&mut HashMap::new(), &keys, args.value_bytes),
        Variant::Fixed => {
            let capacity =
                NonZeroUsize::new(args.capacity).context("cache capacity must be greater than 0")?;
            replay(&mut BoundedCache::new(capacity), &keys, args.value_bytes)
        }
    };
    info!(
        entries = outcome.entries,
        retained_bytes = outcome.retained_bytes,
        "lookups replayed"
    );

    Report::new("unbounded-cache", variant, outcome).print()
}

/// Draws `lookups` keys, most of them from a small hot set.
fn random_keys(lookups: usize, key_space: u64) -> Vec<u64> {
    let key_space = key_space.max(1);
    let hot_keys = ((key_space as f64 * HOT_KEY_RATIO) as u64).max(1);
    let mut rng = rand::thread_rng();

    (0..lookups)
        .map(|_| {
            if rng.gen_bool(HOT_LOOKUP_RATIO) {
                rng.gen_range(0..hot_keys)
            } else {
                rng.gen_range(0..key_space)
            }
        })
        .collect()
}

fn replay<C>(cache: &mut C, keys: &[u64], value_bytes: usize) -> Outcome
where
    C: LookupCache,
{
    let mut outcome = Outcome {
        lookups: keys.len(),
        ..Default::default()
    };

    for &key in keys {
        match cache.lookup(key, || vec![0; value_bytes]) {
            Lookup::Hit => outcome.hits += 1,
            Lookup::Miss { evicted } => {
                outcome.misses += 1;
                if evicted {
                    outcome.evictions += 1;
                }
            }
        }
    }

    outcome.entries = cache.len();
    outcome.retained_bytes = outcome.entries * value_bytes;

    outcome
}

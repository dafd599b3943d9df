//! Fixed-capacity map with least-recently-used eviction.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::num::NonZeroUsize;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_used: u64,
}

/// Map holding at most `capacity` entries.
///
/// Inserting a new key into a full cache evicts the least recently used entry. Both
/// [`BoundedCache::get`] and [`BoundedCache::insert`] count as a use; [`BoundedCache::peek`]
/// does not.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: NonZeroUsize,
    entries: HashMap<K, Entry<V>>,
    /// Keys ordered by last use, oldest first.
    recency: BTreeMap<u64, K>,
    clock: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity.get()),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    /// Returns the value for `key` and marks it as most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let tick = self.tick();
        let entry = self.entries.get_mut(key)?;

        if let Some(key) = self.recency.remove(&entry.last_used) {
            self.recency.insert(tick, key);
        }
        entry.last_used = tick;

        Some(&entry.value)
    }

    /// Returns the value for `key` without marking it as used.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces the value for `key`, marking it as most recently used.
    ///
    /// Returns the entry evicted to make room, if any. Replacing the value of an existing key
    /// never evicts.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.tick();

        if let Some(entry) = self.entries.get_mut(&key) {
            self.recency.remove(&entry.last_used);
            self.recency.insert(tick, key);
            entry.last_used = tick;
            entry.value = value;

            return None;
        }

        let evicted = if self.entries.len() >= self.capacity.get() {
            self.evict_oldest()
        } else {
            None
        };

        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                last_used: tick,
            },
        );

        evicted
    }

    /// Removes `key` and returns its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_used);

        Some(entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.recency.pop_first()?;
        let entry = self.entries.remove(&key)?;

        Some((key, entry.value))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

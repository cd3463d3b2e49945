//! Bounded, time-aware key/value storage.
//!
//! Both the form-resolution memo and the per-user conversation store are
//! keyed maps that would otherwise grow for the lifetime of the process.
//! `BoundedCache` caps them by entry count (least recently used goes first)
//! and by idle time, measured against an injectable [`Clock`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    last_access: Instant,
    /// Monotonic access counter used for LRU ordering.
    tick: u64,
}

/// A map with a maximum size and an optional idle expiry.
pub struct BoundedCache<K, V> {
    entries: HashMap<K, Slot<V>>,
    capacity: usize,
    idle_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, idle_ttl: Option<Duration>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            idle_ttl,
            clock,
            tick: 0,
        }
    }

    /// Look up an entry, refreshing its recency. Expired entries are dropped.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.get_mut(key).map(|v| &*v)
    }

    /// Mutable lookup, refreshing recency.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let now = self.clock.now();
        if self.is_expired(key, now) {
            self.entries.remove(key);
            return None;
        }

        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|slot| {
            slot.last_access = now;
            slot.tick = tick;
            &mut slot.value
        })
    }

    /// Insert or replace an entry, evicting as needed to stay within capacity.
    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        self.purge_expired(now);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }

        self.tick += 1;
        self.entries.insert(
            key,
            Slot {
                value,
                last_access: now,
                tick: self.tick,
            },
        );
    }

    /// Return the entry for `key`, inserting `default()` first if absent.
    pub fn get_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V {
        let now = self.clock.now();
        if self.is_expired(&key, now) {
            self.entries.remove(&key);
        }
        if !self.entries.contains_key(&key) {
            self.purge_expired(now);
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
        }

        self.tick += 1;
        let tick = self.tick;
        let slot = self.entries.entry(key).or_insert_with(|| Slot {
            value: default(),
            last_access: now,
            tick,
        });
        slot.last_access = now;
        slot.tick = tick;
        &mut slot.value
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    /// Number of live (possibly not yet purged) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, key: &K, now: Instant) -> bool {
        match (self.idle_ttl, self.entries.get(key)) {
            (Some(ttl), Some(slot)) => now.saturating_duration_since(slot.last_access) >= ttl,
            _ => false,
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        if let Some(ttl) = self.idle_ttl {
            self.entries
                .retain(|_, slot| now.saturating_duration_since(slot.last_access) < ttl);
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.tick)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

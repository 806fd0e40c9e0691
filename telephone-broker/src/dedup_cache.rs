//! Time-bounded dedup cache
//!
//! Remembers recently seen keys so a flooded message is handled at most once
//! per node. Uses DashMap for concurrent access without a global lock.
//!
//! ## Expiry
//!
//! An entry is visible for `ttl` after insertion. Expired entries are dropped
//! lazily on lookup and in bulk by [`DedupCache::purge_expired`], which the
//! sweeper task calls periodically.
//!
//! | Operation | Locking |
//! |-----------|---------|
//! | `contains()` | one shard, read (write only to drop an expired entry) |
//! | `insert()` | one shard, write |
//! | `try_claim()` | one shard, write via `entry()` |

use crate::error::ConfigError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shortest sweep period; `tokio::time::interval` rejects zero
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Dedup cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Initial capacity of the underlying map
    pub capacity_hint: usize,
    /// Entry lifetime in milliseconds
    pub ttl_ms: u64,
    /// Sweep interval in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity_hint: 1000,
            ttl_ms: 5000,
            sweep_interval_ms: 5000,
        }
    }
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// A zero TTL forgets every id at once and a zero interval cannot tick
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_ms == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

/// Concurrent set of recently seen keys
///
/// ## Example
///
/// ```rust,ignore
/// let cache = DedupCache::new(Duration::from_secs(5));
///
/// if cache.try_claim(message.id()) {
///     // first sighting inside the window - handle it
/// } else {
///     // duplicate - drop it
/// }
/// ```
pub struct DedupCache<K> {
    /// key → insertion time
    entries: DashMap<K, Instant>,
    ttl: Duration,
}

impl<K> DedupCache<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, 0)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            ttl,
        }
    }

    pub fn from_config(config: &DedupConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_capacity(config.ttl(), config.capacity_hint))
    }

    /// Whether `key` was inserted less than `ttl` ago
    pub fn contains(&self, key: &K) -> bool {
        let inserted_at = match self.entries.get(key) {
            Some(entry) => *entry.value(),
            None => return false,
        };

        if inserted_at.elapsed() < self.ttl {
            return true;
        }

        // Guard must be dropped before removing from the same shard
        self.entries
            .remove_if(key, |_, at| at.elapsed() >= self.ttl);
        false
    }

    /// Record `key`. Inserting a live key again keeps its original timestamp.
    pub fn insert(&self, key: K) {
        match self.entries.entry(key) {
            Entry::Vacant(e) => {
                e.insert(Instant::now());
            }
            Entry::Occupied(mut e) => {
                if e.get().elapsed() >= self.ttl {
                    e.insert(Instant::now());
                }
            }
        }
    }

    /// Atomically insert `key` if it is not live.
    ///
    /// Returns true only for the first caller inside the TTL window.
    pub fn try_claim(&self, key: K) -> bool {
        match self.entries.entry(key) {
            Entry::Vacant(e) => {
                e.insert(Instant::now());
                true
            }
            Entry::Occupied(mut e) => {
                if e.get().elapsed() >= self.ttl {
                    e.insert(Instant::now());
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Drop every expired entry and return how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, inserted_at| {
            let expired = inserted_at.elapsed() >= self.ttl;
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K> DedupCache<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Purge expired entries every `interval` until `cancel` fires.
    ///
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "Purged expired dedup entries");
                        }
                    }
                }
            }
        })
    }
}

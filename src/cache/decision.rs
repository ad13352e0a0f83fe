//! TTL + LRU cache of positive authorization decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::try_result::TryResult;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::cache::key::{CacheKey, KeyPattern};
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Floor for the sweep period; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

/// A cached grant. The decision itself is implicit: only `true` is stored.
#[derive(Debug)]
struct CacheEntry {
    inserted_at: Instant,
    ttl: Duration,
    last_access: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Bounded cache of positive decisions.
///
/// Reads never wait: a shard that is momentarily locked by a writer is
/// reported as a miss. Writes are serialized by a gate acquired with a
/// bounded wait; a writer that cannot get it in time skips the insert.
/// A miss or a skipped insert only costs a backend round trip.
#[derive(Debug)]
pub struct AuthDecisionCache {
    entries: DashMap<String, CacheEntry>,
    write_gate: Mutex<()>,
    clock: AtomicU64,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl AuthDecisionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            write_gate: Mutex::new(()),
            clock: AtomicU64::new(0),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl()
    }

    pub fn extended_ttl(&self) -> Duration {
        self.config.extended_ttl()
    }

    /// `Some(true)` for a live grant, `None` otherwise.
    pub fn get(&self, key: &CacheKey) -> Option<bool> {
        let now = Instant::now();
        let hit = match self.entries.try_get(key.as_str()) {
            TryResult::Present(entry) => {
                if entry.is_expired(now) {
                    drop(entry);
                    self.remove_if_expired(key.as_str(), now);
                    false
                } else {
                    entry.last_access.store(self.tick(), Ordering::Relaxed);
                    true
                }
            }
            TryResult::Absent => false,
            TryResult::Locked => {
                tracing::trace!(key = %key, "cache shard busy, treating as miss");
                false
            }
        };

        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_lookup(hit);
        hit.then_some(true)
    }

    /// Cache a grant for `ttl`, evicting the least recently used entry
    /// when full.
    pub async fn set(&self, key: CacheKey, ttl: Duration) {
        if self.config.max_entries == 0 || ttl.is_zero() {
            return;
        }

        let Ok(_gate) = tokio::time::timeout(self.config.lock_timeout(), self.write_gate.lock()).await
        else {
            tracing::debug!(key = %key, "cache write gate busy, skipping insert");
            return;
        };

        let now = Instant::now();
        if !self.entries.contains_key(key.as_str()) && self.entries.len() >= self.config.max_entries {
            self.purge_expired_at(now);
            while self.entries.len() >= self.config.max_entries {
                if !self.evict_lru() {
                    break;
                }
            }
        }

        self.entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                inserted_at: now,
                ttl,
                last_access: AtomicU64::new(self.tick()),
            },
        );
        metrics::record_cache_size(self.entries.len());
    }

    /// Remove one key. Returns whether it was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key.as_str()).is_some();
        if removed {
            metrics::record_cache_eviction("invalidated", 1);
        }
        removed
    }

    /// Remove every key matching a `*` glob; see [`KeyPattern`].
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let matcher = KeyPattern::parse(pattern);
        let mut removed = 0usize;
        self.entries.retain(|key, _| {
            let hit = matcher.matches(key);
            if hit {
                removed += 1;
            }
            !hit
        });

        if removed > 0 {
            metrics::record_cache_eviction("invalidated", removed as u64);
            tracing::info!(pattern, removed, "invalidated cached decisions");
        }
        removed
    }

    /// Remove every decision cached for `subject`.
    pub fn invalidate_user(&self, subject: &str) -> usize {
        self.invalidate_pattern(&CacheKey::subject_pattern(subject))
    }

    pub fn clear(&self) {
        let removed = self.entries.len();
        self.entries.clear();
        metrics::record_cache_eviction("invalidated", removed as u64);
        metrics::record_cache_size(0);
    }

    /// Entries currently stored, expired ones not yet swept included.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            entries: self.entries.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.purge_expired_at(Instant::now());
        metrics::record_cache_size(self.entries.len());
        removed
    }

    /// Sweep expired entries every `cleanup_interval` until shutdown or
    /// until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cleanup_interval().max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            tracing::debug!(interval_secs = period.as_secs(), "cache sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = cache.size(), "swept expired decisions");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("cache sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        if removed > 0 {
            self.expired.fetch_add(removed as u64, Ordering::Relaxed);
            metrics::record_cache_eviction("expired", removed as u64);
        }
        removed
    }

    fn remove_if_expired(&self, key: &str, now: Instant) {
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.expired.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_eviction("expired", 1);
        }
    }

    fn evict_lru(&self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        match victim {
            Some(key) => {
                self.entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_eviction("lru", 1);
                true
            }
            None => false,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }
}

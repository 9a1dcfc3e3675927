// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! TTL cache with pluggable eviction and best-effort snapshot persistence.
//!
//! # Flow
//!
//! ```text
//! get(key)
//!    │
//!    ├─→ entry expired? → remove, report miss
//!    │
//!    └─→ hit → bump access metadata, return payload clone
//!
//! set(key, payload)
//!    │
//!    ├─→ at capacity (new key)? → evict one victim per policy
//!    │
//!    └─→ insert (last-writer-wins) → snapshot write (best-effort)
//! ```
//!
//! A background sweep ([`TtlCache::sweep_expired`]) runs on a fixed interval
//! and may race foreground access; that is safe because it only removes
//! entries that are already logically expired.

pub mod memo;
pub mod policy;
pub mod snapshot;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::record::{epoch_ms, CachedPayload};
use policy::{EntryMeta, EvictionPolicy};
use snapshot::SnapshotSink;

/// A cached response with TTL and access bookkeeping.
///
/// Owned exclusively by the cache; access metadata is updated on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachedPayload,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
    pub access_count: u64,
    pub last_accessed_ms: u64,
    pub size_bytes: usize,
}

impl CacheEntry {
    #[must_use]
    pub fn expires_at_ms(&self) -> u64 {
        self.created_at_ms.saturating_add(self.ttl_ms)
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.ttl_ms
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removed: u64,
    pub entry_count: usize,
    pub size_bytes: usize,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// TTL cache with capacity eviction.
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: AtomicUsize,
    default_ttl_ms: AtomicU64,
    eviction: RwLock<EvictionPolicy>,
    sink: Option<Arc<dyn SnapshotSink>>,

    size_bytes: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removed: AtomicU64,
}

impl TtlCache {
    /// Create a cache without snapshot persistence.
    #[must_use]
    pub fn new(max_entries: usize, default_ttl: Duration, eviction: EvictionPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: AtomicUsize::new(max_entries.max(1)),
            default_ttl_ms: AtomicU64::new(default_ttl.as_millis() as u64),
            eviction: RwLock::new(eviction),
            sink: None,
            size_bytes: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_removed: AtomicU64::new(0),
        }
    }

    /// Create a cache that mirrors entries into a snapshot sink.
    #[must_use]
    pub fn with_snapshot(
        max_entries: usize,
        default_ttl: Duration,
        eviction: EvictionPolicy,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        let mut cache = Self::new(max_entries, default_ttl, eviction);
        cache.sink = Some(sink);
        cache
    }

    /// Look up a key. Expired entries are treated as absent and removed.
    pub fn get(&self, key: &str) -> Option<CachedPayload> {
        let now = epoch_ms();

        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired(now) {
                drop(entry); // Release the shard lock before removing
                self.remove_entry(key, true);
                self.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_lookup("expired");
                return None;
            }

            entry.access_count = entry.access_count.saturating_add(1);
            entry.last_accessed_ms = now;
            self.hits.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_cache_lookup("hit");
            return Some(entry.payload.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_lookup("miss");
        None
    }

    /// Store a payload under the default TTL.
    pub fn set(&self, key: impl Into<String>, payload: CachedPayload) {
        let ttl = Duration::from_millis(self.default_ttl_ms.load(Ordering::Acquire));
        self.set_with_ttl(key, payload, ttl);
    }

    /// Store a payload with an explicit TTL. Concurrent writes to the same
    /// key are last-writer-wins.
    pub fn set_with_ttl(&self, key: impl Into<String>, payload: CachedPayload, ttl: Duration) {
        let key = key.into();
        let now = epoch_ms();

        if !self.entries.contains_key(&key) {
            let max = self.max_entries.load(Ordering::Acquire);
            while self.entries.len() >= max {
                if !self.evict_one(now) {
                    break;
                }
            }
        }

        let size = payload.size_bytes() + key.len();
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            created_at_ms: now,
            ttl_ms: ttl.as_millis() as u64,
            access_count: 0,
            last_accessed_ms: now,
            size_bytes: size,
        };

        self.persist_put(&entry);

        if let Some(old) = self.entries.insert(key, entry) {
            let current = self.size_bytes.load(Ordering::Acquire);
            let next = current.saturating_sub(old.size_bytes).saturating_add(size);
            self.size_bytes.store(next, Ordering::Release);
        } else {
            self.size_bytes.fetch_add(size, Ordering::Release);
        }
    }

    /// Remove a key. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> bool {
        self.remove_entry(key, false)
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in &keys {
            self.persist_remove(key);
        }
        self.entries.clear();
        self.size_bytes.store(0, Ordering::Release);
        debug!(removed = keys.len(), "Cache cleared");
    }

    /// Proactively remove every expired entry. Returns the number removed.
    ///
    /// Safe to run concurrently with foreground access: an entry is only
    /// removed if it is still expired at removal time.
    pub fn sweep_expired(&self) -> usize {
        let now = epoch_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0usize;
        for key in expired {
            if let Some((_, entry)) = self.entries.remove_if(&key, |_, e| e.is_expired(now)) {
                self.size_bytes.fetch_sub(entry.size_bytes, Ordering::Release);
                self.expired_removed.fetch_add(1, Ordering::Relaxed);
                self.persist_remove(&key);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "Expiry sweep removed entries");
            crate::metrics::record_expired_removed(removed);
        }
        removed
    }

    /// Restore entries from the snapshot sink, discarding any past TTL.
    pub fn load_snapshot(&self) {
        let Some(sink) = &self.sink else { return };

        let stored = match sink.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read cache snapshot");
                return;
            }
        };

        let now = epoch_ms();
        let mut restored = 0usize;
        let mut discarded = 0usize;

        for (key, bytes) in stored {
            let entry: CacheEntry = match serde_json::from_slice(&bytes) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable snapshot entry");
                    discarded += 1;
                    continue;
                }
            };

            if entry.is_expired(now) {
                discarded += 1;
                self.persist_remove(&key);
                continue;
            }

            let max = self.max_entries.load(Ordering::Acquire);
            if self.entries.len() >= max {
                break;
            }
            self.size_bytes.fetch_add(entry.size_bytes, Ordering::Release);
            self.entries.insert(key, entry);
            restored += 1;
        }

        info!(restored, discarded, "Cache snapshot loaded");
    }

    /// Apply new limits; shrinking evicts immediately.
    pub fn reconfigure(&self, max_entries: usize, default_ttl: Duration, eviction: EvictionPolicy) {
        self.max_entries.store(max_entries.max(1), Ordering::Release);
        self.default_ttl_ms
            .store(default_ttl.as_millis() as u64, Ordering::Release);
        *self.eviction.write() = eviction;

        let now = epoch_ms();
        while self.entries.len() > max_entries.max(1) {
            if !self.evict_one(now) {
                break;
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            entry_count: self.entries.len(),
            size_bytes: self.size_bytes.load(Ordering::Acquire),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }

    fn evict_one(&self, now_ms: u64) -> bool {
        let metas: Vec<EntryMeta> = self
            .entries
            .iter()
            .map(|e| {
                let entry = e.value();
                EntryMeta {
                    key: e.key().clone(),
                    created_at_ms: entry.created_at_ms,
                    last_accessed_ms: entry.last_accessed_ms,
                    expires_at_ms: entry.expires_at_ms(),
                }
            })
            .collect();

        let policy = *self.eviction.read();
        let Some(victim) = policy.select_victim(&metas, now_ms) else {
            return false;
        };

        if self.remove_entry(&victim, false) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_cache_eviction(policy.as_str());
            debug!(key = %victim, policy = %policy, "Evicted cache entry");
            true
        } else {
            false
        }
    }

    fn remove_entry(&self, key: &str, expired: bool) -> bool {
        if let Some((_, entry)) = self.entries.remove(key) {
            self.size_bytes.fetch_sub(entry.size_bytes, Ordering::Release);
            if expired {
                self.expired_removed.fetch_add(1, Ordering::Relaxed);
            }
            self.persist_remove(key);
            true
        } else {
            false
        }
    }

    fn persist_put(&self, entry: &CacheEntry) {
        let Some(sink) = &self.sink else { return };
        match serde_json::to_vec(entry) {
            Ok(bytes) => {
                if let Err(e) = sink.put(&entry.key, &bytes) {
                    warn!(key = %entry.key, error = %e, "Snapshot write failed");
                    crate::metrics::record_snapshot("put", false);
                } else {
                    crate::metrics::record_snapshot("put", true);
                }
            }
            Err(e) => warn!(key = %entry.key, error = %e, "Snapshot serialization failed"),
        }
    }

    fn persist_remove(&self, key: &str) {
        let Some(sink) = &self.sink else { return };
        if let Err(e) = sink.remove(key) {
            warn!(key = %key, error = %e, "Snapshot remove failed");
            crate::metrics::record_snapshot("remove", false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DataSource, MergedRecord};
    use snapshot::MemorySnapshotSink;

    fn payload(id: &str) -> CachedPayload {
        let mut record =
            MergedRecord::new(id.to_string(), format!("name-{}", id), 1.0, DataSource::Real);
        record.last_updated = 0; // deterministic, so payloads compare equal
        CachedPayload::Records(vec![record])
    }

    fn cache(max: usize, policy: EvictionPolicy) -> TtlCache {
        TtlCache::new(max, Duration::from_secs(60), policy)
    }

    fn pause() {
        // Entry timestamps have millisecond resolution; keep them distinct.
        std::thread::sleep(Duration::from_millis(5));
    }

    #[test]
    fn test_set_and_get() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.set("k1", payload("a"));

        assert_eq!(cache.get("k1"), Some(payload("a")));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_ttl_expiry_treated_as_absent() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.set_with_ttl("k1", payload("a"), Duration::from_millis(20));

        assert!(cache.get("k1").is_some());

        std::thread::sleep(Duration::from_millis(50));

        assert!(cache.get("k1").is_none());
        // Lazy removal happened
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let cache = cache(5, EvictionPolicy::Lru);

        for i in 0..50 {
            cache.set(format!("k{}", i), payload(&format!("{}", i)));
            assert!(cache.len() <= 5, "cache exceeded capacity at insert {}", i);
        }
    }

    #[test]
    fn test_lru_evicts_least_recently_accessed() {
        let cache = cache(3, EvictionPolicy::Lru);
        cache.set("a", payload("a"));
        pause();
        cache.set("b", payload("b"));
        pause();
        cache.set("c", payload("c"));
        pause();

        // Refresh "a" so "b" becomes the LRU victim
        cache.get("a");
        pause();

        cache.set("d", payload("d"));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn test_fifo_evicts_oldest_insert_despite_access() {
        let cache = cache(2, EvictionPolicy::Fifo);
        cache.set("a", payload("a"));
        pause();
        cache.set("b", payload("b"));
        pause();

        // Recent access does not protect "a" under FIFO
        cache.get("a");
        cache.set("c", payload("c"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_ttl_sweep_policy_prefers_expired_victim() {
        let cache = cache(2, EvictionPolicy::TtlSweep);
        cache.set_with_ttl("short", payload("s"), Duration::from_millis(10));
        pause();
        cache.set("long", payload("l"));

        std::thread::sleep(Duration::from_millis(30));
        cache.set("new", payload("n"));

        assert!(cache.get("long").is_some());
        assert!(cache.get("new").is_some());
        assert!(cache.get("short").is_none());
    }

    #[test]
    fn test_overwrite_existing_key_does_not_evict() {
        let cache = cache(2, EvictionPolicy::Lru);
        cache.set("a", payload("a1"));
        cache.set("b", payload("b"));

        cache.set("a", payload("a2"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(payload("a2")));
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.set("a", payload("a"));
        cache.set("b", payload("b"));

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().size_bytes, 0);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.set_with_ttl("short1", payload("a"), Duration::from_millis(10));
        cache.set_with_ttl("short2", payload("b"), Duration::from_millis(10));
        cache.set("long", payload("c"));

        std::thread::sleep(Duration::from_millis(30));

        let removed = cache.sweep_expired();

        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn test_access_metadata_updated_on_get() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.set("a", payload("a"));

        cache.get("a");
        cache.get("a");

        let entry = cache.entries.get("a").unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_accessed_ms >= entry.created_at_ms);
    }

    #[test]
    fn test_stats_hit_rate() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.set("a", payload("a"));

        cache.get("a");
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.75).abs() < 0.01);
        assert!(stats.size_bytes > 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let sink = Arc::new(MemorySnapshotSink::new());
        let cache = TtlCache::with_snapshot(
            10,
            Duration::from_secs(60),
            EvictionPolicy::Lru,
            sink.clone(),
        );

        cache.set("a", payload("a"));
        cache.set("b", payload("b"));
        cache.delete("b");

        assert_eq!(sink.len(), 1);

        // A fresh cache restores the surviving entry
        let restored = TtlCache::with_snapshot(
            10,
            Duration::from_secs(60),
            EvictionPolicy::Lru,
            sink,
        );
        restored.load_snapshot();

        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get("a"), Some(payload("a")));
    }

    #[test]
    fn test_snapshot_load_discards_expired() {
        let sink = Arc::new(MemorySnapshotSink::new());
        let cache = TtlCache::with_snapshot(
            10,
            Duration::from_secs(60),
            EvictionPolicy::Lru,
            sink.clone(),
        );
        cache.set_with_ttl("stale", payload("s"), Duration::from_millis(10));

        std::thread::sleep(Duration::from_millis(30));

        let restored =
            TtlCache::with_snapshot(10, Duration::from_secs(60), EvictionPolicy::Lru, sink);
        restored.load_snapshot();

        assert!(restored.is_empty());
    }

    #[test]
    fn test_reconfigure_shrinks_immediately() {
        let cache = cache(10, EvictionPolicy::Lru);
        for i in 0..10 {
            cache.set(format!("k{}", i), payload(&format!("{}", i)));
        }

        cache.reconfigure(3, Duration::from_secs(60), EvictionPolicy::Fifo);

        assert!(cache.len() <= 3);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(cache(100, EvictionPolicy::Lru));
        let mut handles = vec![];

        for worker in 0..8 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("w{}-k{}", worker, i);
                    cache.set(key.clone(), payload(&key));
                    cache.get(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 100);
        assert!(cache.stats().hits > 0);
    }
}

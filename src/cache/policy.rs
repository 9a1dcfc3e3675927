// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::{Deserialize, Serialize};

/// Eviction policy applied when the cache is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Evict the entry with the oldest last access
    #[default]
    Lru,
    /// Evict the entry with the oldest creation time
    Fifo,
    /// Evict an already-expired entry if one exists, otherwise fall back to LRU
    TtlSweep,
}

impl EvictionPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Fifo => "fifo",
            Self::TtlSweep => "ttl-sweep",
        }
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry metadata snapshot used to choose a victim.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub key: String,
    pub created_at_ms: u64,
    pub last_accessed_ms: u64,
    pub expires_at_ms: u64,
}

impl EvictionPolicy {
    /// Select the key to evict from the given entries.
    ///
    /// Returns `None` only when `entries` is empty.
    #[must_use]
    pub fn select_victim(&self, entries: &[EntryMeta], now_ms: u64) -> Option<String> {
        match self {
            Self::Lru => entries
                .iter()
                .min_by_key(|e| e.last_accessed_ms)
                .map(|e| e.key.clone()),
            Self::Fifo => entries
                .iter()
                .min_by_key(|e| e.created_at_ms)
                .map(|e| e.key.clone()),
            Self::TtlSweep => entries
                .iter()
                .find(|e| e.expires_at_ms <= now_ms)
                .map(|e| e.key.clone())
                .or_else(|| Self::Lru.select_victim(entries, now_ms)),
        }
    }
}

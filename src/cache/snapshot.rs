// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Best-effort snapshot persistence for cache entries.
//!
//! The cache treats persistence as an injected capability: a [`SnapshotSink`]
//! receives serialized entries after every write and delete, and hands them
//! back on startup. Sink failures are logged by the caller and never affect
//! the cache itself, so a non-persistent cache is just a cache without a sink.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use dashmap::DashMap;
use parking_lot::Mutex;

/// A durable key/value store for serialized cache entries.
pub trait SnapshotSink: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
    /// All stored entries, for startup restore.
    fn load(&self) -> io::Result<Vec<(String, Vec<u8>)>>;
}

/// In-memory sink, for tests and non-persistent substitution.
#[derive(Default)]
pub struct MemorySnapshotSink {
    entries: DashMap<String, Vec<u8>>,
}

impl MemorySnapshotSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotSink for MemorySnapshotSink {
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn load(&self) -> io::Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }
}

/// Single-file sink: the whole entry map is rewritten on every change.
///
/// Write amplification is fine at cache scale (hundreds of entries); the
/// payoff is a trivially inspectable JSON file.
pub struct FileSnapshotSink {
    path: PathBuf,
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl FileSnapshotSink {
    /// Open a sink at `path`, reading any existing snapshot file.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, Vec<u8>>) -> io::Result<()> {
        let bytes = serde_json::to_vec(entries)?;
        std::fs::write(&self.path, bytes)
    }
}

impl SnapshotSink for FileSnapshotSink {
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), bytes.to_vec());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn load(&self) -> io::Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_snapshot_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hybrid_snapshot_{}_{}.json", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_sink_round_trip() {
        let sink = MemorySnapshotSink::new();

        sink.put("k1", b"one").unwrap();
        sink.put("k2", b"two").unwrap();
        sink.remove("k1").unwrap();

        let mut loaded = sink.load().unwrap();
        loaded.sort();

        assert_eq!(loaded, vec![("k2".to_string(), b"two".to_vec())]);
    }

    #[test]
    fn test_file_sink_round_trip() {
        let path = unique_snapshot_path("round_trip");

        {
            let sink = FileSnapshotSink::open(&path).unwrap();
            sink.put("k1", b"payload-1").unwrap();
            sink.put("k2", b"payload-2").unwrap();
        }

        // Reopen and read back
        let sink = FileSnapshotSink::open(&path).unwrap();
        let mut loaded = sink.load().unwrap();
        loaded.sort();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], ("k1".to_string(), b"payload-1".to_vec()));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_sink_remove_persists() {
        let path = unique_snapshot_path("remove");

        {
            let sink = FileSnapshotSink::open(&path).unwrap();
            sink.put("k1", b"one").unwrap();
            sink.remove("k1").unwrap();
        }

        let sink = FileSnapshotSink::open(&path).unwrap();
        assert!(sink.load().unwrap().is_empty());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_sink_missing_file_is_empty() {
        let path = unique_snapshot_path("missing");
        let sink = FileSnapshotSink::open(&path).unwrap();
        assert!(sink.load().unwrap().is_empty());
    }
}

//! cache/breakpoints.rs — per-file breakpoint-set cache with mtime invalidation.
//!
//! Grounded on `dapper/_frame_eval/cache_manager.py`'s `BreakpointCache`
//! (LRU over file paths, per-entry source-mtime check on get).

use std::time::SystemTime;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::breakpoint::BreakpointSet;
use crate::cache::CacheStatistics;

/// Supplies a file's last-modified time. Abstracted so tests can simulate
/// mtime changes without touching the filesystem.
pub trait MtimeSource: Send + Sync {
    fn mtime(&self, file: &str) -> Option<SystemTime>;
}

/// Default source backed by `std::fs::metadata`.
pub struct FsMtimeSource;

impl MtimeSource for FsMtimeSource {
    fn mtime(&self, file: &str) -> Option<SystemTime> {
        std::fs::metadata(file).and_then(|m| m.modified()).ok()
    }
}

struct Entry {
    set: BreakpointSet,
    mtime: Option<SystemTime>,
}

struct Inner {
    entries: IndexMap<String, Entry>,
    capacity: usize,
    stats: CacheStatistics,
}

/// Bounded-size LRU over file paths, each entry invalidated when the file's
/// mtime has advanced since it was cached.
pub struct BreakpointCache {
    inner: Mutex<Inner>,
    mtime_source: Box<dyn MtimeSource>,
}

impl BreakpointCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_mtime_source(capacity, Box::new(FsMtimeSource))
    }

    pub fn with_mtime_source(capacity: usize, mtime_source: Box<dyn MtimeSource>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                capacity: capacity.max(1),
                stats: CacheStatistics::default(),
            }),
            mtime_source,
        }
    }

    /// Returns a defensive copy of the cached set, or `None` on a miss or a
    /// stale entry (the file's mtime advanced since it was cached — callers
    /// must ask the DAP layer for fresh breakpoints).
    pub fn get(&self, file: &str) -> Option<BreakpointSet> {
        let mut inner = self.inner.lock();
        let Some(idx) = inner.entries.get_index_of(file) else {
            inner.stats.misses += 1;
            return None;
        };
        let current_mtime = self.mtime_source.mtime(file);
        let cached_mtime = inner.entries.get_index(idx).unwrap().1.mtime;
        let stale = matches!((current_mtime, cached_mtime), (Some(now), Some(then)) if now > then);
        if stale {
            inner.entries.shift_remove_index(idx);
            inner.stats.misses += 1;
            inner.stats.evictions += 1;
            return None;
        }
        let set = inner.entries.get_index(idx).unwrap().1.set.clone();
        if let Some((k, v)) = inner.entries.shift_remove_index(idx) {
            inner.entries.insert(k, v);
        }
        inner.stats.hits += 1;
        Some(set)
    }

    /// Stores a defensive copy of `set`, recording the file's current mtime.
    pub fn set(&self, file: impl Into<String>, set: BreakpointSet) {
        let file = file.into();
        let mtime = self.mtime_source.mtime(&file);
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.entries.get_index_of(&file) {
            inner.entries.shift_remove_index(idx);
        }
        inner.entries.insert(file, Entry { set, mtime });
        if inner.entries.len() > inner.capacity {
            inner.entries.shift_remove_index(0);
            inner.stats.evictions += 1;
        }
    }

    pub fn remove(&self, file: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.entries.shift_remove(file).is_some()
    }

    /// Host-driven maintenance: eagerly evicts every entry whose file's mtime
    /// has advanced since it was cached, rather than waiting for the next
    /// `get()` to discover the staleness lazily. Never called from the
    /// dispatch hot path. Returns the number of entries evicted.
    pub fn cleanup_stale(&self) -> usize {
        let mut inner = self.inner.lock();
        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter(|(file, entry)| {
                let current = self.mtime_source.mtime(file);
                matches!((current, entry.mtime), (Some(now), Some(then)) if now > then)
            })
            .map(|(file, _)| file.clone())
            .collect();
        for file in &stale {
            inner.entries.shift_remove(file);
        }
        inner.stats.evictions += stale.len() as u64;
        stale.len()
    }

    pub fn statistics(&self) -> CacheStatistics {
        let inner = self.inner.lock();
        let mut stats = inner.stats;
        stats.total_entries = inner.entries.len();
        stats.memory_estimate_bytes = inner.entries.len() * std::mem::size_of::<Entry>();
        stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

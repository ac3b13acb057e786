//! cache/code_info.rs — weak-keyed, bounded, TTL'd cache of per-code-object
//! analysis results.
//!
//! Grounded on `dapper/_frame_eval/cache_manager.py`'s `FuncCodeInfoCache`
//! (`weakref.WeakKeyDictionary` + `OrderedDict` LRU + per-entry timestamps).
//! Rust has no garbage-collected code objects, so per SPEC_FULL §9 the
//! embedder owns an `Arc<CodeObjectInner>` and we key on `Weak<CodeObjectInner>`
//! compared by pointer identity ([`Weak::as_ptr`]); a dead weak reference is
//! observed — and purged — on the next cache operation.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::breakpoint::BreakpointSet;
use crate::cache::CacheStatistics;

/// A runtime code object, as seen by this crate. The embedder is the sole
/// owner of the `Arc`; this crate never constructs or strongly holds one.
#[derive(Debug)]
pub struct CodeObjectInner {
    pub file: String,
    pub function: String,
    pub first_line: u32,
}

pub type CodeObjectHandle = Arc<CodeObjectInner>;

/// Per-code-object analysis record. `always_skip = true` iff the file has no
/// breakpoints anywhere in this code object's line range and no
/// function-name breakpoint matches.
#[derive(Debug, Clone)]
pub struct FuncCodeInfo {
    pub file: String,
    pub always_skip: bool,
    pub breakpoint_found: bool,
    pub breakpoint_lines: BreakpointSet,
    pub last_check: Instant,
}

struct WeakKey(Weak<CodeObjectInner>);

impl WeakKey {
    fn ptr(&self) -> *const CodeObjectInner {
        self.0.as_ptr()
    }
    fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl PartialEq for WeakKey {
    fn eq(&self, other: &Self) -> bool {
        self.ptr() == other.ptr()
    }
}
impl Eq for WeakKey {}
impl Hash for WeakKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr().hash(state);
    }
}

struct Inner {
    /// Insertion-order = recency order; front is LRU, back is MRU.
    entries: IndexMap<WeakKey, FuncCodeInfo>,
    capacity: usize,
    ttl: Duration,
    stats: CacheStatistics,
}

impl Inner {
    fn purge_dead(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.is_alive());
        let removed = before - self.entries.len();
        self.stats.evictions += removed as u64;
    }

    fn promote(&mut self, idx: usize) {
        if let Some((k, v)) = self.entries.shift_remove_index(idx) {
            self.entries.insert(k, v);
        }
    }
}

/// Weak-keyed LRU+TTL cache from code object identity to [`FuncCodeInfo`].
pub struct FuncCodeInfoCache {
    inner: Mutex<Inner>,
}

impl FuncCodeInfoCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                capacity: capacity.max(1),
                ttl,
                stats: CacheStatistics::default(),
            }),
        }
    }

    /// Looks up `code`. Promotes to MRU and returns a copy on a fresh hit;
    /// evicts and returns `None` if the entry has aged past the TTL.
    pub fn get(&self, code: &CodeObjectHandle) -> Option<FuncCodeInfo> {
        let mut inner = self.inner.lock();
        inner.purge_dead();
        let key = WeakKey(Arc::downgrade(code));
        let Some(idx) = inner.entries.get_index_of(&key) else {
            inner.stats.misses += 1;
            return None;
        };
        let fresh = inner.entries.get_index(idx).unwrap().1.last_check.elapsed() < inner.ttl;
        if !fresh {
            inner.entries.shift_remove_index(idx);
            inner.stats.misses += 1;
            inner.stats.evictions += 1;
            return None;
        }
        let info = inner.entries.get_index(idx).unwrap().1.clone();
        inner.promote(idx);
        inner.stats.hits += 1;
        Some(info)
    }

    /// Inserts or replaces the entry for `code`, promoting it to MRU and
    /// evicting the LRU tail if this insertion pushed the cache over capacity.
    pub fn set(&self, code: &CodeObjectHandle, mut info: FuncCodeInfo) {
        let mut inner = self.inner.lock();
        inner.purge_dead();
        info.last_check = Instant::now();
        let key = WeakKey(Arc::downgrade(code));
        if let Some(idx) = inner.entries.get_index_of(&key) {
            inner.entries.shift_remove_index(idx);
        }
        inner.entries.insert(key, info);
        if inner.entries.len() > inner.capacity {
            inner.entries.shift_remove_index(0);
            inner.stats.evictions += 1;
        }
    }

    /// Drops every entry whose `file` matches, used when breakpoints change
    /// for that file (see [`crate::dispatcher::SelectiveTraceDispatcher::update_breakpoints`]).
    pub fn invalidate_file(&self, file: &str) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|_, v| v.file != file);
    }

    /// Resolves a function-name breakpoint against code objects this cache
    /// has already observed (via [`Self::set`]) and that are still alive.
    /// Returns `(file, first_line)` for every live match, newest-seen first.
    /// A function the dispatcher hasn't seen a frame for yet simply has no
    /// entry here, so callers must treat an empty result as "not yet
    /// resolvable", not "does not exist".
    pub fn resolve_function(&self, name: &str) -> Vec<(String, u32)> {
        let mut inner = self.inner.lock();
        inner.purge_dead();
        inner
            .entries
            .keys()
            .rev()
            .filter_map(|k| k.0.upgrade())
            .filter(|code| code.function == name)
            .map(|code| (code.file.clone(), code.first_line))
            .collect()
    }

    /// Host-driven maintenance: removes every entry older than the TTL.
    /// Never called from the dispatch hot path.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.purge_dead();
        let ttl = inner.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, v| v.last_check.elapsed() < ttl);
        let removed = before - inner.entries.len();
        inner.stats.evictions += removed as u64;
        removed
    }

    pub fn statistics(&self) -> CacheStatistics {
        let mut inner = self.inner.lock();
        inner.purge_dead();
        let mut stats = inner.stats;
        stats.total_entries = inner.entries.len();
        stats.memory_estimate_bytes = inner.entries.len() * std::mem::size_of::<FuncCodeInfo>();
        stats
    }

    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.purge_dead();
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(file: &str) -> CodeObjectHandle {
        Arc::new(CodeObjectInner { file: file.into(), function: "f".into(), first_line: 1 })
    }

    fn info(file: &str) -> FuncCodeInfo {
        FuncCodeInfo {
            file: file.into(),
            always_skip: false,
            breakpoint_found: false,
            breakpoint_lines: BreakpointSet::new(),
            last_check: Instant::now(),
        }
    }

    #[test]
    fn hit_after_set() {
        let cache = FuncCodeInfoCache::new(10, Duration::from_secs(300));
        let c = code("/a.py");
        cache.set(&c, info("/a.py"));
        assert!(cache.get(&c).is_some());
        let stats = cache.statistics();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn miss_for_unknown_code_object() {
        let cache = FuncCodeInfoCache::new(10, Duration::from_secs(300));
        let c = code("/a.py");
        assert!(cache.get(&c).is_none());
        assert_eq!(cache.statistics().misses, 1);
    }

    #[test]
    fn weak_eviction_on_drop() {
        let cache = FuncCodeInfoCache::new(10, Duration::from_secs(300));
        let c = code("/a.py");
        cache.set(&c, info("/a.py"));
        assert_eq!(cache.len(), 1);
        drop(c);
        // The next cache operation observes the dead weak ref and purges it.
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.statistics().total_entries, 0);
    }

    #[test]
    fn ttl_expiry_evicts_on_get() {
        let cache = FuncCodeInfoCache::new(10, Duration::from_millis(1));
        let c = code("/a.py");
        cache.set(&c, info("/a.py"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&c).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn lru_eviction_order() {
        let cache = FuncCodeInfoCache::new(2, Duration::from_secs(300));
        let a = code("/a.py");
        let b = code("/b.py");
        let c3 = code("/c.py");
        cache.set(&a, info("/a.py"));
        cache.set(&b, info("/b.py"));
        cache.set(&c3, info("/c.py")); // evicts `a`, the least-recently-used
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c3).is_some());
    }

    #[test]
    fn invalidate_file_drops_matching_entries() {
        let cache = FuncCodeInfoCache::new(10, Duration::from_secs(300));
        let a = code("/a.py");
        cache.set(&a, info("/a.py"));
        cache.invalidate_file("/a.py");
        assert!(cache.get(&a).is_none());
    }

    #[test]
    fn resolve_function_finds_live_match_by_name() {
        let cache = FuncCodeInfoCache::new(10, Duration::from_secs(300));
        let c = Arc::new(CodeObjectInner { file: "/a.py".into(), function: "handle_request".into(), first_line: 40 });
        cache.set(&c, info("/a.py"));
        let matches = cache.resolve_function("handle_request");
        assert_eq!(matches, vec![("/a.py".to_string(), 40)]);
        assert!(cache.resolve_function("no_such_fn").is_empty());
    }

    #[test]
    fn resolve_function_ignores_dead_code_objects() {
        let cache = FuncCodeInfoCache::new(10, Duration::from_secs(300));
        let c = Arc::new(CodeObjectInner { file: "/a.py".into(), function: "gone".into(), first_line: 1 });
        cache.set(&c, info("/a.py"));
        drop(c);
        assert!(cache.resolve_function("gone").is_empty());
    }
}

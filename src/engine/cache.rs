// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoded buffers by file path.
//!
//! The lock only guards the map. Decoding always happens outside of it, either on the caller's
//! thread (high priority warms, misses in the worker) or on the warm pool.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::warm::{WarmPool, DEFAULT_WARM_BACKLOG, DEFAULT_WARM_THREADS};
use crate::audio::{Backend, Buffer};

/// Default number of cached buffers.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

struct CacheState {
    entries: LruCache<PathBuf, Buffer>,
    /// Paths handed to the warm pool whose decode hasn't come back yet.
    pending: HashSet<PathBuf>,
}

/// A bounded, least recently used cache of decoded buffers.
pub struct BufferCache {
    backend: Arc<dyn Backend>,
    state: Mutex<CacheState>,
    warm_pool: WarmPool,
}

impl BufferCache {
    pub fn new(backend: Arc<dyn Backend>, capacity: usize) -> BufferCache {
        BufferCache::with_warm_pool(
            backend,
            capacity,
            DEFAULT_WARM_THREADS,
            DEFAULT_WARM_BACKLOG,
        )
    }

    /// Creates a cache whose background warms run on the given number of threads.
    pub fn with_warm_pool(
        backend: Arc<dyn Backend>,
        capacity: usize,
        warm_threads: usize,
        warm_backlog: usize,
    ) -> BufferCache {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        BufferCache {
            warm_pool: WarmPool::new(backend.clone(), warm_threads, warm_backlog),
            backend,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                pending: HashSet::new(),
            }),
        }
    }

    /// Looks up a buffer, marking it as recently used.
    pub fn get(&self, path: &Path) -> Option<Buffer> {
        self.collect_warmed();
        self.state.lock().entries.get(path).cloned()
    }

    /// Inserts a buffer. Returns the path evicted to make room, if any.
    pub fn put(&self, path: PathBuf, buffer: Buffer) -> Option<PathBuf> {
        let mut state = self.state.lock();
        Self::insert(&mut state, path, buffer)
    }

    fn insert(state: &mut CacheState, path: PathBuf, buffer: Buffer) -> Option<PathBuf> {
        state.pending.remove(&path);
        match state.entries.push(path.clone(), buffer) {
            Some((evicted, _)) if evicted != path => {
                debug!(path = ?evicted, "Evicted cached buffer");
                Some(evicted)
            }
            _ => None,
        }
    }

    /// Returns true if the path is cached. Doesn't affect eviction order.
    pub fn contains(&self, path: &Path) -> bool {
        self.state.lock().entries.contains(path)
    }

    /// Makes sure the path is, or soon will be, cached.
    ///
    /// High priority warms decode on the calling thread and the buffer is cached on return.
    /// Otherwise the decode is handed to the warm pool and this returns immediately; false
    /// means the warm was dropped because the pool's backlog is full.
    pub fn warm(&self, path: &Path, high_priority: bool) -> bool {
        if high_priority {
            if self.contains(path) {
                return true;
            }
            return match self.backend.decode(path) {
                Ok(buffer) => {
                    self.put(path.to_path_buf(), buffer);
                    true
                }
                Err(e) => {
                    warn!(path = ?path, err = %e, "Unable to warm sound");
                    false
                }
            };
        }

        {
            let mut state = self.state.lock();
            if state.entries.contains(path) || !state.pending.insert(path.to_path_buf()) {
                return true;
            }
        }

        if self.warm_pool.submit(path.to_path_buf()) {
            true
        } else {
            self.state.lock().pending.remove(path);
            false
        }
    }

    /// Moves finished background decodes into the cache. Returns the number inserted.
    pub fn collect_warmed(&self) -> usize {
        let finished = self.warm_pool.finished();
        if finished.is_empty() {
            return 0;
        }

        let mut state = self.state.lock();
        let mut inserted = 0;
        for warmed in finished {
            match warmed.buffer {
                // A real request may have decoded it in the meantime.
                Some(buffer) if !state.entries.contains(&warmed.path) => {
                    Self::insert(&mut state, warmed.path, buffer);
                    inserted += 1;
                }
                _ => {
                    state.pending.remove(&warmed.path);
                }
            }
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }

    /// Total memory held by cached buffers, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(_, buffer)| buffer.memory_size())
            .sum()
    }

    /// Drops every cached buffer. Decodes still in flight land in the cache later.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.pending.clear();
    }

    /// Stops the warm pool. Later low priority warms are dropped.
    pub fn shutdown(&self) {
        self.warm_pool.shutdown();
    }
}

impl std::fmt::Debug for BufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BufferCache")
            .field("entries", &state.entries.len())
            .field("pending", &state.pending.len())
            .field("capacity", &state.entries.cap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::mock;
    use crate::test::eventually;

    fn cache(capacity: usize) -> (mock::Backend, BufferCache) {
        let backend = mock::Backend::get("mock");
        let cache = BufferCache::new(Arc::new(backend.clone()), capacity);
        (backend, cache)
    }

    fn buffer() -> Buffer {
        Buffer::silence(Duration::from_millis(10), 1, 1000)
    }

    fn path(i: usize) -> PathBuf {
        PathBuf::from(format!("{}.wav", i))
    }

    #[test]
    fn test_bounded_with_one_eviction() {
        let (_, cache) = cache(DEFAULT_CACHE_CAPACITY);
        for i in 0..DEFAULT_CACHE_CAPACITY {
            assert!(cache.put(path(i), buffer()).is_none());
        }
        assert_eq!(cache.len(), DEFAULT_CACHE_CAPACITY);

        let evicted = cache.put(path(DEFAULT_CACHE_CAPACITY), buffer());
        assert_eq!(evicted, Some(path(0)));
        assert_eq!(cache.len(), DEFAULT_CACHE_CAPACITY);

        let missing = (0..=DEFAULT_CACHE_CAPACITY)
            .filter(|i| !cache.contains(&path(*i)))
            .count();
        assert_eq!(missing, 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (_, cache) = cache(3);
        cache.put(path(0), buffer());
        cache.put(path(1), buffer());
        cache.put(path(2), buffer());

        assert!(cache.get(&path(0)).is_some());
        assert_eq!(cache.put(path(3), buffer()), Some(path(1)));
        assert!(cache.contains(&path(0)));
        assert!(!cache.contains(&path(1)));
    }

    #[test]
    fn test_replacing_does_not_evict() {
        let (_, cache) = cache(2);
        cache.put(path(0), buffer());
        cache.put(path(1), buffer());
        assert!(cache.put(path(1), buffer()).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_high_priority_warm_is_synchronous() {
        let (backend, cache) = cache(10);
        backend.set_duration("a.wav", Duration::from_millis(300));

        assert!(cache.warm(Path::new("a.wav"), true));
        let buffer = cache.get(Path::new("a.wav"));
        assert_eq!(
            buffer.map(|b| b.duration()),
            Some(Duration::from_millis(300))
        );

        // Already cached, no second decode.
        assert!(cache.warm(Path::new("a.wav"), true));
        assert_eq!(backend.decode_count(Path::new("a.wav")), 1);
    }

    #[test]
    fn test_failed_warm_stays_a_miss() {
        let (backend, cache) = cache(10);
        backend.fail_decode("broken.wav");

        assert!(!cache.warm(Path::new("broken.wav"), true));
        assert!(cache.warm(Path::new("broken.wav"), false));
        eventually(
            || {
                cache.collect_warmed();
                cache.state.lock().pending.is_empty()
            },
            "Background decode never finished",
        );
        assert!(cache.get(Path::new("broken.wav")).is_none());
    }

    #[test]
    fn test_background_warm() {
        let (backend, cache) = cache(10);
        backend.set_decode_delay(Duration::from_millis(20));

        assert!(cache.warm(Path::new("a.wav"), false));
        // Warming again while pending doesn't decode twice.
        assert!(cache.warm(Path::new("a.wav"), false));

        eventually(
            || cache.get(Path::new("a.wav")).is_some(),
            "Warmed buffer never arrived",
        );
        assert_eq!(backend.decode_count(Path::new("a.wav")), 1);
    }

    #[test]
    fn test_clear() {
        let (_, cache) = cache(10);
        cache.put(path(0), buffer());
        assert!(!cache.is_empty());
        assert_eq!(cache.memory_usage(), 10 * 4);
        cache.clear();
        assert!(cache.is_empty());
    }
}

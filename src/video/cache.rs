//! Caches of native objects keyed by the handles of logical resources.

use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

use crate::utils::prelude::*;
use crate::video::resource::{Generation, ResourceKind};

/// Values stored in a `HandleCache`.
pub trait Cached {
    /// Returns true if someone else still shares ownership of the native object,
    /// in which case it must not be destroyed yet.
    fn is_shared(&self) -> bool {
        false
    }
}

/// The native side of a logical resource.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    /// The logical generation of the last upload.
    pub generation: u64,
    /// The parameter generation of the last upload, for kinds that have one.
    pub parameters: u64,
    pub last_used: Instant,
    /// Zero means never.
    pub expiration: Duration,
    /// Set when a collection found this entry removable but still referenced.
    pub expired: bool,
    /// The number of in-flight commands referencing this entry.
    pub pins: u32,
    /// Set once the logical resource has been dropped.
    pub released: bool,
}

impl<T> CacheEntry<T> {
    /// Returns true if the logical resource changed since the last upload.
    #[inline]
    pub fn is_stale(&self, generation: &Generation) -> bool {
        generation.is_newer_than(self.generation)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    fn is_candidate(&self, now: Instant) -> bool {
        self.released
            || (self.expiration > Duration::from_secs(0)
                && now.saturating_duration_since(self.last_used) > self.expiration)
    }
}

/// Statistics of a collection pass.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CollectStats {
    pub destroyed: usize,
    pub soft_deleted: usize,
}

/// Maps logical handles of one kind to native objects.
pub struct HandleCache<H: HandleLike, T: Cached> {
    kind: ResourceKind,
    entries: FastHashMap<H, CacheEntry<T>>,
    retired: Vec<T>,
}

impl<H: HandleLike, T: Cached> HandleCache<H, T> {
    pub fn new(kind: ResourceKind) -> Self {
        HandleCache {
            kind,
            entries: FastHashMap::default(),
            retired: Vec::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[inline]
    pub fn get(&self, handle: H) -> Option<&CacheEntry<T>> {
        self.entries.get(&handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut CacheEntry<T>> {
        self.entries.get_mut(&handle)
    }

    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Inserts a fresh entry whose generation is the not-yet-uploaded sentinel.
    pub fn insert(
        &mut self,
        handle: H,
        value: T,
        expiration: Duration,
        now: Instant,
    ) -> &mut CacheEntry<T> {
        let entry = CacheEntry {
            value,
            generation: Generation::UNUPLOADED,
            parameters: Generation::UNUPLOADED,
            last_used: now,
            expiration,
            expired: false,
            pins: 0,
            released: false,
        };

        debug!("[{:?}Cache] cache miss of {:?}.", self.kind, handle);
        match self.entries.entry(handle) {
            Entry::Occupied(mut v) => {
                v.insert(entry);
                v.into_mut()
            }
            Entry::Vacant(v) => v.insert(entry),
        }
    }

    /// Refreshes the last-used time, reviving the entry if it was soft-deleted
    /// because of its expiration.
    pub fn touch(&mut self, handle: H, now: Instant) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.last_used = now;
            if !entry.released {
                entry.expired = false;
            }
        }
    }

    pub fn pin(&mut self, handle: H) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.pins += 1;
        }
    }

    pub fn unpin(&mut self, handle: H) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            debug_assert!(entry.pins > 0);
            entry.pins = entry.pins.saturating_sub(1);
        }
    }

    /// Marks the entry of a dropped logical resource. Destruction is deferred to
    /// the next `collect`.
    pub fn release(&mut self, handle: H) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.released = true;
        }
    }

    /// Keeps a replaced native object until the next collection, commands
    /// recorded earlier may still reference it.
    pub fn retire(&mut self, value: T) {
        self.retired.push(value);
    }

    /// Removes released entries and entries idle longer than their expiration.
    /// Candidates that are pinned or shared are only marked as `expired`, and
    /// retried by later passes.
    pub fn collect<F>(&mut self, now: Instant, mut destroy: F) -> CollectStats
    where
        F: FnMut(T),
    {
        let mut stats = CollectStats::default();

        for value in self.retired.drain(..) {
            destroy(value);
            stats.destroyed += 1;
        }

        let mut removes = Vec::new();
        for (handle, entry) in &mut self.entries {
            if !entry.is_candidate(now) {
                continue;
            }

            if entry.is_pinned() || entry.value.is_shared() {
                entry.expired = true;
                stats.soft_deleted += 1;
            } else {
                removes.push(*handle);
            }
        }

        for handle in removes {
            if let Some(entry) = self.entries.remove(&handle) {
                debug!("[{:?}Cache] evicts {:?}.", self.kind, handle);
                destroy(entry.value);
                stats.destroyed += 1;
            }
        }

        stats
    }

    /// Destroys every native object regardless of pins.
    pub fn clear<F>(&mut self, mut destroy: F)
    where
        F: FnMut(T),
    {
        for value in self.retired.drain(..) {
            destroy(value);
        }

        for (_, entry) in self.entries.drain() {
            destroy(entry.value);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::utils::handle::Handle;

    impl Cached for u32 {}

    impl Cached for Arc<u32> {
        fn is_shared(&self) -> bool {
            Arc::strong_count(self) > 1
        }
    }

    #[test]
    fn soft_delete() {
        let now = Instant::now();
        let mut cache: HandleCache<Handle, u32> = HandleCache::new(ResourceKind::Texture);
        let h = Handle::new(1, 1);

        cache.insert(h, 7, Duration::from_secs(0), now);
        cache.pin(h);
        cache.release(h);

        let mut destroyed = Vec::new();
        let stats = cache.collect(now, |v| destroyed.push(v));
        assert_eq!(stats.soft_deleted, 1);
        assert!(destroyed.is_empty());
        assert!(cache.get(h).unwrap().expired);

        cache.unpin(h);
        cache.collect(now, |v| destroyed.push(v));
        cache.collect(now, |v| destroyed.push(v));
        assert_eq!(destroyed, vec![7]);
        assert!(cache.is_empty());
    }

    #[test]
    fn expiration() {
        let now = Instant::now();
        let mut cache: HandleCache<Handle, u32> = HandleCache::new(ResourceKind::Buffer);
        let h1 = Handle::new(1, 1);
        let h2 = Handle::new(2, 1);

        cache.insert(h1, 1, Duration::from_secs(1), now);
        cache.insert(h2, 2, Duration::from_secs(0), now);

        let later = now + Duration::from_secs(10);
        let mut destroyed = Vec::new();
        cache.collect(later, |v| destroyed.push(v));
        assert_eq!(destroyed, vec![1]);
        assert!(cache.contains(h2));
    }

    #[test]
    fn shared_values() {
        let now = Instant::now();
        let mut cache: HandleCache<Handle, Arc<u32>> = HandleCache::new(ResourceKind::Buffer);
        let h = Handle::new(1, 1);

        let value = Arc::new(3);
        cache.insert(h, value.clone(), Duration::from_secs(0), now);
        cache.release(h);

        let mut destroyed = 0;
        cache.collect(now, |_| destroyed += 1);
        assert_eq!(destroyed, 0);

        drop(value);
        cache.collect(now, |_| destroyed += 1);
        assert_eq!(destroyed, 1);
    }

    #[test]
    fn touch_revives() {
        let now = Instant::now();
        let mut cache: HandleCache<Handle, u32> = HandleCache::new(ResourceKind::Program);
        let h = Handle::new(1, 1);

        cache.insert(h, 1, Duration::from_secs(1), now);
        cache.pin(h);

        let later = now + Duration::from_secs(2);
        cache.collect(later, |_| {});
        assert!(cache.get(h).unwrap().expired);

        cache.touch(h, later);
        assert!(!cache.get(h).unwrap().expired);
        cache.unpin(h);
        assert_eq!(cache.collect(later, |_| {}).destroyed, 0);
    }
}

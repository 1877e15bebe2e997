//! Per-thread tracking of changed sub-ranges.

use std::cmp;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::utils::prelude::*;

/// A region that could be merged with others into a bounding region.
pub trait Region: Copy + Default + PartialEq + ::std::fmt::Debug {
    fn is_empty(&self) -> bool;

    /// Returns a region covering both `self` and `rhs`. The result may be larger
    /// than the exact union, but never smaller.
    fn union(&self, rhs: &Self) -> Self;
}

/// A half-open byte range `[begin, end)`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub begin: usize,
    pub end: usize,
}

impl ByteRange {
    #[inline]
    pub fn new(begin: usize, end: usize) -> Self {
        assert!(begin <= end);
        ByteRange { begin, end }
    }

    /// Creates a range from `offset` and `size`.
    #[inline]
    pub fn with_size(offset: usize, size: usize) -> Self {
        ByteRange::new(offset, offset + size)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// Clamps the range into `[0, len)`.
    pub fn clamp(&self, len: usize) -> Self {
        let end = cmp::min(self.end, len);
        let begin = cmp::min(self.begin, end);
        ByteRange { begin, end }
    }
}

impl Region for ByteRange {
    #[inline]
    fn is_empty(&self) -> bool {
        ByteRange::is_empty(self)
    }

    fn union(&self, rhs: &Self) -> Self {
        if Region::is_empty(self) {
            return *rhs;
        }

        if Region::is_empty(rhs) {
            return *self;
        }

        ByteRange {
            begin: cmp::min(self.begin, rhs.begin),
            end: cmp::max(self.end, rhs.end),
        }
    }
}

impl Region for Rect {
    #[inline]
    fn is_empty(&self) -> bool {
        Rect::is_empty(self)
    }

    #[inline]
    fn union(&self, rhs: &Self) -> Self {
        Rect::union(self, rhs)
    }
}

/// The pending dirty regions of a resource, one slot per render thread.
///
/// Every `invalidate` is observed by all the threads, and each thread consumes
/// its own slot with `take` without touching the slots of others.
#[derive(Debug)]
pub struct DirtyRegion<R: Region> {
    threads: Arc<AtomicUsize>,
    slots: RwLock<Vec<Mutex<R>>>,
}

impl<R: Region> DirtyRegion<R> {
    /// Creates a tracker whose slot count follows the shared thread counter.
    pub fn new(threads: Arc<AtomicUsize>) -> Self {
        let len = threads.load(Ordering::Acquire);
        DirtyRegion {
            threads,
            slots: RwLock::new((0..len).map(|_| Mutex::new(R::default())).collect()),
        }
    }

    /// Creates a tracker with a fixed number of threads.
    pub fn with_threads(len: usize) -> Self {
        DirtyRegion::new(Arc::new(AtomicUsize::new(len)))
    }

    /// The number of threads registered.
    #[inline]
    pub fn threads(&self) -> usize {
        self.threads.load(Ordering::Acquire)
    }

    /// Marks `region` dirty for every thread.
    pub fn invalidate(&self, region: R) {
        if region.is_empty() {
            return;
        }

        self.grow();
        let slots = self.slots.read().unwrap();
        for slot in slots.iter() {
            let mut slot = slot.lock().unwrap();
            *slot = slot.union(&region);
        }
    }

    /// Returns and clears the pending region of thread `index`.
    pub fn take(&self, index: usize) -> R {
        assert!(
            index < self.threads(),
            "Thread index {} out of bounds {}.",
            index,
            self.threads()
        );

        self.grow();
        let slots = self.slots.read().unwrap();
        let mut slot = slots[index].lock().unwrap();
        ::std::mem::replace(&mut *slot, R::default())
    }

    /// Returns the pending region of thread `index` without clearing it.
    pub fn peek(&self, index: usize) -> R {
        assert!(index < self.threads());

        let slots = self.slots.read().unwrap();
        slots
            .get(index)
            .map(|v| *v.lock().unwrap())
            .unwrap_or_default()
    }

    fn grow(&self) {
        let len = self.threads();
        if self.slots.read().unwrap().len() >= len {
            return;
        }

        let mut slots = self.slots.write().unwrap();
        while slots.len() < len {
            slots.push(Mutex::new(R::default()));
        }
    }
}

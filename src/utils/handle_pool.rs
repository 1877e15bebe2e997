use std::cmp::Ordering;
use std::collections::binary_heap::BinaryHeap;
use std::marker::PhantomData;

use super::handle::{HandleIndex, HandleLike};

#[derive(PartialEq, Eq)]
struct InverseHandleIndex(HandleIndex);

impl PartialOrd for InverseHandleIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InverseHandleIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

/// `HandlePool` manages the manipulations of a `Handle` collection, which are
/// created with a continuous `index` field. It also have the ability to find
/// out the current status of a specified `Handle`.
///
/// Versions are odd while a handle is alive and even once it has been freed, so
/// a recycled index never compares equal to any of its former handles.
pub struct HandlePool<H: HandleLike> {
    versions: Vec<HandleIndex>,
    frees: BinaryHeap<InverseHandleIndex>,
    _phantom: PhantomData<H>,
}

impl<H: HandleLike> Default for HandlePool<H> {
    fn default() -> Self {
        HandlePool::new()
    }
}

impl<H: HandleLike> HandlePool<H> {
    /// Constructs a new, empty `HandlePool`.
    pub fn new() -> Self {
        HandlePool {
            versions: Vec::new(),
            frees: BinaryHeap::new(),
            _phantom: PhantomData,
        }
    }

    /// Creates a unused `Handle`.
    pub fn create(&mut self) -> H {
        if let Some(InverseHandleIndex(index)) = self.frees.pop() {
            // If we have available free slots.
            let index = index as usize;
            self.versions[index] += 1;
            H::new(index as HandleIndex, self.versions[index])
        } else {
            // Or we just spawn a new index and corresponding version.
            self.versions.push(1);
            H::new(self.versions.len() as HandleIndex - 1, 1)
        }
    }

    /// Returns true if this `Handle` was created by `HandlePool`, and has not been
    /// freed yet.
    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        let index = handle.index() as usize;
        self.is_alive_at(index) && (self.versions[index] == handle.version())
    }

    #[inline]
    fn is_alive_at(&self, index: usize) -> bool {
        (index < self.versions.len()) && ((self.versions[index] & 0x1) == 1)
    }

    /// Recycles the `Handle` index, and mark its version as dead.
    pub fn free(&mut self, handle: H) -> bool {
        if !self.contains(handle) {
            false
        } else {
            self.versions[handle.index() as usize] += 1;
            self.frees.push(InverseHandleIndex(handle.index()));
            true
        }
    }

    /// Returns the total number of alive handle in this `HandlePool`.
    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len() - self.frees.len()
    }

    /// Checks if the pool is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::super::handle::Handle;
    use super::*;

    #[test]
    fn basic() {
        let mut set: HandlePool<Handle> = HandlePool::new();
        assert!(set.is_empty());

        let e1 = set.create();
        assert!(e1.is_valid());
        assert!(set.contains(e1));
        assert_eq!(set.len(), 1);

        assert!(set.free(e1));
        assert!(!set.contains(e1));
        assert!(!set.free(e1));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn index_reuse() {
        let mut set: HandlePool<Handle> = HandlePool::new();

        let v: Vec<_> = (0..10).map(|_| set.create()).collect();
        for e in &v {
            set.free(*e);
        }

        for _ in 0..10 {
            let e = set.create();
            assert!((e.index() as usize) < v.len());
            assert!(v[e.index() as usize].version() != e.version());
            assert!(!set.contains(v[e.index() as usize]));
        }
    }

    #[test]
    fn smallest_index_first() {
        let mut set: HandlePool<Handle> = HandlePool::new();
        let v: Vec<_> = (0..4).map(|_| set.create()).collect();
        set.free(v[3]);
        set.free(v[1]);

        assert_eq!(set.create().index(), 1);
        assert_eq!(set.create().index(), 3);
        assert_eq!(set.create().index(), 4);
    }
}

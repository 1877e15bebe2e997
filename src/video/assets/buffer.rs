//! Linear memory blocks like vertex, index and uniform buffers.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::video::dirty::{ByteRange, DirtyRegion};
use crate::video::resource::{ResourceHeader, Resources};

impl_handle!(BufferHandle);

/// Hint abouts the intended update strategy of the data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferUsage {
    /// The data is written once and drawn many times.
    Static,
    /// The data is written occasionally and drawn many times.
    Dynamic,
    /// The data is written every frame.
    Stream,
}

#[derive(Debug)]
pub(crate) struct BufferState {
    pub usage: BufferUsage,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct BufferInner {
    pub header: ResourceHeader<BufferHandle>,
    state: RwLock<BufferState>,
    dirty: DirtyRegion<ByteRange>,
}

/// A shared block of bytes mirrored into a native buffer object.
#[derive(Clone)]
pub struct Buffer(Arc<BufferInner>);

impl_resource!(Buffer, BufferInner, BufferHandle);

impl Buffer {
    pub fn new(resources: &Resources, usage: BufferUsage, data: Vec<u8>) -> Self {
        let inner = resources.insert_buffer(move |header| BufferInner {
            dirty: DirtyRegion::new(header.threads()),
            header,
            state: RwLock::new(BufferState { usage, data }),
        });

        Buffer(inner)
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.0.state.read().unwrap().usage
    }

    /// The size of the data in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.state.read().unwrap().data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the whole content. The native store is respecified if the size
    /// changes.
    pub fn set_data(&self, data: Vec<u8>) {
        {
            let mut state = self.0.state.write().unwrap();
            state.data = data;
            self.0.dirty.invalidate(ByteRange::new(0, state.data.len()));
        }

        self.0.header.generation().bump();
    }

    /// Overwrites `[offset, offset + bytes.len())`.
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        {
            let mut state = self.0.state.write().unwrap();
            let end = offset + bytes.len();
            assert!(
                end <= state.data.len(),
                "Write [{}, {}) out of bounds {}.",
                offset,
                end,
                state.data.len()
            );

            state.data[offset..end].copy_from_slice(bytes);
            self.0.dirty.invalidate(ByteRange::new(offset, end));
        }

        self.0.header.generation().bump();
    }

    /// Marks `[offset, offset + size)` as changed.
    pub fn invalidate_region(&self, offset: usize, size: usize) {
        {
            let state = self.0.state.read().unwrap();
            assert!(offset + size <= state.data.len());
            self.0.dirty.invalidate(ByteRange::with_size(offset, size));
        }

        self.0.header.generation().bump();
    }

    /// Changes the usage hint, which respecifies the native store.
    pub fn set_usage(&self, usage: BufferUsage) {
        {
            let mut state = self.0.state.write().unwrap();
            if state.usage == usage {
                return;
            }

            state.usage = usage;
        }

        self.0.header.generation().bump();
    }

    /// Returns and clears the pending dirty range of render thread `thread`.
    #[inline]
    pub fn take_dirty_region(&self, thread: usize) -> ByteRange {
        self.0.dirty.take(thread)
    }

    #[inline]
    pub(crate) fn state(&self) -> RwLockReadGuard<BufferState> {
        self.0.state.read().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn concrete_scenario() {
        let resources = Resources::new();
        let t0 = resources.register_thread();
        let t1 = resources.register_thread();

        let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![0; 50]);
        buffer.invalidate_region(10, 20);
        buffer.invalidate_region(40, 10);

        assert_eq!(
            buffer.take_dirty_region(t0.index()),
            ByteRange::new(10, 50)
        );
        assert_eq!(
            buffer.take_dirty_region(t0.index()),
            ByteRange::default()
        );
        assert_eq!(
            buffer.take_dirty_region(t1.index()),
            ByteRange::new(10, 50)
        );
    }

    #[test]
    fn mutations_bump_generation() {
        let resources = Resources::new();
        let buffer = Buffer::new(&resources, BufferUsage::Static, vec![0; 8]);

        let g0 = buffer.generation();
        buffer.write(2, &[1, 2]);
        let g1 = buffer.generation();
        assert!(g1 > g0);

        buffer.set_usage(BufferUsage::Static);
        assert_eq!(buffer.generation(), g1);

        buffer.set_usage(BufferUsage::Stream);
        assert!(buffer.generation() > g1);
        assert_eq!(&buffer.state().data[..4], &[0, 0, 1, 2]);
    }

    #[test]
    #[should_panic]
    fn write_out_of_bounds() {
        let resources = Resources::new();
        let buffer = Buffer::new(&resources, BufferUsage::Static, vec![0; 8]);
        buffer.write(6, &[1, 2, 3]);
    }
}

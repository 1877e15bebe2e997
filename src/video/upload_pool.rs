//! A bucketed pool of reusable staging buffers.
//!
//! Every pooled buffer runs through `Free -> InUse -> PendingFence -> Free`. A
//! buffer released while the GPU may still read from it carries a completion
//! fence, and only becomes reusable once that fence is observed as signaled.
//! Fences are always polled, never waited on. A fence is polled by one caller
//! at a time, and deleted by the caller which observed it signaled.
//!
//! The pool state is guarded by a single mutex which is never held across a
//! device call, so maintenance like `trim` can run on another thread sharing
//! the objects of the render thread.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::errors::*;
use crate::video::backends::{Device, MappedMemory, NativeBuffer, NativeFence};
use crate::video::errors::Error;
use crate::video::settings::UploadPoolParams;

/// A reference to a pooled buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct UploadBuffer {
    id: u64,
    native: NativeBuffer,
    capacity: usize,
}

impl UploadBuffer {
    #[inline]
    pub fn native(&self) -> NativeBuffer {
        self.native
    }

    /// The capacity in bytes, always a power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BufferState {
    Free,
    InUse,
    PendingFence(NativeFence),
    /// The fence is being polled, other callers see the buffer as busy.
    Polling(NativeFence),
}

#[derive(Debug)]
struct PooledBuffer {
    id: u64,
    native: NativeBuffer,
    capacity: usize,
    mapping: Option<MappedMemory>,
    state: BufferState,
    last_used: Instant,
}

impl PooledBuffer {
    fn as_ref(&self) -> UploadBuffer {
        UploadBuffer {
            id: self.id,
            native: self.native,
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    buffers: Vec<PooledBuffer>,
    ids: u64,
    total_bytes: usize,
}

impl PoolState {
    fn get_mut(&mut self, id: u64) -> Option<&mut PooledBuffer> {
        self.buffers.iter_mut().find(|v| v.id == id)
    }

    fn begin_poll(&mut self, id: u64) -> Option<NativeFence> {
        let v = self.get_mut(id)?;
        match v.state {
            BufferState::PendingFence(fence) => {
                v.state = BufferState::Polling(fence);
                Some(fence)
            }
            _ => None,
        }
    }

    /// Returns true if the caller owns the signaled fence and must delete it.
    fn end_poll(&mut self, id: u64, fence: NativeFence, signaled: bool) -> bool {
        match self.get_mut(id) {
            Some(v) if v.state == BufferState::Polling(fence) => {
                v.state = if signaled {
                    BufferState::Free
                } else {
                    BufferState::PendingFence(fence)
                };

                signaled
            }
            _ => false,
        }
    }

    fn push(
        &mut self,
        native: NativeBuffer,
        capacity: usize,
        mapping: Option<MappedMemory>,
        state: BufferState,
        now: Instant,
    ) -> UploadBuffer {
        self.ids += 1;
        self.total_bytes += capacity;

        let buffer = PooledBuffer {
            id: self.ids,
            native,
            capacity,
            mapping,
            state,
            last_used: now,
        };

        let v = buffer.as_ref();
        self.buffers.push(buffer);
        v
    }
}

/// Statistics of the pool.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct UploadPoolStats {
    pub buffers: usize,
    pub total_bytes: usize,
    pub in_use: usize,
}

pub struct UploadPool {
    params: UploadPoolParams,
    state: Mutex<PoolState>,
}

impl UploadPool {
    pub fn new(params: UploadPoolParams) -> Self {
        UploadPool {
            params,
            state: Mutex::new(PoolState::default()),
        }
    }

    #[inline]
    pub fn params(&self) -> &UploadPoolParams {
        &self.params
    }

    /// Rounds `size` up to the next power of two, not less than the minimum
    /// bucket.
    pub fn bucket(&self, size: usize) -> usize {
        size.max(self.params.min_bucket).max(1).next_power_of_two()
    }

    /// Returns a buffer of at least `size` bytes in the `InUse` state. A free
    /// buffer whose capacity is within four times the rounded size is reused
    /// if there is one, otherwise a new buffer is created.
    pub fn allocate<D: Device>(
        &self,
        device: &mut D,
        size: usize,
        now: Instant,
    ) -> Result<UploadBuffer> {
        let bucket = self.bucket(size);

        {
            let mut state = self.state.lock().unwrap();
            let found = state
                .buffers
                .iter_mut()
                .filter(|v| v.state == BufferState::Free)
                .filter(|v| v.capacity >= bucket && v.capacity <= bucket * 4)
                .min_by_key(|v| v.capacity);

            if let Some(buffer) = found {
                buffer.state = BufferState::InUse;
                buffer.last_used = now;
                return Ok(buffer.as_ref());
            }
        }

        let (native, mapping) = device.create_upload_buffer(bucket)?;
        debug!("[UploadPool] creates buffer {:?} of {} bytes.", native, bucket);

        let mut state = self.state.lock().unwrap();
        Ok(state.push(native, bucket, mapping, BufferState::InUse, now))
    }

    /// Returns `buffer` to the pool. With `needs_fence`, it only becomes free
    /// once the GPU has finished the commands issued so far.
    pub fn release<D: Device>(
        &self,
        device: &mut D,
        buffer: UploadBuffer,
        needs_fence: bool,
        now: Instant,
    ) {
        let next = if needs_fence {
            match device.insert_fence() {
                Ok(fence) => BufferState::PendingFence(fence),
                Err(err) => {
                    warn!("[UploadPool] failed to insert fence, {}. Finishing instead.", err);
                    device.finish();
                    BufferState::Free
                }
            }
        } else {
            BufferState::Free
        };

        let found = {
            let mut state = self.state.lock().unwrap();
            match state.get_mut(buffer.id) {
                Some(v) => {
                    debug_assert_eq!(v.state, BufferState::InUse);
                    v.state = next;
                    v.last_used = now;
                    true
                }
                None => false,
            }
        };

        if !found {
            if let BufferState::PendingFence(fence) = next {
                device.delete_fence(fence);
            }
        }
    }

    /// Returns true while `buffer` is in use or its fence has not signaled.
    /// A signaled fence is deleted and the buffer becomes free.
    pub fn is_in_use<D: Device>(&self, device: &mut D, buffer: UploadBuffer) -> bool {
        let fence = {
            let mut state = self.state.lock().unwrap();
            match state.begin_poll(buffer.id) {
                Some(fence) => fence,
                None => {
                    return match state.get_mut(buffer.id).map(|v| v.state) {
                        None | Some(BufferState::Free) => false,
                        _ => true,
                    }
                }
            }
        };

        let signaled = device.fence_signaled(fence);
        let owned = self.state.lock().unwrap().end_poll(buffer.id, fence, signaled);
        if owned {
            device.delete_fence(fence);
        }

        !signaled
    }

    /// Polls every pending fence once, freeing the buffers whose fences have
    /// signaled. Returns the number of buffers freed.
    pub fn advance_fences<D: Device>(&self, device: &mut D) -> usize {
        let pendings: Vec<_> = {
            let mut state = self.state.lock().unwrap();
            state
                .buffers
                .iter_mut()
                .filter_map(|v| match v.state {
                    BufferState::PendingFence(fence) => {
                        v.state = BufferState::Polling(fence);
                        Some((v.id, fence))
                    }
                    _ => None,
                }).collect()
        };

        let polled: Vec<_> = pendings
            .into_iter()
            .map(|(id, fence)| (id, fence, device.fence_signaled(fence)))
            .collect();

        let owned: Vec<_> = {
            let mut state = self.state.lock().unwrap();
            polled
                .into_iter()
                .filter(|&(id, fence, signaled)| state.end_poll(id, fence, signaled))
                .map(|(_, fence, _)| fence)
                .collect()
        };

        for &fence in &owned {
            device.delete_fence(fence);
        }

        owned.len()
    }

    /// Creates free buffers, cycling through the buckets from the smallest to
    /// the largest preallocated one, until the pool holds `target` bytes.
    pub fn preallocate<D: Device>(&self, device: &mut D, target: usize, now: Instant) -> Result<()> {
        let min = self.bucket(0);
        let max = self.bucket(self.params.max_preallocate_bucket);
        let mut bucket = min;

        while self.stats().total_bytes < target {
            let (native, mapping) = device.create_upload_buffer(bucket)?;
            self.state
                .lock()
                .unwrap()
                .push(native, bucket, mapping, BufferState::Free, now);

            bucket *= 2;
            if bucket > max {
                bucket = min;
            }
        }

        info!(
            "[UploadPool] preallocated {} bytes in {} buffers.",
            self.stats().total_bytes,
            self.stats().buffers
        );

        Ok(())
    }

    /// Shrinks the pool in two passes over the free buffers, largest first. The
    /// first pass drops buffers unused for longer than the buffer expiration
    /// until the pool is not larger than `target`. The second pass drops any
    /// free buffer until the pool is not larger than `max`. Returns the number
    /// of bytes released.
    pub fn trim<D: Device>(&self, device: &mut D, target: usize, max: usize, now: Instant) -> usize {
        let expiration = self.params.buffer_expiration();
        let removes: Vec<PooledBuffer> = {
            let mut state = self.state.lock().unwrap();
            let ids = Self::select_trimmed(&state, target, max, expiration, now);
            if ids.is_empty() {
                return 0;
            }

            let (removes, keeps): (Vec<_>, Vec<_>) = ::std::mem::replace(&mut state.buffers, Vec::new())
                .into_iter()
                .partition(|v| ids.contains(&v.id));

            state.buffers = keeps;
            state.total_bytes -= removes.iter().map(|v| v.capacity).sum::<usize>();
            removes
        };

        let mut bytes = 0;
        for v in removes {
            device.delete_buffer(v.native);
            bytes += v.capacity;
        }

        debug!("[UploadPool] trimmed {} bytes.", bytes);
        bytes
    }

    fn select_trimmed(
        state: &PoolState,
        target: usize,
        max: usize,
        expiration: Duration,
        now: Instant,
    ) -> Vec<u64> {
        let mut frees: Vec<&PooledBuffer> = state
            .buffers
            .iter()
            .filter(|v| v.state == BufferState::Free)
            .collect();

        frees.sort_by(|lhs, rhs| (rhs.capacity, rhs.id).cmp(&(lhs.capacity, lhs.id)));

        let mut total = state.total_bytes;
        let mut removes = Vec::new();

        for v in &frees {
            if total <= target {
                break;
            }

            if now.saturating_duration_since(v.last_used) > expiration {
                total -= v.capacity;
                removes.push(v.id);
            }
        }

        for v in &frees {
            if total <= max {
                break;
            }

            if !removes.contains(&v.id) {
                total -= v.capacity;
                removes.push(v.id);
            }
        }

        removes
    }

    /// Writes `bytes` into `buffer` at `offset`, through the persistent mapping
    /// if there is one.
    pub fn write<D: Device>(
        &self,
        device: &mut D,
        buffer: UploadBuffer,
        offset: usize,
        bytes: &[u8],
    ) -> Result<()> {
        if offset + bytes.len() > buffer.capacity {
            return Err(Error::OutOfBounds(offset + bytes.len(), buffer.capacity).into());
        }

        let mapping = {
            let mut state = self.state.lock().unwrap();
            state.get_mut(buffer.id).and_then(|v| v.mapping)
        };

        match mapping {
            Some(mapping) => {
                mapping.write(offset, bytes);
                Ok(())
            }
            None => device.update_buffer(buffer.native, offset, bytes),
        }
    }

    /// Deletes every buffer and fence, whatever their states.
    pub fn clear<D: Device>(&self, device: &mut D) {
        let buffers = {
            let mut state = self.state.lock().unwrap();
            state.total_bytes = 0;
            ::std::mem::replace(&mut state.buffers, Vec::new())
        };

        for v in buffers {
            match v.state {
                BufferState::PendingFence(fence) | BufferState::Polling(fence) => device.delete_fence(fence),
                _ => {}
            }

            device.delete_buffer(v.native);
        }
    }

    pub fn stats(&self) -> UploadPoolStats {
        let state = self.state.lock().unwrap();
        UploadPoolStats {
            buffers: state.buffers.len(),
            total_bytes: state.total_bytes,
            in_use: state
                .buffers
                .iter()
                .filter(|v| v.state != BufferState::Free)
                .count(),
        }
    }
}

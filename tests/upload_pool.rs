extern crate lucent;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lucent::prelude::*;
use lucent::video::backends::headless::{Call, HeadlessDevice};
use lucent::video::upload_pool::UploadPool;

const KB: usize = 1024;

#[test]
fn buckets() {
    let pool = UploadPool::new(UploadPoolParams::default());
    assert_eq!(pool.bucket(0), 64 * KB);
    assert_eq!(pool.bucket(100), 64 * KB);
    assert_eq!(pool.bucket(64 * KB), 64 * KB);
    assert_eq!(pool.bucket(70000), 128 * KB);
    assert_eq!(pool.bucket(3 * 1024 * KB), 4 * 1024 * KB);
}

#[test]
fn reuse() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let a = pool.allocate(&mut device, 70000, now).unwrap();
    assert_eq!(a.capacity(), 128 * KB);
    assert_eq!(pool.stats().in_use, 1);

    pool.release(&mut device, a, false, now);
    assert_eq!(pool.stats().in_use, 0);

    let b = pool.allocate(&mut device, 64 * KB, now).unwrap();
    assert_eq!(a, b);

    let c = pool.allocate(&mut device, 64 * KB, now).unwrap();
    assert_ne!(b.native(), c.native());
    assert_eq!(c.capacity(), 64 * KB);

    let creates = device.count(|v| match v {
        Call::CreateUploadBuffer(..) => true,
        _ => false,
    });
    assert_eq!(creates, 2);
    assert_eq!(pool.stats().total_bytes, 192 * KB);
}

#[test]
fn oversized_free_buffer_is_skipped() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let a = pool.allocate(&mut device, 1024 * KB, now).unwrap();
    pool.release(&mut device, a, false, now);

    let b = pool.allocate(&mut device, 16, now).unwrap();
    assert_ne!(a.native(), b.native());
    assert_eq!(b.capacity(), 64 * KB);
}

#[test]
fn fences() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let a = pool.allocate(&mut device, 16, now).unwrap();
    pool.release(&mut device, a, true, now);
    assert_eq!(device.fences(), 1);
    assert!(pool.is_in_use(&mut device, a));
    assert_eq!(pool.stats().in_use, 1);

    let b = pool.allocate(&mut device, 16, now).unwrap();
    assert_ne!(a, b);

    assert_eq!(pool.advance_fences(&mut device), 0);
    device.signal_fences();
    assert!(!pool.is_in_use(&mut device, a));
    assert_eq!(device.fences(), 0);
    assert_eq!(pool.stats().in_use, 1);

    let c = pool.allocate(&mut device, 16, now).unwrap();
    assert_eq!(a, c);
}

#[test]
fn advance_fences() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let a = pool.allocate(&mut device, 16, now).unwrap();
    let b = pool.allocate(&mut device, 16, now).unwrap();
    pool.release(&mut device, a, true, now);
    pool.release(&mut device, b, true, now);

    let fence = device
        .calls()
        .into_iter()
        .filter_map(|v| match v {
            Call::InsertFence(fence) => Some(fence),
            _ => None,
        }).next()
        .unwrap();

    device.signal_fence(fence);
    assert_eq!(pool.advance_fences(&mut device), 1);
    assert_eq!(pool.stats().in_use, 1);
    assert!(!pool.is_in_use(&mut device, a));
    assert!(pool.is_in_use(&mut device, b));
}

#[test]
fn concurrent_polling() {
    let mut device = HeadlessDevice::new();
    let pool = Arc::new(UploadPool::new(UploadPoolParams::default()));
    let now = Instant::now();

    let buffers: Vec<_> = (0..64)
        .map(|_| pool.allocate(&mut device, 16, now).unwrap())
        .collect();

    for &v in &buffers {
        pool.release(&mut device, v, true, now);
    }

    device.signal_fences();

    let threads: Vec<_> = (0..4)
        .map(|i| {
            let pool = pool.clone();
            let buffers = buffers.clone();
            let mut device = device.share();

            thread::spawn(move || {
                if i % 2 == 0 {
                    pool.advance_fences(&mut device);
                } else {
                    for &v in &buffers {
                        pool.is_in_use(&mut device, v);
                    }
                }
            })
        }).collect();

    for v in threads {
        v.join().unwrap();
    }

    assert_eq!(device.fences(), 0);
    assert_eq!(pool.stats().in_use, 0);

    let deletes = device.count(|v| match v {
        Call::DeleteFence(..) => true,
        _ => false,
    });
    assert_eq!(deletes, 64);
}

#[test]
fn trim() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let buffers: Vec<_> = [64 * KB, 128 * KB, 256 * KB]
        .iter()
        .map(|&size| pool.allocate(&mut device, size, now).unwrap())
        .collect();

    let busy = pool.allocate(&mut device, 512 * KB, now).unwrap();

    for &v in &buffers {
        pool.release(&mut device, v, false, now);
    }

    assert_eq!(pool.trim(&mut device, 0, 640 * KB, now), 384 * KB);
    assert_eq!(pool.stats().buffers, 2);

    let soon = now + Duration::from_secs(1);
    assert_eq!(pool.trim(&mut device, 0, usize::max_value(), soon), 0);

    let later = now + Duration::from_secs(10);
    assert_eq!(pool.trim(&mut device, 0, usize::max_value(), later), 64 * KB);

    assert_eq!(pool.stats().buffers, 1);
    assert!(pool.is_in_use(&mut device, busy));
    assert_eq!(pool.trim(&mut device, 0, 0, later), 0);

    let deleted = device.count(|v| match v {
        Call::DeleteBuffer(..) => true,
        _ => false,
    });
    assert_eq!(deleted, 3);
}

#[test]
fn trim_stops_at_target() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let buffers: Vec<_> = (0..4)
        .map(|_| pool.allocate(&mut device, 64 * KB, now).unwrap())
        .collect();

    for &v in &buffers {
        pool.release(&mut device, v, false, now);
    }

    let later = now + Duration::from_secs(10);
    assert_eq!(pool.trim(&mut device, 128 * KB, usize::max_value(), later), 128 * KB);
    assert_eq!(pool.stats().total_bytes, 128 * KB);
}

#[test]
fn persistent_write() {
    let mut device = HeadlessDevice::with_persistent_mapping();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let a = pool.allocate(&mut device, 16, now).unwrap();
    pool.write(&mut device, a, 4, &[1, 2, 3]).unwrap();

    let updates = device.count(|v| match v {
        Call::UpdateBuffer(..) => true,
        _ => false,
    });
    assert_eq!(updates, 0);
    assert_eq!(&device.buffer_contents(a.native()).unwrap()[..8], &[0, 0, 0, 0, 1, 2, 3, 0]);
}

#[test]
fn write() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let a = pool.allocate(&mut device, 16, now).unwrap();
    pool.write(&mut device, a, 2, &[5, 6]).unwrap();
    assert_eq!(device.calls().last(), Some(&Call::UpdateBuffer(a.native(), 2, 2)));

    assert!(pool.write(&mut device, a, a.capacity() - 1, &[1, 2]).is_err());
}

#[test]
fn preallocate() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());

    pool.preallocate(&mut device, 200 * KB, Instant::now()).unwrap();
    let stats = pool.stats();
    assert_eq!(stats.buffers, 3);
    assert_eq!(stats.total_bytes, 448 * KB);
    assert_eq!(stats.in_use, 0);
}

#[test]
fn preallocate_from_params() {
    let device = HeadlessDevice::new();
    let resources = Resources::new();

    let mut params = DriverParams::default();
    params.upload_pool.preallocate = 64 * KB;
    let driver = RenderDriver::new(device.share(), &resources, params).unwrap();
    assert_eq!(driver.pool_stats().total_bytes, 64 * KB);
}

#[test]
fn clear() {
    let mut device = HeadlessDevice::new();
    let pool = UploadPool::new(UploadPoolParams::default());
    let now = Instant::now();

    let a = pool.allocate(&mut device, 16, now).unwrap();
    pool.release(&mut device, a, true, now);
    pool.allocate(&mut device, 16, now).unwrap();

    pool.clear(&mut device);
    assert_eq!(pool.stats(), Default::default());
    assert_eq!(device.fences(), 0);
    assert_eq!(device.live_objects(), 0);
}

extern crate lucent;

use lucent::prelude::*;
use lucent::video::backends::headless::{Call, HeadlessDevice};

#[test]
fn trims_on_worker() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();

    let mut params = DriverParams::default();
    params.staging_threshold = 16;
    params.upload_pool.trim_interval = 1;
    params.upload_pool.target_size = 0;
    params.upload_pool.max_size = 0;

    let shared = device.share();
    let worker = Worker::spawn("lucent-maintenance", move || Ok(shared)).unwrap();
    let mut driver = RenderDriver::new(device.share(), &resources, params)
        .unwrap()
        .with_worker(worker);

    let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![0; 64]);
    driver.prepare_buffer(&buffer).unwrap();
    buffer.write(0, &[1; 32]);
    driver.prepare_buffer(&buffer).unwrap();
    assert_eq!(driver.pool_stats().buffers, 1);

    device.signal_fences();
    driver.pre_frame();
    assert_eq!(driver.pool_stats().in_use, 0);

    driver.post_frame();
    driver.worker().unwrap().wait_idle().unwrap();

    assert_eq!(driver.pool_stats().buffers, 0);
    let deletes = device.count(|v| match v {
        Call::DeleteBuffer(..) => true,
        _ => false,
    });
    assert_eq!(deletes, 1);
}

#[test]
fn trims_inline() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();

    let mut params = DriverParams::default();
    params.staging_threshold = 16;
    params.upload_pool.trim_interval = 2;
    params.upload_pool.target_size = 0;
    params.upload_pool.max_size = 0;
    let mut driver = RenderDriver::new(device.share(), &resources, params).unwrap();

    let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![0; 64]);
    driver.prepare_buffer(&buffer).unwrap();
    buffer.write(0, &[1; 32]);
    driver.prepare_buffer(&buffer).unwrap();

    device.signal_fences();
    driver.pre_frame();
    driver.post_frame();
    assert_eq!(driver.pool_stats().buffers, 1);

    driver.pre_frame();
    driver.post_frame();
    assert_eq!(driver.pool_stats().buffers, 0);
}

#[test]
fn busy_buffers_survive_trim() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();

    let mut params = DriverParams::default();
    params.staging_threshold = 16;
    params.upload_pool.trim_interval = 1;
    params.upload_pool.target_size = 0;
    params.upload_pool.max_size = 0;
    let mut driver = RenderDriver::new(device.share(), &resources, params).unwrap();

    let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![0; 64]);
    driver.prepare_buffer(&buffer).unwrap();
    buffer.write(0, &[1; 32]);
    driver.prepare_buffer(&buffer).unwrap();

    driver.pre_frame();
    driver.post_frame();
    assert_eq!(driver.pool_stats().buffers, 1);
    assert_eq!(driver.pool_stats().in_use, 1);
}

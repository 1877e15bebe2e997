extern crate lucent;
extern crate rand;

use std::thread;

use rand::Rng;

use lucent::prelude::*;
use lucent::video::dirty::ByteRange;

const THREADS: usize = 4;
const WRITES: usize = 100;

#[test]
fn concurrent_writes() {
    let resources = Resources::new();
    let render = resources.register_thread();
    let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![0; 1024]);
    assert_eq!(buffer.generation(), 1);

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut touched = ByteRange::default();

                for _ in 0..WRITES {
                    let offset = rng.gen_range(0, 1000);
                    let size = rng.gen_range(1, 24);
                    buffer.write(offset, &vec![i as u8; size]);

                    touched = if touched.is_empty() {
                        ByteRange::with_size(offset, size)
                    } else {
                        ByteRange::new(touched.begin.min(offset), touched.end.max(offset + size))
                    };
                }

                touched
            })
        }).collect();

    let mut expected = ByteRange::default();
    for v in handles {
        let touched = v.join().unwrap();
        expected = if expected.is_empty() {
            touched
        } else {
            ByteRange::new(expected.begin.min(touched.begin), expected.end.max(touched.end))
        };
    }

    assert_eq!(buffer.generation(), 1 + (THREADS * WRITES) as u64);
    assert_eq!(buffer.take_dirty_region(render.index()), expected);
    assert!(buffer.take_dirty_region(render.index()).is_empty());
}

#[test]
fn late_thread() {
    let resources = Resources::new();
    let early = resources.register_thread();
    let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![0; 64]);
    buffer.write(8, &[1; 8]);

    let late = resources.register_thread();
    assert!(buffer.take_dirty_region(late.index()).is_empty());
    assert_eq!(buffer.take_dirty_region(early.index()), ByteRange::new(8, 16));

    buffer.write(0, &[2; 4]);
    assert_eq!(buffer.take_dirty_region(late.index()), ByteRange::new(0, 4));
    assert_eq!(buffer.take_dirty_region(early.index()), ByteRange::new(0, 4));
}

#[test]
fn independent_threads() {
    let resources = Resources::new();
    let a = resources.register_thread();
    let b = resources.register_thread();

    let texture = Texture::new(&resources, TextureFormat::R8, (8, 8), None);
    texture.write_region(Rect::new(0, 0, 2, 2), &[1; 4]);
    assert_eq!(texture.take_dirty_region(a.index()), Rect::new(0, 0, 2, 2));

    texture.write_region(Rect::new(4, 4, 1, 1), &[1]);
    assert_eq!(texture.take_dirty_region(a.index()), Rect::new(4, 4, 1, 1));
    assert_eq!(texture.take_dirty_region(b.index()), Rect::new(0, 0, 5, 5));
}

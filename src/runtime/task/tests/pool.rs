//! Descriptor pool tests

use std::sync::Arc;
use std::thread;

use crate::runtime::task::{marshal, ArgSpec, Buffer, DepCounter, DescriptorPool};

#[test]
fn test_empty_pool_allocates() {
    let pool = DescriptorPool::new();
    assert!(pool.is_empty());
    let _desc = pool.get();
    assert_eq!(pool.allocated(), 1);
}

#[test]
fn test_returned_descriptor_is_reused_clean() {
    let pool = DescriptorPool::new();
    let buffer = Buffer::new::<i32>(4);
    let mut desc = pool.get();
    desc.args.push(marshal(0, ArgSpec::reference(&buffer)).unwrap());
    desc.parent = Some(Arc::new(DepCounter::new()));
    desc.level = 3;
    desc.insert_in_front = true;

    pool.put(desc);
    assert_eq!(pool.len(), 1);

    let desc = pool.get();
    assert_eq!(pool.allocated(), 1);
    assert!(desc.args.is_empty());
    assert!(desc.parent.is_none());
    assert_eq!(desc.level, 0);
    assert!(!desc.insert_in_front);
}

#[test]
fn test_concurrent_get_put() {
    let pool = Arc::new(DescriptorPool::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pool = pool.clone();
            thread::spawn(move || {
                for n in 0..500 {
                    let mut desc = pool.get();
                    assert!(desc.args.is_empty());
                    desc.args.push(marshal(0, ArgSpec::copy(n as i64 + i)).unwrap());
                    pool.put(desc);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(pool.allocated() <= 4);
    assert_eq!(pool.len(), pool.allocated());
}

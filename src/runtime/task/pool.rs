//! Descriptor pool.
//!
//! Descriptors are recycled instead of reallocated. A recycled descriptor is
//! always reset first, so nothing from its previous use (argument storage,
//! parent link, hints) can leak into the next task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::descriptor::Descriptor;

/// Free list of reusable descriptors.
#[derive(Debug, Default)]
pub struct DescriptorPool {
    free: Mutex<VecDeque<Box<Descriptor>>>,
    allocated: AtomicUsize,
}

impl DescriptorPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            free: Mutex::new(VecDeque::new()),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Take a blank descriptor, allocating one if the pool is empty.
    pub fn get(&self) -> Box<Descriptor> {
        if let Some(desc) = self.free.lock().pop_front() {
            return desc;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Box::new(Descriptor::new())
    }

    /// Return a descriptor for reuse.
    pub fn put(
        &self,
        mut desc: Box<Descriptor>,
    ) {
        desc.reset();
        self.free.lock().push_back(desc);
    }

    /// Descriptors currently waiting for reuse.
    #[inline]
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    /// Whether no descriptor is waiting for reuse.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.lock().is_empty()
    }

    /// Descriptors allocated over the pool's lifetime.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

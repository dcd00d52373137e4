//! Ready queues for the scheduler
//!
//! Every node owns one private queue, drained first by its own workers and
//! never stolen from, and [`LEVELS`] public queues bucketed by nesting level.
//! Local workers take the deepest public bucket first; steal requests from
//! other nodes are served from the shallowest bucket first.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::runtime::task::Descriptor;

/// Number of public level buckets.
pub const LEVELS: usize = 10;

/// A thread-safe double-ended descriptor queue.
#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: Mutex<VecDeque<Box<Descriptor>>>,
}

impl TaskQueue {
    /// Create a new empty queue.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Push a descriptor to the back of the queue.
    #[inline]
    pub fn push_back(
        &self,
        desc: Box<Descriptor>,
    ) {
        self.inner.lock().push_back(desc);
    }

    /// Push a descriptor to the front of the queue.
    #[inline]
    pub fn push_front(
        &self,
        desc: Box<Descriptor>,
    ) {
        self.inner.lock().push_front(desc);
    }

    /// Pop a descriptor from the front of the queue.
    #[inline]
    pub fn pop_front(&self) -> Option<Box<Descriptor>> {
        self.inner.lock().pop_front()
    }

    /// Number of queued descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Private queue plus level-bucketed public queues of one node.
#[derive(Debug)]
pub struct ReadyQueues {
    private: TaskQueue,
    public: [TaskQueue; LEVELS],
}

impl ReadyQueues {
    /// Create empty queues.
    pub fn new() -> Self {
        Self {
            private: TaskQueue::new(),
            public: std::array::from_fn(|_| TaskQueue::new()),
        }
    }

    /// Insert into the private queue.
    pub fn push_private(
        &self,
        desc: Box<Descriptor>,
        front: bool,
    ) {
        if front {
            self.private.push_front(desc);
        } else {
            self.private.push_back(desc);
        }
    }

    /// Insert into the public bucket matching the descriptor's level.
    pub fn push_public(
        &self,
        desc: Box<Descriptor>,
        front: bool,
    ) {
        let queue = &self.public[desc.bucket()];
        if front {
            queue.push_front(desc);
        } else {
            queue.push_back(desc);
        }
    }

    /// Insert following the descriptor's own placement hints.
    pub fn push_hinted(
        &self,
        desc: Box<Descriptor>,
    ) {
        let front = desc.insert_in_front;
        if desc.insert_private {
            self.push_private(desc, front);
        } else {
            self.push_public(desc, front);
        }
    }

    /// Next task for a local worker: private queue, then deepest public bucket first.
    pub fn pop_local(&self) -> Option<Box<Descriptor>> {
        if let Some(desc) = self.private.pop_front() {
            return Some(desc);
        }
        self.public.iter().rev().find_map(TaskQueue::pop_front)
    }

    /// Next task for a remote thief: shallowest public bucket first.
    pub fn pop_for_steal(&self) -> Option<Box<Descriptor>> {
        self.public.iter().find_map(TaskQueue::pop_front)
    }

    /// Length of the private queue.
    #[inline]
    pub fn private_len(&self) -> usize {
        self.private.len()
    }

    /// Length of one public bucket.
    #[inline]
    pub fn public_len(
        &self,
        bucket: usize,
    ) -> usize {
        self.public[bucket].len()
    }

    /// Total queued descriptors.
    pub fn len(&self) -> usize {
        self.private.len() + self.public.iter().map(TaskQueue::len).sum::<usize>()
    }

    /// Whether every queue is empty.
    pub fn is_empty(&self) -> bool {
        self.private.is_empty() && self.public.iter().all(TaskQueue::is_empty)
    }
}

impl Default for ReadyQueues {
    fn default() -> Self {
        Self::new()
    }
}

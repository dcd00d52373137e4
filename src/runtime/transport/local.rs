//! In-process cluster.
//!
//! Each node gets a mailbox; sends append to the destination mailbox and
//! receives take the oldest message matching source and tag. One
//! `LocalCluster` stands in for a whole job, with one OS thread per node.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::{Packet, Tag, Transport, TransportError};

#[derive(Debug, Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Packet>>,
    arrived: Condvar,
}

impl Mailbox {
    fn take_match(
        queue: &mut VecDeque<Packet>,
        source: Option<usize>,
        tag: Tag,
    ) -> Option<Packet> {
        let index = queue
            .iter()
            .position(|p| p.tag == tag && source.map_or(true, |s| p.source == s))?;
        queue.remove(index)
    }
}

#[derive(Debug)]
struct Fabric {
    mailboxes: Vec<Mailbox>,
    attached: Vec<AtomicBool>,
    barrier: Barrier,
    gather: Mutex<Vec<u64>>,
    thread_safe: bool,
}

/// An in-process cluster of `nodes` nodes.
#[derive(Debug, Clone)]
pub struct LocalCluster {
    fabric: Arc<Fabric>,
}

impl LocalCluster {
    /// Thread-safe cluster.
    pub fn new(nodes: usize) -> Self {
        Self::with_thread_safety(nodes, true)
    }

    /// Cluster whose transports report that they are not thread safe.
    pub fn thread_unsafe(nodes: usize) -> Self {
        Self::with_thread_safety(nodes, false)
    }

    /// Cluster with an explicit thread-safety flag.
    pub fn with_thread_safety(
        nodes: usize,
        thread_safe: bool,
    ) -> Self {
        let nodes = nodes.max(1);
        Self {
            fabric: Arc::new(Fabric {
                mailboxes: (0..nodes).map(|_| Mailbox::default()).collect(),
                attached: (0..nodes).map(|_| AtomicBool::new(false)).collect(),
                barrier: Barrier::new(nodes),
                gather: Mutex::new(vec![0; nodes]),
                thread_safe,
            }),
        }
    }

    /// Number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.fabric.mailboxes.len()
    }

    /// Endpoint of node `node`.
    pub fn transport(
        &self,
        node: usize,
    ) -> Arc<LocalTransport> {
        Arc::new(LocalTransport {
            node,
            fabric: self.fabric.clone(),
        })
    }

    /// Run `f` once per node, each on its own thread, and collect the results
    /// in node order.
    pub fn launch<F, R>(
        &self,
        f: F,
    ) -> Vec<thread::Result<R>>
    where
        F: Fn(Arc<dyn Transport>) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        let handles: Vec<_> = (0..self.num_nodes())
            .map(|node| {
                let f = f.clone();
                let transport: Arc<dyn Transport> = self.transport(node);
                thread::Builder::new()
                    .name(format!("torc-node-{}", node))
                    .spawn(move || f(transport))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle {
                Ok(handle) => handle.join(),
                Err(err) => Err(Box::new(err) as Box<dyn std::any::Any + Send>),
            })
            .collect()
    }
}

/// One node's endpoint of a [`LocalCluster`].
#[derive(Debug)]
pub struct LocalTransport {
    node: usize,
    fabric: Arc<Fabric>,
}

impl LocalTransport {
    fn mailbox(
        &self,
        node: usize,
    ) -> Result<&Mailbox, TransportError> {
        self.fabric
            .mailboxes
            .get(node)
            .ok_or(TransportError::InvalidNode {
                node,
                nodes: self.fabric.mailboxes.len(),
            })
    }
}

impl Transport for LocalTransport {
    fn node_id(&self) -> usize {
        self.node
    }

    fn num_nodes(&self) -> usize {
        self.fabric.mailboxes.len()
    }

    fn thread_safe(&self) -> bool {
        self.fabric.thread_safe
    }

    fn attach(&self) -> Result<(), TransportError> {
        if self.fabric.attached[self.node].swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyAttached(self.node));
        }
        Ok(())
    }

    fn send(
        &self,
        dest: usize,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        let mailbox = self.mailbox(dest)?;
        mailbox.queue.lock().push_back(Packet {
            source: self.node,
            tag,
            bytes,
        });
        mailbox.arrived.notify_all();
        Ok(())
    }

    fn recv(
        &self,
        source: Option<usize>,
        tag: Tag,
    ) -> Result<Packet, TransportError> {
        let mailbox = self.mailbox(self.node)?;
        let mut queue = mailbox.queue.lock();
        loop {
            if let Some(packet) = Mailbox::take_match(&mut queue, source, tag) {
                return Ok(packet);
            }
            mailbox.arrived.wait(&mut queue);
        }
    }

    fn try_recv(
        &self,
        source: Option<usize>,
        tag: Tag,
    ) -> Result<Option<Packet>, TransportError> {
        let mailbox = self.mailbox(self.node)?;
        let mut queue = mailbox.queue.lock();
        Ok(Mailbox::take_match(&mut queue, source, tag))
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.fabric.barrier.wait();
        Ok(())
    }

    fn all_gather(
        &self,
        value: u64,
    ) -> Result<Vec<u64>, TransportError> {
        self.fabric.gather.lock()[self.node] = value;
        self.fabric.barrier.wait();
        let values = self.fabric.gather.lock().clone();
        self.fabric.barrier.wait();
        debug!("node {} gathered {:?}", self.node, values);
        Ok(values)
    }
}

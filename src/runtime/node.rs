//! Per-node runtime state
//!
//! One [`Node`] is shared (behind an `Arc`) by every worker thread and the
//! server thread of a node. It owns the ready queues, the descriptor pool,
//! the in-flight table and the statistics, and knows how to move a
//! descriptor to another node and back.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::scheduler::context::Target;
use crate::runtime::scheduler::queue::ReadyQueues;
use crate::runtime::scheduler::stats::{NodeStats, StatsSnapshot};
use crate::runtime::task::{
    Argument, BroadcastId, CallConv, Descriptor, DescriptorPool, Registry, Slot, WorkId,
};
use crate::runtime::transport::{
    payload_tag, Comm, Envelope, InflightRecord, InflightTable, MessageKind, Tag, Transport,
    WireArg, SERVER_TAG,
};
use crate::util::config::RuntimeConfig;

pub use crate::util::config::MAX_WORKERS;

/// Worker slot used by the server thread.
pub const SERVER_SLOT: usize = MAX_WORKERS;

/// Shared state of one node.
pub struct Node {
    config: RuntimeConfig,
    registry: Arc<Registry>,
    comm: Comm,
    node_id: usize,
    num_nodes: usize,
    workers_per_node: OnceCell<Vec<usize>>,
    pub(crate) queues: ReadyQueues,
    pub(crate) pool: DescriptorPool,
    pub(crate) inflight: InflightTable,
    pub(crate) stats: NodeStats,
    /// Held by a thread while it waits for a steal reply.
    pub(crate) steal_lock: Mutex<()>,
    stealing: AtomicBool,
    appl_finished: AtomicBool,
    terminating: AtomicBool,
    next_worker: Mutex<Option<usize>>,
    created_workers: Mutex<usize>,
    all_created: Condvar,
    active_workers: Mutex<usize>,
    started: Instant,
}

impl Node {
    /// Create the state of the node behind `transport`.
    pub fn new(
        config: RuntimeConfig,
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let node_id = transport.node_id();
        let num_nodes = transport.num_nodes();
        let comm = Comm::new(transport, config.poll_interval());
        let stealing = config.stealing;
        Self {
            config,
            registry,
            comm,
            node_id,
            num_nodes,
            workers_per_node: OnceCell::new(),
            queues: ReadyQueues::new(),
            pool: DescriptorPool::new(),
            inflight: InflightTable::new(),
            stats: NodeStats::new(),
            steal_lock: Mutex::new(()),
            stealing: AtomicBool::new(stealing),
            appl_finished: AtomicBool::new(false),
            terminating: AtomicBool::new(false),
            next_worker: Mutex::new(None),
            created_workers: Mutex::new(0),
            all_created: Condvar::new(),
            active_workers: Mutex::new(0),
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn comm(&self) -> &Comm {
        &self.comm
    }

    #[inline]
    pub fn node_id(&self) -> usize {
        self.node_id
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Whether this node runs the application's main function.
    #[inline]
    pub fn is_coordinator(&self) -> bool {
        self.node_id == 0
    }

    /// Seconds since the node was created.
    pub fn uptime(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    // ---------- identity ----------

    /// Worker threads on this node.
    #[inline]
    pub fn local_workers(&self) -> usize {
        self.config.workers
    }

    /// Record the gathered worker counts. Returns `false` if already set.
    pub fn set_workers_per_node(
        &self,
        counts: Vec<usize>,
    ) -> bool {
        self.workers_per_node.set(counts).is_ok()
    }

    /// Worker count of every node, in node order.
    pub fn workers_per_node(&self) -> &[usize] {
        match self.workers_per_node.get() {
            Some(counts) => counts,
            None => &[],
        }
    }

    /// Worker count of `node`.
    pub fn workers_of(
        &self,
        node: usize,
    ) -> usize {
        if node == self.node_id {
            return self.local_workers();
        }
        self.workers_per_node().get(node).copied().unwrap_or(0)
    }

    /// Workers across the cluster.
    pub fn total_workers(&self) -> usize {
        let counts = self.workers_per_node();
        if counts.is_empty() {
            self.local_workers()
        } else {
            counts.iter().sum()
        }
    }

    fn first_global(
        &self,
        node: usize,
    ) -> usize {
        (0..node).map(|n| self.workers_of(n)).sum()
    }

    /// Node owning global worker `worker`.
    pub fn global_to_node(
        &self,
        worker: usize,
    ) -> Option<usize> {
        let mut first = 0;
        for node in 0..self.num_nodes {
            let count = self.workers_of(node);
            if worker < first + count {
                return Some(node);
            }
            first += count;
        }
        None
    }

    /// Local index of global worker `worker` on its node.
    pub fn global_to_local(
        &self,
        worker: usize,
    ) -> Option<usize> {
        let node = self.global_to_node(worker)?;
        Some(worker - self.first_global(node))
    }

    /// Global id of local worker `local` on this node.
    #[inline]
    pub fn local_to_global(
        &self,
        local: usize,
    ) -> usize {
        self.first_global(self.node_id) + local
    }

    // ---------- flags ----------

    #[inline]
    pub fn stealing_enabled(&self) -> bool {
        self.stealing.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_stealing(
        &self,
        enabled: bool,
    ) {
        self.stealing.store(enabled, Ordering::SeqCst);
    }

    /// The application has finished; idle workers may exit.
    #[inline]
    pub fn appl_finished(&self) -> bool {
        self.appl_finished.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_appl_finished(&self) {
        self.appl_finished.store(true, Ordering::SeqCst);
    }

    /// The node is shutting down; the server must stop.
    #[inline]
    pub fn terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_terminating(&self) {
        self.terminating.store(true, Ordering::SeqCst);
    }

    // ---------- worker bookkeeping ----------

    /// A worker thread is up; wakes everyone once all are.
    pub fn worker_created(&self) {
        let mut created = self.created_workers.lock();
        *created += 1;
        if *created >= self.local_workers() {
            self.all_created.notify_all();
        }
    }

    /// Block until every local worker has been created.
    pub fn wait_all_created(&self) {
        let mut created = self.created_workers.lock();
        while *created < self.local_workers() {
            self.all_created.wait(&mut created);
        }
    }

    pub fn set_active_workers(
        &self,
        count: usize,
    ) {
        *self.active_workers.lock() = count;
    }

    /// A worker left its scheduler loop.
    pub fn worker_exited(&self) {
        let mut active = self.active_workers.lock();
        *active = active.saturating_sub(1);
    }

    pub fn active_workers(&self) -> usize {
        *self.active_workers.lock()
    }

    /// Statistics of this node.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.node_id, self.local_workers())
    }

    // ---------- placement ----------

    /// Check a creation target before any state changes.
    pub fn validate_target(
        &self,
        target: Target,
    ) -> RuntimeResult<()> {
        match target {
            Target::Any => Ok(()),
            Target::Worker(worker) | Target::WorkerFront(worker) => {
                let total = self.total_workers();
                if worker >= total {
                    return Err(RuntimeError::InvalidTarget { worker, total });
                }
                Ok(())
            }
            Target::Node(node) | Target::NodeFront(node) => {
                if node >= self.num_nodes {
                    return Err(RuntimeError::InvalidNode {
                        node,
                        nodes: self.num_nodes,
                    });
                }
                Ok(())
            }
        }
    }

    /// Put a freshly created descriptor where `target` says.
    pub fn place(
        &self,
        desc: Box<Descriptor>,
        target: Target,
        slot: usize,
    ) -> RuntimeResult<()> {
        match target {
            Target::Any => {
                if self.num_nodes == 1 {
                    self.queues.push_public(desc, false);
                    return Ok(());
                }
                let worker = self.next_round_robin(slot);
                self.to_worker(worker, desc, false, slot)
            }
            Target::Worker(worker) => self.to_worker(worker, desc, false, slot),
            Target::WorkerFront(worker) => self.to_worker(worker, desc, true, slot),
            Target::Node(node) => self.to_node(node, desc, false, slot),
            Target::NodeFront(node) => self.to_node(node, desc, true, slot),
        }
    }

    fn next_round_robin(
        &self,
        slot: usize,
    ) -> usize {
        let total = self.total_workers().max(1);
        let mut next = self.next_worker.lock();
        let local = slot.min(self.local_workers().saturating_sub(1));
        let worker = next.unwrap_or_else(|| self.local_to_global(local));
        *next = Some((worker + 1) % total);
        worker
    }

    fn to_worker(
        &self,
        worker: usize,
        mut desc: Box<Descriptor>,
        front: bool,
        slot: usize,
    ) -> RuntimeResult<()> {
        if self.num_nodes == 1 {
            self.queues.push_public(desc, front);
            return Ok(());
        }
        let node = self
            .global_to_node(worker)
            .ok_or(RuntimeError::InvalidTarget {
                worker,
                total: self.total_workers(),
            })?;
        desc.target_queue = self.global_to_local(worker);
        if front {
            desc.insert_in_front = true;
        }
        self.enqueue_on(node, desc, front, slot)
    }

    fn to_node(
        &self,
        node: usize,
        mut desc: Box<Descriptor>,
        front: bool,
        slot: usize,
    ) -> RuntimeResult<()> {
        if node >= self.num_nodes {
            return Err(RuntimeError::InvalidNode {
                node,
                nodes: self.num_nodes,
            });
        }
        desc.target_queue = None;
        if front {
            desc.insert_in_front = true;
        }
        self.enqueue_on(node, desc, front, slot)
    }

    fn enqueue_on(
        &self,
        node: usize,
        desc: Box<Descriptor>,
        front: bool,
        slot: usize,
    ) -> RuntimeResult<()> {
        if node == self.node_id {
            self.queues.push_public(desc, front);
            return Ok(());
        }
        self.send_descriptor(
            node,
            desc,
            MessageKind::NormalEnqueue,
            SERVER_TAG,
            payload_tag(slot),
            slot,
        )
    }

    // ---------- shipping ----------

    /// Ship `desc` to `dest` and return the descriptor to the pool.
    ///
    /// Leaving its home node, the descriptor's parent link and argument
    /// storage stay behind in the in-flight table; the envelope carries the
    /// token instead. A failed send drops the record again.
    pub(crate) fn send_descriptor(
        &self,
        dest: usize,
        mut desc: Box<Descriptor>,
        kind: MessageKind,
        envelope_tag: Tag,
        data_tag: Tag,
        slot: usize,
    ) -> RuntimeResult<()> {
        let at_home = desc.is_home(self.node_id);
        let payloads: Vec<Vec<u8>> = if desc.home_node == dest {
            Vec::new()
        } else {
            desc.args
                .iter()
                .filter(|arg| arg.ships_input())
                .map(|arg| arg.storage(at_home).to_bytes(arg.byte_len()))
                .collect()
        };

        let mut envelope = Envelope::describe(kind, &desc, self.node_id, slot);
        if at_home {
            envelope.token = self.inflight.insert(InflightRecord {
                parent: desc.parent.take(),
                args: mem::take(&mut desc.args),
                kind: desc.kind,
            });
        }
        debug!(
            "node {} ships {} to node {} ({:?}, {} payloads)",
            self.node_id,
            desc.work,
            dest,
            kind,
            payloads.len()
        );
        self.pool.put(desc);

        let sent = self
            .comm
            .send(dest, envelope_tag, envelope.encode())
            .and_then(|()| {
                payloads
                    .into_iter()
                    .try_for_each(|bytes| self.comm.send(dest, data_tag, bytes))
            });
        if let Err(err) = sent {
            if at_home {
                self.inflight.take(envelope.token);
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Report completion of a foreign task to its home node.
    pub(crate) fn send_answer(
        &self,
        desc: &Descriptor,
        slot: usize,
    ) -> RuntimeResult<()> {
        let home = desc.home_node;
        let envelope = Envelope::describe(MessageKind::Answer, desc, self.node_id, slot);
        self.comm.send(home, SERVER_TAG, envelope.encode())?;
        for arg in desc.args.iter().filter(|arg| arg.ships_output()) {
            self.comm
                .send(home, payload_tag(slot), arg.remote.to_bytes(arg.byte_len()))?;
        }
        Ok(())
    }

    /// Send a control message to the server of `dest`.
    pub(crate) fn send_control(
        &self,
        dest: usize,
        kind: MessageKind,
        slot: usize,
    ) -> RuntimeResult<()> {
        let envelope = Envelope::control(kind, self.node_id, slot);
        self.comm.send(dest, SERVER_TAG, envelope.encode())?;
        Ok(())
    }

    /// Send a control message to every other node.
    pub(crate) fn send_control_to_others(
        &self,
        kind: MessageKind,
        slot: usize,
    ) -> RuntimeResult<()> {
        for node in (0..self.num_nodes).filter(|&n| n != self.node_id) {
            self.send_control(node, kind, slot)?;
        }
        Ok(())
    }

    /// Push this node's copy of a broadcast target to every other node.
    pub(crate) fn broadcast(
        &self,
        id: BroadcastId,
        slot: usize,
    ) -> RuntimeResult<()> {
        let buffer = self
            .registry
            .broadcast_target(id)
            .ok_or(RuntimeError::UnregisteredBroadcast(id))?;
        let bytes = buffer.snapshot(None);

        let mut envelope = Envelope::control(MessageKind::Broadcast, self.node_id, slot);
        envelope.work = id.0;
        envelope.args.push(WireArg {
            count: buffer.len() as u32,
            dtype: buffer.datatype(),
            conv: CallConv::Address,
            value: [0u8; 8],
        });
        let frame = envelope.encode();

        for node in (0..self.num_nodes).filter(|&n| n != self.node_id) {
            self.comm.send(node, SERVER_TAG, frame.clone())?;
            self.comm.send(node, payload_tag(slot), bytes.clone())?;
        }
        debug!(
            "node {} broadcast {} ({} bytes)",
            self.node_id,
            id,
            bytes.len()
        );
        Ok(())
    }

    // ---------- receiving ----------

    fn fill_header(
        &self,
        desc: &mut Descriptor,
        envelope: &Envelope,
    ) {
        desc.work = WorkId(envelope.work);
        desc.home_node = envelope.home as usize;
        desc.source_node = envelope.source as usize;
        desc.source_worker = envelope.source_worker as usize;
        desc.level = envelope.level;
        desc.target_queue = envelope.target_queue.map(|q| q as usize);
        desc.insert_in_front = envelope.insert_in_front;
        desc.insert_private = envelope.insert_private;
        desc.kind = envelope.task_kind;
        desc.token = envelope.token;
    }

    /// Build a working copy of a foreign task: metadata from the envelope,
    /// inputs from the payloads that follow it on `tag`.
    pub(crate) fn receive_descriptor(
        &self,
        envelope: &Envelope,
        source: usize,
        tag: Tag,
        interrupted: &dyn Fn() -> bool,
    ) -> RuntimeResult<Box<Descriptor>> {
        let mut desc = self.pool.get();
        self.fill_header(&mut desc, envelope);

        for (index, wire) in envelope.args.iter().enumerate() {
            let mut arg = Argument::bare(wire.count as usize, wire.dtype, wire.conv);
            if arg.count > 0 {
                arg.remote = if arg.is_inline() {
                    Slot::Inline(wire.value)
                } else if arg.conv == CallConv::Result {
                    Slot::Block(vec![0u8; arg.byte_len()])
                } else {
                    let packet = self.comm.recv(Some(source), tag, interrupted)?;
                    if packet.bytes.len() != arg.byte_len() {
                        return Err(RuntimeError::PayloadSize {
                            index,
                            expected: arg.byte_len(),
                            got: packet.bytes.len(),
                        });
                    }
                    Slot::Block(packet.bytes)
                };
            }
            desc.args.push(arg);
        }
        Ok(desc)
    }

    /// A task of ours came back unexecuted; restore it from the in-flight table.
    pub(crate) fn rebuild_home(
        &self,
        envelope: &Envelope,
    ) -> RuntimeResult<Box<Descriptor>> {
        let record = self
            .inflight
            .take(envelope.token)
            .ok_or(RuntimeError::UnknownToken(envelope.token))?;
        let mut desc = self.pool.get();
        self.fill_header(&mut desc, envelope);
        desc.parent = record.parent;
        desc.args = record.args;
        desc.kind = record.kind;
        desc.token = 0;
        Ok(desc)
    }

    /// Apply an answer: copy results into the caller's buffers and satisfy
    /// the parent.
    pub(crate) fn complete_answer(
        &self,
        envelope: &Envelope,
        source: usize,
        interrupted: &dyn Fn() -> bool,
    ) -> RuntimeResult<()> {
        let record = self
            .inflight
            .take(envelope.token)
            .ok_or(RuntimeError::UnknownToken(envelope.token))?;
        let tag = payload_tag(envelope.source_worker as usize);

        for (index, arg) in record.args.iter().enumerate() {
            if !arg.ships_output() {
                continue;
            }
            let packet = self.comm.recv(Some(source), tag, interrupted)?;
            if packet.bytes.len() != arg.byte_len() {
                return Err(RuntimeError::PayloadSize {
                    index,
                    expected: arg.byte_len(),
                    got: packet.bytes.len(),
                });
            }
            if let Slot::Shared(buffer) = &arg.local {
                buffer.copy_from_bytes(&packet.bytes);
            }
        }

        debug!(
            "node {} answer for {} from node {}",
            self.node_id,
            WorkId(envelope.work),
            source
        );
        if let Some(parent) = record.parent {
            parent.satisfy();
        }
        Ok(())
    }

    /// Receive a broadcast payload into the registered target.
    pub(crate) fn receive_broadcast(
        &self,
        envelope: &Envelope,
        source: usize,
        interrupted: &dyn Fn() -> bool,
    ) -> RuntimeResult<()> {
        let id = BroadcastId(envelope.work);
        let buffer = self
            .registry
            .broadcast_target(id)
            .ok_or(RuntimeError::UnregisteredBroadcast(id))?;
        let tag = payload_tag(envelope.source_worker as usize);
        let packet = self.comm.recv(Some(source), tag, interrupted)?;
        buffer.copy_from_bytes(&packet.bytes);
        Ok(())
    }

    /// Fatal error with no caller to report to.
    pub fn abort(
        &self,
        op: &str,
        err: &dyn fmt::Display,
    ) -> ! {
        error!("node {}: {} failed: {}", self.node_id, op, err);
        if self.config.exit_on_shutdown {
            std::process::exit(1);
        }
        panic!("node {}: {} failed: {}", self.node_id, op, err);
    }
}

impl fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("num_nodes", &self.num_nodes)
            .field("workers", &self.local_workers())
            .field("queued", &self.queues.len())
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

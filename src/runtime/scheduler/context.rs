//! Execution context handed to work functions.
//!
//! A [`TaskContext`] stands for "the currently running task": it knows the
//! node, the worker slot running the task, the task's own dependency counter
//! and its nesting level. Children are created through it, and `waitall`
//! waits on its counter.

use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use smallvec::SmallVec;

use super::{get_next_task, run_once, Step};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::node::{Node, SERVER_SLOT};
use crate::runtime::task::{marshal, ArgSpec, BroadcastId, DepCounter, TaskKind, WorkId, MAX_ARGS};
use crate::runtime::transport::MessageKind;

/// Where a new task is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Round-robin over every worker of the cluster.
    Any,
    /// Tail of the queue of global worker `w`.
    Worker(usize),
    /// Head of the queue of global worker `w`.
    WorkerFront(usize),
    /// Tail of node `n`'s queues.
    Node(usize),
    /// Head of node `n`'s queues.
    NodeFront(usize),
}

/// The running task, as seen by its work function.
pub struct TaskContext<'a> {
    node: &'a Arc<Node>,
    slot: usize,
    deps: Arc<DepCounter>,
    level: u32,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        node: &'a Arc<Node>,
        slot: usize,
        deps: Arc<DepCounter>,
        level: u32,
    ) -> Self {
        Self {
            node,
            slot,
            deps,
            level,
        }
    }

    /// Node this task runs on.
    #[inline]
    pub fn node(&self) -> &Arc<Node> {
        self.node
    }

    // ---------- task creation ----------

    /// Create a child the caller waits for.
    pub fn create(
        &self,
        target: Target,
        work: WorkId,
        args: Vec<ArgSpec>,
    ) -> RuntimeResult<()> {
        self.spawn(target, work, args, TaskKind::Tracked)
    }

    /// Create a child the caller waits for; an invisible child is left out
    /// of the statistics.
    pub fn create_ex(
        &self,
        target: Target,
        work: WorkId,
        args: Vec<ArgSpec>,
        invisible: bool,
    ) -> RuntimeResult<()> {
        let kind = if invisible {
            TaskKind::Invisible
        } else {
            TaskKind::Tracked
        };
        self.spawn(target, work, args, kind)
    }

    /// Create a task nobody waits for.
    pub fn create_detached(
        &self,
        target: Target,
        work: WorkId,
        args: Vec<ArgSpec>,
    ) -> RuntimeResult<()> {
        self.spawn(target, work, args, TaskKind::Detached)
    }

    /// Create a child that a remote node runs as soon as it receives it.
    pub fn create_direct(
        &self,
        target: Target,
        work: WorkId,
        args: Vec<ArgSpec>,
    ) -> RuntimeResult<()> {
        self.spawn(target, work, args, TaskKind::Direct)
    }

    fn spawn(
        &self,
        target: Target,
        work: WorkId,
        args: Vec<ArgSpec>,
        kind: TaskKind,
    ) -> RuntimeResult<()> {
        if args.len() > MAX_ARGS {
            return Err(RuntimeError::TooManyArguments {
                count: args.len(),
                max: MAX_ARGS,
            });
        }
        if self.node.registry().get(work).is_none() {
            return Err(RuntimeError::UnregisteredWork(work));
        }
        self.node.validate_target(target)?;

        let mut bound = SmallVec::with_capacity(args.len());
        for (index, spec) in args.into_iter().enumerate() {
            bound.push(marshal(index, spec)?);
        }

        let node_id = self.node.node_id();
        let mut desc = self.node.pool.get();
        desc.work = work;
        desc.args = bound;
        desc.home_node = node_id;
        desc.source_node = node_id;
        desc.source_worker = self.slot;
        desc.kind = kind;

        let tracked = kind != TaskKind::Detached;
        if tracked {
            self.deps.add_child();
            desc.parent = Some(self.deps.clone());
            desc.level = self.level + 1;
        } else {
            desc.level = 0;
        }
        if kind.counts_created() {
            self.node.stats.record_created(self.slot);
        }

        if let Err(err) = self.node.place(desc, target, self.slot) {
            if tracked {
                self.deps.satisfy();
            }
            return Err(err);
        }
        Ok(())
    }

    // ---------- waiting ----------

    /// Wait for every child, running other tasks meanwhile.
    pub fn waitall(&self) {
        self.deps.release();
        while self.deps.pending() > 0 {
            if run_once(self.node, self.slot) == Step::Shutdown {
                break;
            }
        }
    }

    /// Like [`waitall`](Self::waitall), but keep running local work until a
    /// step finds nothing once the children are done.
    pub fn waitall_drain(&self) {
        self.deps.release();
        loop {
            let step = run_once(self.node, self.slot);
            if step == Step::Shutdown {
                break;
            }
            if self.deps.pending() <= 0 && step != Step::Executed {
                break;
            }
        }
    }

    /// Wait for every child without running tasks on this thread.
    pub fn waitall_passive(&self) {
        self.deps.release();
        let poll = self.node.config().poll_interval();
        while self.deps.pending() > 0 && !self.node.appl_finished() {
            thread::sleep(poll);
        }
    }

    /// Children still pending (including the first child's extra unit).
    #[inline]
    pub fn pending(&self) -> i64 {
        self.deps.pending()
    }

    /// Move the next available task into this node's private queue.
    pub fn fetch_work(&self) -> bool {
        match get_next_task(self.node, self.slot) {
            Some(desc) => {
                self.node.queues.push_private(desc, false);
                true
            }
            None => false,
        }
    }

    // ---------- cluster-wide operations ----------

    /// Copy this node's broadcast target `id` to every other node.
    pub fn broadcast(
        &self,
        id: BroadcastId,
    ) -> RuntimeResult<()> {
        self.node.broadcast(id, self.slot)
    }

    /// Turn inter-node stealing on everywhere.
    pub fn enable_stealing(&self) -> RuntimeResult<()> {
        self.node
            .send_control_to_others(MessageKind::EnableStealing, self.slot)?;
        self.node.set_stealing(true);
        Ok(())
    }

    /// Turn inter-node stealing off everywhere.
    pub fn disable_stealing(&self) -> RuntimeResult<()> {
        self.node
            .send_control_to_others(MessageKind::DisableStealing, self.slot)?;
        self.node.set_stealing(false);
        Ok(())
    }

    /// Turn stealing on for this node only.
    #[inline]
    pub fn i_enable_stealing(&self) {
        self.node.set_stealing(true);
    }

    /// Turn stealing off for this node only.
    #[inline]
    pub fn i_disable_stealing(&self) {
        self.node.set_stealing(false);
    }

    /// Zero the created/executed counters everywhere.
    pub fn reset_statistics(&self) -> RuntimeResult<()> {
        self.node
            .send_control_to_others(MessageKind::ResetStatistics, self.slot)?;
        self.node.stats.reset();
        Ok(())
    }

    // ---------- identity ----------

    #[inline]
    pub fn node_id(&self) -> usize {
        self.node.node_id()
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.node.num_nodes()
    }

    /// Cluster-wide id of the running worker.
    ///
    /// A direct task runs on the server thread, whose slot is
    /// [`SERVER_SLOT`]; there this is the id of the node's first worker.
    #[inline]
    pub fn worker_id(&self) -> usize {
        if self.on_server() {
            return self.node.local_to_global(0);
        }
        self.node.local_to_global(self.slot)
    }

    /// Slot of the running worker on this node, or [`SERVER_SLOT`] for a
    /// direct task running on the server thread.
    #[inline]
    pub fn local_worker_id(&self) -> usize {
        self.slot
    }

    /// Whether the task runs on the server thread rather than a worker.
    #[inline]
    pub fn on_server(&self) -> bool {
        self.slot == SERVER_SLOT
    }

    /// Workers across the cluster.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.node.total_workers()
    }

    /// Workers on this node.
    #[inline]
    pub fn local_num_workers(&self) -> usize {
        self.node.local_workers()
    }

    /// Nesting depth of the running task.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Next worker for strided placement; `None` starts at the caller.
    pub fn sched_next_worker(
        &self,
        cpu: Option<usize>,
        stride: usize,
    ) -> usize {
        match cpu {
            None => self.worker_id(),
            Some(cpu) => (cpu + stride) % self.num_workers().max(1),
        }
    }

    /// Wall-clock seconds.
    pub fn gettime(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

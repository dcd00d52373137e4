//! Task descriptors and dependency counters.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::warn;

use super::args::{Argument, Slot, TaskArgs};
use super::registry::WorkId;
use crate::runtime::scheduler::queue::LEVELS;

/// How a task takes part in completion tracking and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskKind {
    /// Parent waits for it; counted in created/executed statistics.
    #[default]
    Tracked,
    /// Parent waits for it; excluded from statistics.
    Invisible,
    /// Nobody waits for it.
    Detached,
    /// Tracked; executed inline by the receiving server thread.
    Direct,
}

impl TaskKind {
    /// Tag used on the wire.
    #[inline]
    pub fn as_tag(&self) -> u8 {
        match self {
            TaskKind::Tracked => 1,
            TaskKind::Invisible => 2,
            TaskKind::Detached => 3,
            TaskKind::Direct => 20,
        }
    }

    /// Decode a wire tag.
    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(TaskKind::Tracked),
            2 => Some(TaskKind::Invisible),
            3 => Some(TaskKind::Detached),
            20 => Some(TaskKind::Direct),
            _ => None,
        }
    }

    /// Counted in the creator's `created` statistic.
    #[inline]
    pub fn counts_created(&self) -> bool {
        matches!(self, TaskKind::Tracked)
    }

    /// Counted in the executor's `executed` statistic.
    #[inline]
    pub fn counts_executed(&self) -> bool {
        matches!(self, TaskKind::Tracked | TaskKind::Detached)
    }
}

/// Pending-child counter of a task.
///
/// The count starts at zero. The first child bumps it to one before adding
/// itself, so that a parent which never waits still holds a positive count
/// while children run; `waitall` removes that extra unit again.
#[derive(Debug, Default)]
pub struct DepCounter {
    pending: Mutex<i64>,
}

impl DepCounter {
    /// Create a counter with nothing pending.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(0),
        }
    }

    /// Register one more child.
    pub fn add_child(&self) {
        let mut pending = self.pending.lock();
        if *pending == 0 {
            *pending = 1;
        }
        *pending += 1;
    }

    /// A child finished. Returns `true` when nothing is pending anymore.
    pub fn satisfy(&self) -> bool {
        self.decrement("satisfy")
    }

    /// Drop the unit added by the first child. Returns `true` when nothing is pending.
    ///
    /// A parent that created no children has no unit to drop.
    pub fn release(&self) -> bool {
        let mut pending = self.pending.lock();
        if *pending > 0 {
            *pending -= 1;
        }
        *pending == 0
    }

    fn decrement(
        &self,
        op: &'static str,
    ) -> bool {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending < 0 {
            warn!("dependency counter went negative on {}, clamped to 0", op);
            *pending = 0;
        }
        *pending == 0
    }

    /// Current count.
    #[inline]
    pub fn pending(&self) -> i64 {
        *self.pending.lock()
    }

    /// Force the count back to zero.
    pub fn reset(&self) {
        *self.pending.lock() = 0;
    }
}

/// A unit of work plus everything needed to run it anywhere in the cluster.
pub struct Descriptor {
    /// Registered work function.
    pub work: WorkId,
    /// Bound arguments.
    pub args: SmallVec<[Argument; 4]>,
    /// Node that created the task and owns its argument storage.
    pub home_node: usize,
    /// Node that last forwarded the descriptor.
    pub source_node: usize,
    /// Worker slot of the last sender.
    pub source_worker: usize,
    /// Counter of the creating task.
    pub parent: Option<Arc<DepCounter>>,
    /// This task's own pending-child counter.
    pub deps: Arc<DepCounter>,
    /// Nesting depth.
    pub level: u32,
    /// Local worker the task was aimed at.
    pub target_queue: Option<usize>,
    /// Insert at the head of the chosen queue.
    pub insert_in_front: bool,
    /// Insert into the private queue.
    pub insert_private: bool,
    /// Tracking mode.
    pub kind: TaskKind,
    /// In-flight token while the task lives away from home.
    pub token: u64,
}

impl Descriptor {
    /// Blank descriptor.
    pub fn new() -> Self {
        Self {
            work: WorkId(0),
            args: SmallVec::new(),
            home_node: 0,
            source_node: 0,
            source_worker: 0,
            parent: None,
            deps: Arc::new(DepCounter::new()),
            level: 0,
            target_queue: None,
            insert_in_front: false,
            insert_private: false,
            kind: TaskKind::Tracked,
            token: 0,
        }
    }

    /// Clear every field before the descriptor goes back to the pool.
    ///
    /// A counter still referenced elsewhere (a late child, an in-flight record)
    /// is replaced instead of reset.
    pub fn reset(&mut self) {
        self.work = WorkId(0);
        self.args.clear();
        self.home_node = 0;
        self.source_node = 0;
        self.source_worker = 0;
        self.parent = None;
        if Arc::strong_count(&self.deps) > 1 {
            self.deps = Arc::new(DepCounter::new());
        } else {
            self.deps.reset();
        }
        self.level = 0;
        self.target_queue = None;
        self.insert_in_front = false;
        self.insert_private = false;
        self.kind = TaskKind::Tracked;
        self.token = 0;
    }

    /// Whether `node` owns this task.
    #[inline]
    pub fn is_home(
        &self,
        node: usize,
    ) -> bool {
        self.home_node == node
    }

    /// Public bucket for this task's level.
    #[inline]
    pub fn bucket(&self) -> usize {
        (self.level as usize).saturating_sub(1).min(LEVELS - 1)
    }

    /// Argument view for the executing work function.
    pub fn task_args(
        &mut self,
        home: bool,
    ) -> TaskArgs<'_> {
        TaskArgs::new(&mut self.args, home)
    }

    /// Whether any argument holds storage.
    pub fn holds_storage(&self) -> bool {
        self.args
            .iter()
            .any(|arg| !matches!(arg.local, Slot::Empty) || !matches!(arg.remote, Slot::Empty))
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("work", &self.work)
            .field("narg", &self.args.len())
            .field("home", &self.home_node)
            .field("source", &self.source_node)
            .field("level", &self.level)
            .field("kind", &self.kind)
            .field("token", &self.token)
            .finish()
    }
}

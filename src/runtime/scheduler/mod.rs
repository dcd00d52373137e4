//! Task scheduler
//!
//! Every worker thread of a node runs the same loop: take the next task from
//! the node's ready queues (or steal one from another node), run its work
//! function with a [`TaskContext`], then clean up. Cleanup either reports the
//! result to the task's home node or satisfies the parent's counter locally.

pub mod context;
pub mod queue;
pub mod stats;
pub mod work_stealer;

pub use context::{Target, TaskContext};
pub use queue::{ReadyQueues, TaskQueue, LEVELS};
pub use stats::{NodeStats, StatsSnapshot};

use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::runtime::error::RuntimeError;
use crate::runtime::node::Node;
use crate::runtime::task::{CallConv, Descriptor, Slot};

/// Outcome of one scheduling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A task ran.
    Executed,
    /// Nothing to run.
    Idle,
    /// Nothing to run and the application has finished.
    Shutdown,
}

/// Next task for worker `slot`: private queue, public queues deepest first,
/// then (if enabled) a steal round over the other nodes.
pub fn get_next_task(
    node: &Arc<Node>,
    slot: usize,
) -> Option<Box<Descriptor>> {
    if let Some(desc) = node.queues.pop_local() {
        return Some(desc);
    }
    if node.stealing_enabled() {
        return work_stealer::steal_round(node, slot);
    }
    None
}

/// Run at most one task.
pub fn run_once(
    node: &Arc<Node>,
    slot: usize,
) -> Step {
    schedule(node, slot, true)
}

/// Run tasks until the application finishes.
pub fn run_forever(
    node: &Arc<Node>,
    slot: usize,
) {
    while schedule(node, slot, false) != Step::Shutdown {}
    debug!("node {} worker {} leaves the scheduler", node.node_id(), slot);
}

fn schedule(
    node: &Arc<Node>,
    slot: usize,
    once: bool,
) -> Step {
    let poll = node.config().poll_interval();
    loop {
        if let Some(desc) = get_next_task(node, slot) {
            execute(node, desc, slot);
            return Step::Executed;
        }
        if node.appl_finished() {
            return Step::Shutdown;
        }
        thread::sleep(poll);

        if let Some(desc) = get_next_task(node, slot) {
            execute(node, desc, slot);
            return Step::Executed;
        }
        if once {
            return Step::Idle;
        }
        thread::sleep(poll);
    }
}

/// Run `desc` on worker `slot` and clean up after it.
pub fn execute(
    node: &Arc<Node>,
    mut desc: Box<Descriptor>,
    slot: usize,
) {
    let func = match node.registry().get(desc.work) {
        Some(function) => function.func.clone(),
        None => node.abort("execute", &RuntimeError::UnregisteredWork(desc.work)),
    };
    let home = desc.is_home(node.node_id());

    {
        let ctx = TaskContext::new(node, slot, desc.deps.clone(), desc.level);
        let mut args = desc.task_args(home);
        func(&ctx, &mut args);
    }

    if desc.kind.counts_executed() {
        node.stats.record_executed(slot);
    }
    cleanup(node, desc, slot);
}

/// Finish a task and return its descriptor to the pool.
pub fn cleanup(
    node: &Arc<Node>,
    mut desc: Box<Descriptor>,
    slot: usize,
) {
    if !desc.is_home(node.node_id()) {
        if let Err(err) = node.send_answer(&desc, slot) {
            node.abort("answer", &err);
        }
    } else {
        for arg in desc.args.iter_mut() {
            if arg.conv == CallConv::CopyBlock {
                arg.local = Slot::Empty;
            }
        }
        if let Some(parent) = desc.parent.take() {
            parent.satisfy();
        }
    }
    node.pool.put(desc);
}

#[cfg(test)]
mod tests;

//! Inter-node work stealing.
//!
//! An idle worker asks the other nodes' servers, one at a time and
//! round-robin from the node after its own, for a task. A victim answers
//! with the shallowest public task it holds or with a `NoWork` reply.

use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::node::{Node, SERVER_SLOT};
use crate::runtime::task::Descriptor;
use crate::runtime::transport::{reply_tag, Envelope, MessageKind, TransportError, SERVER_TAG};

/// Try each other node once. A round that finds nothing turns stealing off
/// on this node.
pub fn steal_round(
    node: &Arc<Node>,
    slot: usize,
) -> Option<Box<Descriptor>> {
    let nodes = node.num_nodes();
    let me = node.node_id();
    for offset in 1..nodes {
        let victim = (me + offset) % nodes;
        match steal_from(node, victim, slot) {
            Ok(Some(desc)) => return Some(desc),
            Ok(None) => {}
            Err(RuntimeError::Transport(TransportError::Interrupted)) => return None,
            Err(err) => node.abort("steal request", &err),
        }
    }
    node.set_stealing(false);
    debug!("node {}: steal round found nothing, stealing disabled", me);
    None
}

/// Ask `victim` for one task on behalf of worker `slot`.
pub fn steal_from(
    node: &Arc<Node>,
    victim: usize,
    slot: usize,
) -> RuntimeResult<Option<Box<Descriptor>>> {
    if node.terminating() {
        return Ok(None);
    }

    let tag = reply_tag(slot);
    let interrupted = || node.appl_finished();
    let desc = {
        let _guard = node.steal_lock.lock();
        let request = Envelope::control(MessageKind::StealRequest, node.node_id(), slot);
        node.comm().send(victim, SERVER_TAG, request.encode())?;

        let packet = node.comm().recv(Some(victim), tag, &interrupted)?;
        let reply = Envelope::decode(&packet.bytes)?;
        if reply.kind == MessageKind::NoWork {
            None
        } else if reply.home as usize == node.node_id() {
            Some(node.rebuild_home(&reply)?)
        } else {
            Some(node.receive_descriptor(&reply, victim, tag, &interrupted)?)
        }
    };

    match desc {
        Some(desc) => {
            node.stats.record_steal_hit();
            debug!(
                "node {} slot {} stole {} from node {}",
                node.node_id(),
                slot,
                desc.work,
                victim
            );
            Ok(Some(desc))
        }
        None => {
            thread::sleep(node.config().steal_backoff());
            Ok(None)
        }
    }
}

/// Answer a steal request from `source` (server side).
pub fn serve_steal(
    node: &Arc<Node>,
    request: &Envelope,
    source: usize,
) -> RuntimeResult<()> {
    node.stats.record_steal_attempt();
    let tag = reply_tag(request.source_worker as usize);

    match node.queues.pop_for_steal() {
        Some(desc) => {
            node.stats.record_steal_served();
            node.send_descriptor(
                source,
                desc,
                MessageKind::NormalEnqueue,
                tag,
                tag,
                SERVER_SLOT,
            )
        }
        None => {
            let reply = Envelope::control(MessageKind::NoWork, node.node_id(), SERVER_SLOT);
            node.comm().send(source, tag, reply.encode())?;
            Ok(())
        }
    }
}

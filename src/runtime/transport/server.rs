//! Per-node server thread.
//!
//! Receives every envelope addressed to this node and acts on it: enqueues
//! shipped tasks, applies answers, serves steal requests and handles the
//! control messages. Errors here have no caller to go to and abort the node.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{payload_tag, Envelope, MessageKind, Packet, TransportError, SERVER_TAG};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::node::{Node, SERVER_SLOT};
use crate::runtime::scheduler::{self, work_stealer};
use crate::runtime::task::TaskKind;

/// Run the server until a `TerminateLocalServer` arrives or, on a transport
/// that is not thread safe, until the node starts terminating.
pub fn server_loop(node: Arc<Node>) {
    info!("node {} server started", node.node_id());
    let interrupted = || node.terminating();
    loop {
        let packet = match node.comm().recv(None, SERVER_TAG, &interrupted) {
            Ok(packet) => packet,
            Err(TransportError::Interrupted) => break,
            Err(err) => node.abort("server receive", &err),
        };
        match dispatch(&node, packet) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => node.abort("server dispatch", &err),
        }
    }
    debug!("node {} server stopped", node.node_id());
}

/// Handle one envelope. Returns `false` when the server must stop.
fn dispatch(
    node: &Arc<Node>,
    packet: Packet,
) -> RuntimeResult<bool> {
    let envelope = Envelope::decode(&packet.bytes)?;
    if envelope.source_worker as usize > SERVER_SLOT {
        return Err(RuntimeError::InvalidSlot(envelope.source_worker));
    }
    let source = packet.source;
    let interrupted = || node.terminating();
    debug!(
        "node {} server: {:?} from node {} slot {}",
        node.node_id(),
        envelope.kind,
        source,
        envelope.source_worker
    );

    match envelope.kind {
        MessageKind::TerminateLocalServer => return Ok(false),
        MessageKind::TerminateWorkers => {
            node.set_terminating();
            node.set_appl_finished();
        }
        MessageKind::EnableStealing => node.set_stealing(true),
        MessageKind::DisableStealing => node.set_stealing(false),
        MessageKind::ResetStatistics => node.stats.reset(),
        MessageKind::Broadcast => node.receive_broadcast(&envelope, source, &interrupted)?,
        MessageKind::Answer => node.complete_answer(&envelope, source, &interrupted)?,
        MessageKind::StealRequest => work_stealer::serve_steal(node, &envelope, source)?,
        MessageKind::NormalEnqueue => enqueue(node, &envelope, source, &interrupted)?,
        MessageKind::NoWork => warn!(
            "node {} server: stray no-work reply from node {}",
            node.node_id(),
            source
        ),
    }
    Ok(true)
}

fn enqueue(
    node: &Arc<Node>,
    envelope: &Envelope,
    source: usize,
    interrupted: &dyn Fn() -> bool,
) -> RuntimeResult<()> {
    if envelope.home as usize == node.node_id() {
        let desc = node.rebuild_home(envelope)?;
        node.queues.push_public(desc, true);
        return Ok(());
    }

    let tag = payload_tag(envelope.source_worker as usize);
    let desc = node.receive_descriptor(envelope, source, tag, interrupted)?;
    if desc.kind == TaskKind::Direct {
        scheduler::execute(node, desc, SERVER_SLOT);
    } else {
        node.queues.push_hinted(desc);
    }
    Ok(())
}

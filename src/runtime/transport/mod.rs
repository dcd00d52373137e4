//! Inter-node transport
//!
//! Nodes exchange fixed-size envelopes (see [`wire`]) addressed to the
//! receiving node's server thread, followed by argument payloads sent as
//! separate messages tagged with the sender's worker slot. The [`Transport`]
//! trait is the narrow message-passing interface the runtime consumes;
//! [`local::LocalCluster`] provides an in-process implementation.

pub mod inflight;
pub mod local;
pub mod server;
pub mod wire;

pub use inflight::{InflightRecord, InflightTable};
pub use local::{LocalCluster, LocalTransport};
pub use wire::{Envelope, MessageKind, WireArg, WireError, ENVELOPE_SIZE};

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

use crate::runtime::node::SERVER_SLOT;

/// Message tag.
pub type Tag = u32;

/// Tag of envelopes addressed to a server thread.
pub const SERVER_TAG: Tag = 1000;

/// Offset added to a requester's slot to form its steal reply tag.
pub const REPLY_TAG_BASE: Tag = 100;

/// Tag of payloads sent by worker slot `slot`.
#[inline]
pub fn payload_tag(slot: usize) -> Tag {
    slot as Tag
}

/// Tag on which worker slot `slot` waits for steal replies.
#[inline]
pub fn reply_tag(slot: usize) -> Tag {
    let slot = if slot == SERVER_SLOT { SERVER_SLOT + 1 } else { slot };
    slot as Tag + REPLY_TAG_BASE
}

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sending node.
    pub source: usize,
    /// Message tag.
    pub tag: Tag,
    /// Message body.
    pub bytes: Vec<u8>,
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Destination outside the cluster.
    #[error("node {node} out of range ({nodes} nodes)")]
    InvalidNode { node: usize, nodes: usize },

    /// The node already has a runtime attached.
    #[error("node {0} is already attached")]
    AlreadyAttached(usize),

    /// A polling receive gave up because the node is shutting down.
    #[error("receive interrupted by shutdown")]
    Interrupted,

    /// The fabric is gone.
    #[error("transport closed")]
    Closed,
}

/// Point-to-point message passing between the nodes of a cluster.
///
/// Receives match on source (or any source) and tag; messages with the same
/// source and tag are delivered in send order.
pub trait Transport: Send + Sync + fmt::Debug {
    /// This node's rank.
    fn node_id(&self) -> usize;

    /// Number of nodes.
    fn num_nodes(&self) -> usize;

    /// Whether several threads may call into the transport at once.
    fn thread_safe(&self) -> bool;

    /// Claim the node for a runtime instance.
    fn attach(&self) -> Result<(), TransportError>;

    /// Send `bytes` to `dest` under `tag`.
    fn send(
        &self,
        dest: usize,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Block until a matching message arrives.
    fn recv(
        &self,
        source: Option<usize>,
        tag: Tag,
    ) -> Result<Packet, TransportError>;

    /// Take a matching message if one is queued.
    fn try_recv(
        &self,
        source: Option<usize>,
        tag: Tag,
    ) -> Result<Option<Packet>, TransportError>;

    /// Cluster-wide barrier.
    fn barrier(&self) -> Result<(), TransportError>;

    /// Exchange one value with every node; result is indexed by node id.
    fn all_gather(
        &self,
        value: u64,
    ) -> Result<Vec<u64>, TransportError>;
}

/// Transport access for the runtime's threads.
///
/// When the transport is not thread safe, one process-wide lock serializes
/// every call into it and receives turn into `try_recv` polling, so that a
/// waiting thread never holds the lock.
#[derive(Debug)]
pub struct Comm {
    transport: Arc<dyn Transport>,
    lock: Mutex<()>,
    thread_safe: bool,
    poll: Duration,
}

impl Comm {
    /// Wrap a transport; `poll` is the sleep between polling attempts.
    pub fn new(
        transport: Arc<dyn Transport>,
        poll: Duration,
    ) -> Self {
        let thread_safe = transport.thread_safe();
        Self {
            transport,
            lock: Mutex::new(()),
            thread_safe,
            poll,
        }
    }

    /// This node's rank.
    #[inline]
    pub fn node_id(&self) -> usize {
        self.transport.node_id()
    }

    /// Number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.transport.num_nodes()
    }

    /// Whether the coarse lock is bypassed.
    #[inline]
    pub fn thread_safe(&self) -> bool {
        self.thread_safe
    }

    /// Underlying transport.
    #[inline]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn critical(&self) -> Option<MutexGuard<'_, ()>> {
        if self.thread_safe {
            None
        } else {
            Some(self.lock.lock())
        }
    }

    /// Send a message.
    pub fn send(
        &self,
        dest: usize,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        let _cs = self.critical();
        self.transport.send(dest, tag, bytes)
    }

    /// Receive a matching message.
    ///
    /// On a transport that is not thread safe the call polls and returns
    /// [`TransportError::Interrupted`] once `interrupted` reports true.
    pub fn recv(
        &self,
        source: Option<usize>,
        tag: Tag,
        interrupted: &dyn Fn() -> bool,
    ) -> Result<Packet, TransportError> {
        if self.thread_safe {
            return self.transport.recv(source, tag);
        }
        loop {
            if interrupted() {
                return Err(TransportError::Interrupted);
            }
            let received = {
                let _cs = self.critical();
                self.transport.try_recv(source, tag)?
            };
            if let Some(packet) = received {
                return Ok(packet);
            }
            thread::sleep(self.poll);
        }
    }

    /// Cluster-wide barrier. Runs outside the coarse lock.
    pub fn barrier(&self) -> Result<(), TransportError> {
        self.transport.barrier()
    }

    /// Exchange one value with every node. Runs outside the coarse lock.
    pub fn all_gather(
        &self,
        value: u64,
    ) -> Result<Vec<u64>, TransportError> {
        self.transport.all_gather(value)
    }
}

#[cfg(test)]
mod tests;

//! Runtime errors

use thiserror::Error;

use crate::runtime::task::{BroadcastId, WorkId};
use crate::runtime::transport::{TransportError, WireError};
use crate::util::config::ConfigError;

/// Errors surfaced by the task-creation and lifecycle API.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// More arguments than a descriptor can hold.
    #[error("too many arguments: {count} (max {max})")]
    TooManyArguments { count: usize, max: usize },

    /// `Copy` scalar whose element width is neither 4 nor 8 bytes.
    #[error("argument {index}: copy scalar width {width} is not 4 or 8")]
    UnsupportedScalarWidth { index: usize, width: usize },

    /// Argument value does not fit its declared count or convention.
    #[error("argument {index}: {reason}")]
    ArgumentMismatch { index: usize, reason: &'static str },

    /// Work function id not present in the registry.
    #[error("work function {0} is not registered")]
    UnregisteredWork(WorkId),

    /// Broadcast target id not present in the registry.
    #[error("broadcast target {0} is not registered")]
    UnregisteredBroadcast(BroadcastId),

    /// Target worker outside the cluster.
    #[error("target worker {worker} out of range ({total} workers)")]
    InvalidTarget { worker: usize, total: usize },

    /// Target node outside the cluster.
    #[error("target node {node} out of range ({nodes} nodes)")]
    InvalidNode { node: usize, nodes: usize },

    /// A message names an in-flight token this node does not hold.
    #[error("unknown in-flight token {0}")]
    UnknownToken(u64),

    /// A payload does not match its argument's size.
    #[error("argument {index}: payload of {got} bytes, expected {expected}")]
    PayloadSize {
        index: usize,
        expected: usize,
        got: usize,
    },

    /// A message carries a sender slot outside the valid range.
    #[error("invalid sender slot {0}")]
    InvalidSlot(u32),

    /// The runtime is already running on this node.
    #[error("runtime already initialized on node {0}")]
    AlreadyInitialized(usize),

    /// Thread creation failed.
    #[error("failed to spawn {what}: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed message.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

//! Runtime system
//!
//! This module contains the task model, the per-node scheduler, the
//! inter-node transport and the node lifecycle.

pub mod error;
pub mod lifecycle;
pub mod node;
pub mod scheduler;
pub mod task;
pub mod transport;

pub use error::{RuntimeError, RuntimeResult};
pub use lifecycle::{Runtime, ShutdownReport};
pub use node::{Node, MAX_WORKERS, SERVER_SLOT};
pub use scheduler::{Step, StatsSnapshot, Target, TaskContext};
pub use task::{
    ArgSpec, ArgValue, BroadcastId, Buffer, CallConv, Datatype, Registry, TaskArgs, TaskKind,
    WorkId,
};
pub use transport::{LocalCluster, LocalTransport, Transport};

//! TORC task-parallel runtime
//!
//! Applications register work functions in a [`Registry`], start one
//! [`Runtime`] per node and create tasks through the [`TaskContext`] handed to
//! every work function. Tasks run on the worker threads of any node of the
//! cluster; their arguments travel with them according to each argument's
//! [`CallConv`].
//!
//! # Example
//!
//! ```no_run
//! use torc::{ArgSpec, LocalCluster, Registry, Runtime, RuntimeConfig, Target};
//!
//! let mut registry = Registry::new();
//! let hello = registry.register_task("hello", |ctx, args| {
//!     println!("task {} on node {}", args.scalar::<i32>(0), ctx.node_id());
//! });
//!
//! let cluster = LocalCluster::new(1);
//! let config = RuntimeConfig::default();
//! Runtime::run(config, registry, cluster.transport(0), |root| {
//!     for i in 0..4 {
//!         root.create(Target::Any, hello, vec![ArgSpec::copy(i)])?;
//!     }
//!     root.waitall();
//!     Ok(())
//! })
//! .unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/torc")]
#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod util;

pub use runtime::{
    ArgSpec, ArgValue, BroadcastId, Buffer, CallConv, Datatype, LocalCluster, LocalTransport,
    Registry, Runtime, RuntimeError, RuntimeResult, ShutdownReport, StatsSnapshot, Step, Target,
    TaskArgs, TaskContext, TaskKind, Transport, WorkId,
};
pub use util::config::RuntimeConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime name
pub const NAME: &str = "torc";

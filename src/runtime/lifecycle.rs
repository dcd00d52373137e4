//! Node startup and shutdown.
//!
//! [`Runtime::start`] brings one node up: worker counts are exchanged with
//! the other nodes, the server thread starts when there is more than one
//! node, and worker threads 1.. are spawned while the calling thread becomes
//! worker 0. [`Runtime::run`] is the usual entry point: the coordinator (node
//! 0) runs the application's main function and then finalizes; every other
//! node serves tasks until the coordinator tells it to stop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::utils::Backoff;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::node::Node;
use crate::runtime::scheduler::{run_forever, StatsSnapshot, TaskContext};
use crate::runtime::task::{DepCounter, Registry};
use crate::runtime::transport::{server, MessageKind, Transport, TransportError};
use crate::util::config::RuntimeConfig;

/// What a node reports when it shuts down without exiting the process.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// Node id.
    pub node: usize,
    /// Final statistics.
    pub stats: StatsSnapshot,
    /// Seconds between startup and shutdown.
    pub uptime_secs: f64,
}

impl ShutdownReport {
    /// JSON rendering, for tools that collect per-node reports.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A running node, owned by its worker 0.
pub struct Runtime {
    node: Arc<Node>,
    root_deps: Arc<DepCounter>,
    workers: Vec<JoinHandle<()>>,
    server: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Bring this node up. Every node of the cluster must call this.
    pub fn start(
        config: RuntimeConfig,
        registry: Registry,
        transport: Arc<dyn Transport>,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        transport.attach().map_err(|err| match err {
            TransportError::AlreadyAttached(node) => RuntimeError::AlreadyInitialized(node),
            other => RuntimeError::Transport(other),
        })?;

        let node = Arc::new(Node::new(config, Arc::new(registry), transport));
        let counts = node.comm().all_gather(node.local_workers() as u64)?;
        node.comm().barrier()?;
        node.set_workers_per_node(counts.into_iter().map(|c| c as usize).collect());
        node.comm().barrier()?;

        if node.is_coordinator() {
            info!(
                "torc: {} nodes, {} workers, workers per node {:?}",
                node.num_nodes(),
                node.total_workers(),
                node.workers_per_node()
            );
        }
        if let Some(factor) = node.config().throttling_factor {
            debug!("node {} throttling factor {}", node.node_id(), factor);
        }

        let server = if node.num_nodes() > 1 {
            let server_node = node.clone();
            let handle = thread::Builder::new()
                .name(format!("torc-{}-server", node.node_id()))
                .spawn(move || server::server_loop(server_node))
                .map_err(|source| RuntimeError::Spawn {
                    what: "server thread",
                    source,
                })?;
            Some(handle)
        } else {
            None
        };

        node.set_active_workers(node.local_workers());
        let mut workers = Vec::with_capacity(node.local_workers().saturating_sub(1));
        for slot in 1..node.local_workers() {
            let worker_node = node.clone();
            let handle = thread::Builder::new()
                .name(format!("torc-{}-w{}", node.node_id(), slot))
                .spawn(move || worker_main(worker_node, slot))
                .map_err(|source| RuntimeError::Spawn {
                    what: "worker thread",
                    source,
                })?;
            workers.push(handle);
        }

        node.worker_created();
        node.wait_all_created();
        node.comm().barrier()?;
        debug!(
            "node {} up with {} workers",
            node.node_id(),
            node.local_workers()
        );

        Ok(Self {
            node,
            root_deps: Arc::new(DepCounter::new()),
            workers,
            server,
        })
    }

    /// Start the node, run `main` on the coordinator and shut down.
    ///
    /// Returns `Ok(None)` when the node is already running. When
    /// `exit_on_shutdown` is set the process exits instead of returning.
    pub fn run<F>(
        config: RuntimeConfig,
        registry: Registry,
        transport: Arc<dyn Transport>,
        main: F,
    ) -> RuntimeResult<Option<ShutdownReport>>
    where
        F: FnOnce(&TaskContext<'_>) -> RuntimeResult<()>,
    {
        let runtime = match Self::start(config, registry, transport) {
            Ok(runtime) => runtime,
            Err(RuntimeError::AlreadyInitialized(node)) => {
                debug!("node {} already initialized", node);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        if runtime.is_coordinator() {
            let result = {
                let root = runtime.root();
                main(&root)
            };
            if let Err(err) = result {
                runtime.abort("application", &err);
            }
            runtime.finalize().map(Some)
        } else {
            runtime.serve().map(Some)
        }
    }

    /// Context of the application's main task on worker 0.
    pub fn root(&self) -> TaskContext<'_> {
        TaskContext::new(&self.node, 0, self.root_deps.clone(), 0)
    }

    #[inline]
    pub fn is_coordinator(&self) -> bool {
        self.node.is_coordinator()
    }

    #[inline]
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// End the application: stop every node's workers, then drain this one.
    pub fn finalize(self) -> RuntimeResult<ShutdownReport> {
        self.node.set_appl_finished();
        self.node
            .send_control_to_others(MessageKind::TerminateWorkers, 0)?;
        self.drain()
    }

    /// Run tasks on worker 0 until the coordinator finalizes, then drain.
    pub fn serve(self) -> RuntimeResult<ShutdownReport> {
        run_forever(&self.node, 0);
        self.drain()
    }

    /// Abort the job.
    pub fn abort(
        &self,
        op: &str,
        err: &dyn std::fmt::Display,
    ) -> ! {
        self.node.abort(op, err)
    }

    fn drain(mut self) -> RuntimeResult<ShutdownReport> {
        let node = self.node.clone();
        let poll = node.config().poll_interval();
        let backoff = Backoff::new();
        while node.active_workers() > 1 {
            if backoff.is_completed() {
                thread::sleep(poll);
            } else {
                backoff.snooze();
            }
        }

        node.comm().barrier()?;
        if let Some(server) = self.server.take() {
            if node.comm().thread_safe() {
                node.send_control(node.node_id(), MessageKind::TerminateLocalServer, 0)?;
            } else {
                node.set_terminating();
            }
            if server.join().is_err() {
                error!("node {} server thread panicked", node.node_id());
            }
        }

        let stats = node.stats_snapshot();
        if node.config().stats {
            info!("{}", stats);
        }
        node.comm().barrier()?;

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("node {} worker thread panicked", node.node_id());
            }
        }

        let report = ShutdownReport {
            node: node.node_id(),
            stats,
            uptime_secs: node.uptime(),
        };
        if node.config().exit_on_shutdown {
            info!("node {} done", node.node_id());
            std::process::exit(0);
        }
        Ok(report)
    }
}

fn worker_main(
    node: Arc<Node>,
    slot: usize,
) {
    node.worker_created();
    node.wait_all_created();
    run_forever(&node, slot);
    node.worker_exited();
}

//! Scheduler 单元测试
//!
//! 就绪队列、统计计数与单节点调度行为

mod stats;

use std::sync::Arc;

use crate::runtime::node::Node;
use crate::runtime::task::Registry;
use crate::runtime::transport::LocalCluster;
use crate::util::config::RuntimeConfig;

/// A single-node `Node` that is not started: no threads, no server.
pub(super) fn standalone_node(
    registry: Registry,
    workers: usize,
) -> Arc<Node> {
    let cluster = LocalCluster::new(1);
    let config = RuntimeConfig {
        workers,
        poll_interval_ms: 1,
        steal_backoff_ms: 1,
        exit_on_shutdown: false,
        stats: false,
        ..RuntimeConfig::default()
    };
    let node = Node::new(config, Arc::new(registry), cluster.transport(0));
    node.set_workers_per_node(vec![workers]);
    Arc::new(node)
}

//! Per-node execution and stealing statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use serde::Serialize;

use crate::runtime::node::SERVER_SLOT;

/// Counters of one node.
#[derive(Debug)]
pub struct NodeStats {
    created: Vec<CachePadded<AtomicU64>>,
    executed: Vec<CachePadded<AtomicU64>>,
    steal_served: AtomicU64,
    steal_attempts: AtomicU64,
    steal_hits: AtomicU64,
}

impl NodeStats {
    /// Counters for every worker slot plus the server slot.
    pub fn new() -> Self {
        let slots = SERVER_SLOT + 1;
        Self {
            created: (0..slots).map(|_| CachePadded::new(AtomicU64::new(0))).collect(),
            executed: (0..slots).map(|_| CachePadded::new(AtomicU64::new(0))).collect(),
            steal_served: AtomicU64::new(0),
            steal_attempts: AtomicU64::new(0),
            steal_hits: AtomicU64::new(0),
        }
    }

    /// Record a task created by `slot`.
    #[inline]
    pub fn record_created(
        &self,
        slot: usize,
    ) {
        if let Some(counter) = self.created.get(slot) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a task executed by `slot`.
    #[inline]
    pub fn record_executed(
        &self,
        slot: usize,
    ) {
        if let Some(counter) = self.executed.get(slot) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a steal request received by this node.
    #[inline]
    pub fn record_steal_attempt(&self) {
        self.steal_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a steal request answered with work.
    #[inline]
    pub fn record_steal_served(&self) {
        self.steal_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful steal by this node.
    #[inline]
    pub fn record_steal_hit(&self) {
        self.steal_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Clear the created/executed counters.
    pub fn reset(&self) {
        for counter in self.created.iter().chain(self.executed.iter()) {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Copy the counters out; `workers` limits the per-worker list.
    pub fn snapshot(
        &self,
        node: usize,
        workers: usize,
    ) -> StatsSnapshot {
        let load = |c: &CachePadded<AtomicU64>| c.load(Ordering::Relaxed);
        StatsSnapshot {
            node,
            created: self.created.iter().map(load).sum(),
            executed: self.executed.iter().map(load).sum(),
            executed_per_worker: self.executed.iter().take(workers).map(load).collect(),
            steal_served: self.steal_served.load(Ordering::Relaxed),
            steal_attempts: self.steal_attempts.load(Ordering::Relaxed),
            steal_hits: self.steal_hits.load(Ordering::Relaxed),
        }
    }
}

impl Default for NodeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time statistics of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub node: usize,
    pub created: u64,
    pub executed: u64,
    pub executed_per_worker: Vec<u64>,
    pub steal_served: u64,
    pub steal_attempts: u64,
    pub steal_hits: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "[{:2}] steals served/attempts/hits = {}/{}/{} created = {}, executed = {}:(",
            self.node,
            self.steal_served,
            self.steal_attempts,
            self.steal_hits,
            self.created,
            self.executed
        )?;
        for (i, count) in self.executed_per_worker.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", count)?;
        }
        write!(f, ")")
    }
}

//! Home-node records of descriptors living on other nodes.
//!
//! When a descriptor leaves its home node, the parent counter and the home
//! argument storage stay behind in this table under a fresh token. The token
//! travels with the descriptor; the answer (or a steal back to the home node)
//! takes the record out again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::runtime::task::{Argument, DepCounter, TaskKind};

/// What the home node keeps for a shipped descriptor.
#[derive(Debug)]
pub struct InflightRecord {
    /// Counter to satisfy on completion.
    pub parent: Option<Arc<DepCounter>>,
    /// Arguments with their home storage.
    pub args: SmallVec<[Argument; 4]>,
    /// Tracking mode.
    pub kind: TaskKind,
}

/// Token-indexed in-flight records.
#[derive(Debug)]
pub struct InflightTable {
    next: AtomicU64,
    records: Mutex<HashMap<u64, InflightRecord>>,
}

impl InflightTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Store a record and return its token. Tokens are never zero.
    pub fn insert(
        &self,
        record: InflightRecord,
    ) -> u64 {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        self.records.lock().insert(token, record);
        token
    }

    /// Remove and return the record for `token`.
    pub fn take(
        &self,
        token: u64,
    ) -> Option<InflightRecord> {
        self.records.lock().remove(&token)
    }

    /// Number of descriptors away from home.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether every descriptor is home.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for InflightTable {
    fn default() -> Self {
        Self::new()
    }
}

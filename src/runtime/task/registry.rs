//! Work-function registry
//!
//! Maps work functions and broadcast targets to stable numeric ids. Every node
//! must register the same functions in the same order before the runtime
//! starts, so that an id carried in a message resolves to the same function on
//! the receiving node. Function pointers themselves never cross the transport.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::args::TaskArgs;
use super::buffer::Buffer;
use crate::runtime::scheduler::context::TaskContext;

/// Stable id of a registered work function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(pub u32);

impl fmt::Display for WorkId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "work#{}", self.0)
    }
}

/// Stable id of a registered broadcast target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BroadcastId(pub u32);

impl fmt::Display for BroadcastId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "bcast#{}", self.0)
    }
}

/// Signature of a work function.
pub type WorkFn = Arc<dyn Fn(&TaskContext<'_>, &mut TaskArgs<'_>) + Send + Sync>;

/// A registered work function.
#[derive(Clone)]
pub struct WorkFunction {
    /// Registration name
    pub name: String,
    /// Callable
    pub func: WorkFn,
}

/// Capability table shared by all workers of a node.
#[derive(Default)]
pub struct Registry {
    functions: IndexMap<String, WorkFunction>,
    broadcasts: IndexMap<String, Buffer>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            functions: IndexMap::new(),
            broadcasts: IndexMap::new(),
        }
    }

    /// Register a work function. Registering a name twice replaces the
    /// function and keeps its id.
    pub fn register_task<F>(
        &mut self,
        name: &str,
        func: F,
    ) -> WorkId
    where
        F: Fn(&TaskContext<'_>, &mut TaskArgs<'_>) + Send + Sync + 'static,
    {
        let (index, _) = self.functions.insert_full(
            name.to_string(),
            WorkFunction {
                name: name.to_string(),
                func: Arc::new(func),
            },
        );
        WorkId(index as u32)
    }

    /// Register the buffer that receives broadcasts under `name` on this node.
    pub fn register_broadcast(
        &mut self,
        name: &str,
        buffer: Buffer,
    ) -> BroadcastId {
        let (index, _) = self.broadcasts.insert_full(name.to_string(), buffer);
        BroadcastId(index as u32)
    }

    /// Resolve a work id.
    #[inline]
    pub fn get(
        &self,
        id: WorkId,
    ) -> Option<&WorkFunction> {
        self.functions
            .get_index(id.0 as usize)
            .map(|(_, func)| func)
    }

    /// Look a work function up by name.
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<WorkId> {
        self.functions
            .get_index_of(name)
            .map(|index| WorkId(index as u32))
    }

    /// Resolve a broadcast id.
    #[inline]
    pub fn broadcast_target(
        &self,
        id: BroadcastId,
    ) -> Option<&Buffer> {
        self.broadcasts
            .get_index(id.0 as usize)
            .map(|(_, buffer)| buffer)
    }

    /// Look a broadcast target up by name.
    pub fn broadcast_id(
        &self,
        name: &str,
    ) -> Option<BroadcastId> {
        self.broadcasts
            .get_index_of(name)
            .map(|index| BroadcastId(index as u32))
    }

    /// Number of registered work functions.
    #[inline]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether no work function is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("broadcasts", &self.broadcasts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Debug for WorkFunction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WorkFunction")
            .field("name", &self.name)
            .finish()
    }
}

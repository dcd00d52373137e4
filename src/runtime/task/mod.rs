//! Task descriptors, arguments and the work registry
//!
//! A task is a registered work function plus up to [`MAX_ARGS`] arguments,
//! each carrying an element count, a [`Datatype`] and a [`CallConv`].

pub mod args;
pub mod buffer;
pub mod datatype;
pub mod descriptor;
pub mod pool;
pub mod registry;

pub use args::{marshal, ArgSpec, ArgValue, Argument, CallConv, Slot, TaskArgs, MAX_ARGS};
pub use buffer::Buffer;
pub use datatype::{Datatype, Element};
pub use descriptor::{DepCounter, Descriptor, TaskKind};
pub use pool::DescriptorPool;
pub use registry::{BroadcastId, Registry, WorkFn, WorkFunction, WorkId};

#[cfg(test)]
mod tests;

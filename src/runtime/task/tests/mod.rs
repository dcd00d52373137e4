//! Task layer unit tests

mod pool;
mod registry;

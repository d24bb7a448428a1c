//! Mock store implementations for testing.

pub mod memory;

pub use memory::MockQueueStore;

//! In-memory implementations for tests.

pub mod memory;

pub use memory::MemoryWriter;

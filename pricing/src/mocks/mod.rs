//! Mock repository implementations for testing.

pub mod memory;

pub use memory::MockRuleRepository;

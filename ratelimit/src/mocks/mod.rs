//! In-memory implementations of the limiter's providers.

pub mod memory;

pub use memory::MockRateLimitStore;

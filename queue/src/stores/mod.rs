//! Production implementations of the queue store.

pub mod redis;

pub use self::redis::RedisQueueStore;

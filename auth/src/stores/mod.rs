//! Production implementations of the identity providers.

pub mod blacklist_redis;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use blacklist_redis::RedisTokenBlacklist;

//! Production window stores.

pub mod redis;

pub use self::redis::RedisRateLimitStore;

//! Redis-based sliding-window store.
//!
//! # Algorithm
//!
//! One Lua script per check, so garbage collection, the count, the
//! conditional add and the ttl refresh are a single step on the server:
//!
//! 1. `ZREMRANGEBYSCORE key -inf (now-window` drops arrivals older than the window
//! 2. the costs encoded in the remaining members are summed
//! 3. if `used + cost <= limit` the request is added with score `now`
//! 4. `PEXPIRE key 2×window`
//!
//! Concurrent checkers on different nodes therefore cannot race past the
//! limit.
//!
//! # Example
//!
//! ```no_run
//! use travio_ratelimit::stores::RedisRateLimitStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisRateLimitStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{RateLimitError, Result};
use crate::providers::{Acquire, RateLimitStore, WindowState, score_micros, window_micros};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;

const USAGE_FN: &str = r"
local function usage(key)
    local used = 0
    for _, member in ipairs(redis.call('ZRANGE', key, 0, -1)) do
        used = used + (tonumber(string.match(member, ':(%d+)$')) or 1)
    end
    return used
end
";

const ACQUIRE_BODY: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', string.format('(%d', now - window))
local used = usage(KEYS[1])
local allowed = 0
if used + tonumber(ARGV[4]) <= tonumber(ARGV[3]) then
    redis.call('ZADD', KEYS[1], now, ARGV[5])
    allowed = 1
end
redis.call('PEXPIRE', KEYS[1], math.max(1, math.floor(window * 2 / 1000)))
return {allowed, used}
";

const USAGE_BODY: &str = r"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', string.format('(%d', tonumber(ARGV[1]) - tonumber(ARGV[2])))
return usage(KEYS[1])
";

/// `Redis` sliding-window store.
///
/// Clones share the same `ConnectionManager`.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    conn_manager: ConnectionManager,
    acquire_script: Script,
    usage_script: Script,
}

impl RedisRateLimitStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Cache`] if the URL is malformed or the
    /// connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| RateLimitError::Cache(format!("Failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            RateLimitError::Cache(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisRateLimitStore initialized");
        Ok(Self::from_manager(conn_manager))
    }

    /// Build from an existing connection manager.
    #[must_use]
    pub fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            acquire_script: Script::new(&format!("{USAGE_FN}{ACQUIRE_BODY}")),
            usage_script: Script::new(&format!("{USAGE_FN}{USAGE_BODY}")),
        }
    }
}

impl RateLimitStore for RedisRateLimitStore {
    async fn acquire(&self, request: &Acquire<'_>, now: DateTime<Utc>) -> Result<WindowState> {
        let mut conn = self.conn_manager.clone();
        let (allowed, used): (i64, i64) = self
            .acquire_script
            .key(request.key)
            .arg(score_micros(now))
            .arg(window_micros(request.window))
            .arg(request.limit)
            .arg(request.cost)
            .arg(request.member)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Cache(format!("Rate limit script failed: {e}")))?;

        Ok(WindowState {
            allowed: allowed == 1,
            used: u64::try_from(used).unwrap_or(0),
        })
    }

    async fn usage(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let used: i64 = self
            .usage_script
            .key(key)
            .arg(score_micros(now))
            .arg(window_micros(window))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Cache(format!("Usage script failed: {e}")))?;
        Ok(u64::try_from(used).unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| RateLimitError::Cache(format!("Failed to reset window: {e}")))
    }
}

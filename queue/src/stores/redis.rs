//! Redis-based queue store.
//!
//! # Architecture
//!
//! Every multi-key transition is a Lua script so that concurrent nodes see
//! each transition as one step:
//!
//! - **enqueue**: `ZADD NX` plus a conditional entry write; a repeated join
//!   keeps its original score
//! - **admit**: `ZPOPMIN`, ticket writes, entry rewrites and the `HINCRBY`
//!   happen together, so a crash cannot pop a user without a ticket
//! - **consume**: ticket delete plus entry completion
//!
//! Tickets are minted by the caller and passed in as arguments; scripts stay
//! deterministic and never generate randomness.
//!
//! # Example
//!
//! ```no_run
//! use travio_queue::stores::RedisQueueStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisQueueStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::model::{Admitted, JoinStatus, QueueEntry, Ticket};
use crate::providers::{Enqueued, QueueStore};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;

const ENQUEUE_SCRIPT: &str = r"
local added = redis.call('ZADD', KEYS[1], 'NX', ARGV[2], ARGV[1])
if added == 1 or redis.call('EXISTS', KEYS[2]) == 0 then
    redis.call('SET', KEYS[2], ARGV[3], 'EX', ARGV[4])
end
local rank = redis.call('ZRANK', KEYS[1], ARGV[1])
return {added, rank}
";

const ADMIT_SCRIPT: &str = r"
local event_id = ARGV[1]
local ttl = ARGV[2]
local expires_at = ARGV[3]
local wanted = #ARGV - 3
if wanted <= 0 then
    return {}
end
local popped = redis.call('ZPOPMIN', KEYS[1], wanted)
local out = {}
local count = #popped / 2
for i = 1, count do
    local user = popped[2 * i - 1]
    local ticket = ARGV[3 + i]
    redis.call('SET', 'queue:token:' .. ticket,
        cjson.encode({user_id = user, event_id = event_id, expires_at = expires_at}),
        'EX', ttl)
    local entry_key = 'queue:' .. event_id .. ':entry:' .. user
    local raw = redis.call('GET', entry_key)
    if raw then
        local entry = cjson.decode(raw)
        entry.status = 'ready'
        entry.token = ticket
        entry.position = 0
        entry.estimated_wait_secs = 0
        entry.expires_at = expires_at
        redis.call('SET', entry_key, cjson.encode(entry), 'EX', ttl)
    end
    table.insert(out, user)
    table.insert(out, ticket)
end
if count > 0 then
    redis.call('HINCRBY', KEYS[2], 'admitted', count)
end
return out
";

const CONSUME_SCRIPT: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return false
end
redis.call('DEL', KEYS[1])
local ticket = cjson.decode(raw)
local entry_key = 'queue:' .. ticket.event_id .. ':entry:' .. ticket.user_id
local entry_raw = redis.call('GET', entry_key)
if entry_raw then
    local entry = cjson.decode(entry_raw)
    entry.status = 'completed'
    redis.call('SET', entry_key, cjson.encode(entry), 'KEEPTTL')
end
return raw
";

/// `Redis` queue store.
///
/// Clones share the same `ConnectionManager`.
#[derive(Clone)]
pub struct RedisQueueStore {
    conn_manager: ConnectionManager,
    enqueue_script: Script,
    admit_script: Script,
    consume_script: Script,
}

impl RedisQueueStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cache`] if the URL is malformed or the
    /// connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| QueueError::Cache(format!("Failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            QueueError::Cache(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisQueueStore initialized");
        Ok(Self::from_manager(conn_manager))
    }

    /// Build from an existing connection manager.
    #[must_use]
    pub fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            enqueue_script: Script::new(ENQUEUE_SCRIPT),
            admit_script: Script::new(ADMIT_SCRIPT),
            consume_script: Script::new(CONSUME_SCRIPT),
        }
    }

    /// Waiting set key.
    #[must_use]
    pub fn queue_key(event_id: &str) -> String {
        format!("queue:{event_id}")
    }

    /// Entry blob key.
    #[must_use]
    pub fn entry_key(event_id: &str, user_id: &str) -> String {
        format!("queue:{event_id}:entry:{user_id}")
    }

    /// Stats hash key.
    #[must_use]
    pub fn stats_key(event_id: &str) -> String {
        format!("queue:{event_id}:stats")
    }

    /// Config blob key.
    #[must_use]
    pub fn config_key(event_id: &str) -> String {
        format!("queue:{event_id}:config")
    }

    /// Ticket key.
    #[must_use]
    pub fn ticket_key(ticket: &str) -> String {
        format!("queue:token:{ticket}")
    }
}

fn cache_error(context: &str, e: &redis::RedisError) -> QueueError {
    QueueError::Cache(format!("{context}: {e}"))
}

impl QueueStore for RedisQueueStore {
    async fn enqueue(&self, entry: &QueueEntry, score: f64, entry_ttl: Duration) -> Result<Enqueued> {
        let blob = serde_json::to_string(entry)?;
        let mut conn = self.conn_manager.clone();

        let (added, rank): (i64, i64) = self
            .enqueue_script
            .key(Self::queue_key(&entry.event_id))
            .key(Self::entry_key(&entry.event_id, &entry.user_id))
            .arg(&entry.user_id)
            .arg(score)
            .arg(blob)
            .arg(entry_ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_error("Enqueue script failed", &e))?;

        Ok(Enqueued {
            status: if added == 1 { JoinStatus::New } else { JoinStatus::Existing },
            rank: u64::try_from(rank).unwrap_or(0),
        })
    }

    async fn entry(&self, event_id: &str, user_id: &str) -> Result<Option<QueueEntry>> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = conn
            .get(Self::entry_key(event_id, user_id))
            .await
            .map_err(|e| cache_error("Failed to read entry", &e))?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(QueueError::from))
            .transpose()
    }

    async fn rank(&self, event_id: &str, user_id: &str) -> Result<Option<u64>> {
        let mut conn = self.conn_manager.clone();
        let rank: Option<u64> = conn
            .zrank(Self::queue_key(event_id), user_id)
            .await
            .map_err(|e| cache_error("Failed to read rank", &e))?;
        Ok(rank)
    }

    async fn remove(&self, event_id: &str, user_id: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        redis::pipe()
            .atomic()
            .zrem(Self::queue_key(event_id), user_id)
            .ignore()
            .del(Self::entry_key(event_id, user_id))
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| cache_error("Failed to leave queue", &e))
    }

    async fn admit(
        &self,
        event_id: &str,
        tickets: &[String],
        ticket_ttl: Duration,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<Admitted>> {
        if tickets.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn_manager.clone();
        let mut invocation = self.admit_script.prepare_invoke();
        invocation
            .key(Self::queue_key(event_id))
            .key(Self::stats_key(event_id))
            .arg(event_id)
            .arg(ticket_ttl.as_secs().max(1))
            .arg(expires_at.to_rfc3339());
        for ticket in tickets {
            invocation.arg(ticket);
        }

        let flat: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_error("Admit script failed", &e))?;

        Ok(flat
            .chunks_exact(2)
            .map(|pair| Admitted {
                user_id: pair[0].clone(),
                ticket: pair[1].clone(),
            })
            .collect())
    }

    async fn ticket(&self, ticket: &str) -> Result<Option<Ticket>> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = conn
            .get(Self::ticket_key(ticket))
            .await
            .map_err(|e| cache_error("Failed to read ticket", &e))?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(QueueError::from))
            .transpose()
    }

    async fn consume(&self, ticket: &str) -> Result<Option<Ticket>> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = self
            .consume_script
            .key(Self::ticket_key(ticket))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_error("Consume script failed", &e))?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(QueueError::from))
            .transpose()
    }

    async fn waiting_count(&self, event_id: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        conn.zcard(Self::queue_key(event_id))
            .await
            .map_err(|e| cache_error("Failed to count waiting users", &e))
    }

    async fn admitted_count(&self, event_id: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let admitted: Option<u64> = conn
            .hget(Self::stats_key(event_id), "admitted")
            .await
            .map_err(|e| cache_error("Failed to read admitted counter", &e))?;
        Ok(admitted.unwrap_or(0))
    }

    async fn save_config(&self, config: &QueueConfig) -> Result<()> {
        let blob = serde_json::to_string(config)?;
        let mut conn = self.conn_manager.clone();
        conn.set::<_, _, ()>(Self::config_key(&config.event_id), blob)
            .await
            .map_err(|e| cache_error("Failed to save queue config", &e))
    }

    async fn load_config(&self, event_id: &str) -> Result<Option<QueueConfig>> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = conn
            .get(Self::config_key(event_id))
            .await
            .map_err(|e| cache_error("Failed to load queue config", &e))?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(QueueError::from))
            .transpose()
    }
}

//! Redis-backed counter store
//!
//! Lets several router processes share usage counters, cooldowns and budget
//! windows. Check-and-increment runs as a Lua script so it is atomic on the
//! server; TTLs are attached only when a key is created.

use super::keys::CounterKey;
use super::store::CounterStore;
use crate::config::RedisConfig;
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use redis::{Client, Script, aio::MultiplexedConnection};
use std::time::Duration;
use tracing::{debug, info};

const INCREMENT_AND_CHECK: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local amount = tonumber(ARGV[1])
if current + amount > tonumber(ARGV[2]) then
    return {current, 0}
end
local value = redis.call('INCRBY', KEYS[1], amount)
if redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[3])
end
return {value, 1}
"#;

const INCREMENT: &str = r#"
local value = redis.call('INCRBY', KEYS[1], ARGV[1])
if redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return value
"#;

const SCAN_BATCH: usize = 500;

/// Counter store on a multiplexed Redis connection
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: MultiplexedConnection,
    increment_and_check: Script,
    increment: Script,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect using `config.url`, bounded by `config.connection_timeout` seconds
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        info!("Connecting counter store to Redis");
        debug!("Redis URL: {}", sanitize_url(&config.url));

        let client = Client::open(config.url.as_str()).map_err(GatewayError::Redis)?;
        let timeout = Duration::from_secs(config.connection_timeout.max(1));
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                GatewayError::store(format!(
                    "Timed out connecting to Redis at {}",
                    sanitize_url(&config.url)
                ))
            })?
            .map_err(GatewayError::Redis)?;

        info!("Redis counter store connected");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            increment_and_check: Script::new(INCREMENT_AND_CHECK),
            increment: Script::new(INCREMENT),
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Escape glob metacharacters so a prefix matches literally in SCAN MATCH
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

/// Sanitize Redis URL for logging (hide password)
pub(crate) fn sanitize_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut sanitized = parsed.clone();
        if sanitized.password().is_some() {
            let _ = sanitized.set_password(Some("***"));
        }
        sanitized.to_string()
    } else {
        "invalid_url".to_string()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_check(&self, key: &CounterKey, amount: i64, limit: i64, ttl: Duration) -> Result<(i64, bool)> {
        let mut conn = self.conn.clone();
        let (value, admitted): (i64, i64) = self
            .increment_and_check
            .key(key.as_str())
            .arg(amount)
            .arg(limit)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(GatewayError::Redis)?;
        Ok((value, admitted == 1))
    }

    async fn increment(&self, key: &CounterKey, amount: i64, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .increment
            .key(key.as_str())
            .arg(amount)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(GatewayError::Redis)?;
        Ok(value)
    }

    async fn get(&self, key: &CounterKey) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET")
            .arg(key.as_str())
            .query_async(&mut conn)
            .await
            .map_err(GatewayError::Redis)?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &CounterKey, value: i64, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(GatewayError::Redis)?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &CounterKey, value: i64, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(GatewayError::Redis)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &CounterKey) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key.as_str())
            .query_async(&mut conn)
            .await
            .map_err(GatewayError::Redis)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let pattern = glob_escape(prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(GatewayError::Redis)?;
            if !keys.is_empty() {
                let deleted: i64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(GatewayError::Redis)?;
                removed += deleted.max(0) as usize;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }

    async fn purge_expired(&self) -> Result<usize> {
        // Redis expires keys itself
        Ok(0)
    }
}

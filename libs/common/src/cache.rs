//! Redis module for the Resume Rewriter gate
//!
//! This module provides the Redis connection used when rate-limit counters
//! must be shared across several gate instances. Counters are fixed-window:
//! the first hit creates the key with a millisecond TTL, later hits increment
//! it until the cap, and Redis expiry discards the window.

use anyhow::Result;
use redis::{Client, Script};
use tracing::info;

/// Checks the counter, increments it only while under the cap, and arms the
/// window expiry on the first hit. Returns 1 when the caller is limited.
const FIXED_WINDOW_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
  return 1
end
current = redis.call('INCR', KEYS[1])
if current == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Prefix applied to every counter key
    pub key_prefix: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_KEY_PREFIX`: Prefix for rate-limit keys (default: "ratelimit")
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let key_prefix =
            std::env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "ratelimit".to_string());

        Ok(RedisConfig { url, key_prefix })
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    key_prefix: String,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Record one hit against a fixed-window counter
    ///
    /// Returns `true` when the counter already reached `max` inside the
    /// current window; such hits do not increment the counter.
    pub async fn fixed_window_hit(&self, key: &str, max: u32, window_ms: u64) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let script = Script::new(FIXED_WINDOW_SCRIPT);
        let limited: i64 = script
            .key(format!("{}:{}", self.key_prefix, key))
            .arg(max)
            .arg(window_ms.max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(limited == 1)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> RedisConfig {
        RedisConfig {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "ratelimit-test".to_string(),
        }
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_redis_connection() -> Result<()> {
        let pool = RedisPool::new(&local_config()).await?;
        assert!(pool.health_check().await?);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_fixed_window_caps_hits() -> Result<()> {
        let pool = RedisPool::new(&local_config()).await?;
        let key = format!("cap:{}", std::process::id());

        assert!(!pool.fixed_window_hit(&key, 2, 5_000).await?);
        assert!(!pool.fixed_window_hit(&key, 2, 5_000).await?);
        assert!(pool.fixed_window_hit(&key, 2, 5_000).await?);
        Ok(())
    }
}

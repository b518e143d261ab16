//! Rate limiter for throttling requests per client address
//!
//! Fixed-window counters keyed by `purpose:client_addr`. The first hit (or the
//! first hit after the window elapsed) opens a new window with a count of 1;
//! further hits are admitted and counted while `count < max`, and denied
//! without counting once the cap is reached. A burst straddling a window
//! boundary can therefore see up to `2 * max` admissions.
//!
//! Counters live behind [`CounterStore`]. The in-process store shards its
//! table so the periodic sweep never holds one lock over the whole table;
//! the Redis store shares counters between gate instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{cache::RedisPool, clock::Clock};
use std::{
    collections::{HashMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

const DEFAULT_SHARDS: usize = 16;

/// Throttling rule for one purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    /// Key prefix separating counters of different endpoints
    pub purpose: &'static str,
    /// Window length
    pub window: Duration,
    /// Maximum admitted requests per window
    pub max_requests: u32,
}

impl RatePolicy {
    pub const fn per_minute(purpose: &'static str, max_requests: u32) -> Self {
        Self {
            purpose,
            window: Duration::from_secs(60),
            max_requests,
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limited: bool,
}

/// Storage for fixed-window counters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Record one request against `key`; returns `true` when it is limited
    ///
    /// The read-check-increment must be atomic per key.
    async fn hit(&self, key: &str, window: Duration, max: u32, now: DateTime<Utc>)
    -> anyhow::Result<bool>;

    /// Discard counters whose window ended before `now`; returns how many
    async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<usize>;
}

/// Rate limiter entry
#[derive(Debug)]
struct RateLimiterEntry {
    /// Requests admitted in the current window
    count: u32,
    /// End of the current window
    window_reset_at: DateTime<Utc>,
}

/// In-process counter store
pub struct InMemoryCounterStore {
    shards: Vec<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl InMemoryCounterStore {
    /// Create a store with the default number of shards
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create a store with `shards` independently locked tables
    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1))
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    /// Number of live counters across all shards
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, RateLimiterEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        max: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        if max == 0 {
            return Ok(true);
        }

        let mut entries = self.shard(key).lock().await;

        match entries.get_mut(key) {
            Some(entry) if now <= entry.window_reset_at => {
                if entry.count >= max {
                    return Ok(true);
                }
                entry.count += 1;
                Ok(false)
            }
            _ => {
                let window = chrono::Duration::from_std(window)?;
                entries.insert(
                    key.to_string(),
                    RateLimiterEntry {
                        count: 1,
                        window_reset_at: now + window,
                    },
                );
                Ok(false)
            }
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut evicted = 0;
        for shard in &self.shards {
            let mut entries = shard.lock().await;
            let before = entries.len();
            entries.retain(|_, entry| now <= entry.window_reset_at);
            evicted += before - entries.len();
        }
        Ok(evicted)
    }
}

/// Counter store shared through Redis
#[derive(Clone)]
pub struct RedisCounterStore {
    pool: RedisPool,
}

impl RedisCounterStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        max: u32,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        if max == 0 {
            return Ok(true);
        }
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self.pool.fixed_window_hit(key, max, window_ms).await
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> anyhow::Result<usize> {
        // Redis expires window keys on its own
        Ok(0)
    }
}

/// Rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Check whether `client_addr` may make another `purpose` request
    ///
    /// Store failures are logged and the request is let through.
    pub async fn check(
        &self,
        purpose: &str,
        client_addr: &str,
        window: Duration,
        max: u32,
    ) -> RateLimitDecision {
        let key = format!("{}:{}", purpose, client_addr);

        match self.store.hit(&key, window, max, self.clock.now()).await {
            Ok(limited) => {
                if limited {
                    info!("Rate limited key {}", key);
                }
                RateLimitDecision { limited }
            }
            Err(e) => {
                warn!("Rate limit store failed for key {}, allowing request: {}", key, e);
                RateLimitDecision { limited: false }
            }
        }
    }

    /// Check a request against a [`RatePolicy`]
    pub async fn check_policy(&self, policy: &RatePolicy, client_addr: &str) -> RateLimitDecision {
        self.check(
            policy.purpose,
            client_addr,
            policy.window,
            policy.max_requests,
        )
        .await
    }

    /// Evict stale counters
    pub async fn sweep(&self) -> usize {
        match self.store.sweep(self.clock.now()).await {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!("Rate limit sweep failed: {}", e);
                0
            }
        }
    }
}

/// Sweep stale counters every `every`, independent of request traffic
pub fn spawn_sweeper(limiter: RateLimiter, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = limiter.sweep().await;
            if evicted > 0 {
                debug!("Rate limit sweep evicted {} counters", evicted);
            }
        }
    })
}

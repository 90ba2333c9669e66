mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

pub use memory::{MemoryStore, sweeper};
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

// What a store reports back for one hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,     // hits inside the window, this one included (limit + 1 when refused)
    pub oldest_ms: u64, // timestamp of the oldest hit still inside the window
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unreachable: {0}")]
    Unreachable(String),

    #[error("counter store returned an unexpected reply: {0}")]
    BadReply(String),
}

// Shared sliding-window counter.
//
// `hit` drops observations for `key` that are at least `window` old, then
// records one at `now_ms` only if fewer than `limit` remain. A refused hit is
// reported as `limit + 1` and leaves no trace, so a log never holds more than
// `limit` entries and a denied client is not pushed further out. All of it
// is atomic per key. Never retried on failure.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn hit(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowCount, StoreError>;
}

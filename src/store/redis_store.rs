use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::{CounterStore, StoreError, WindowCount};

// Trim, maybe record, count and read the oldest entry in one round trip.
// Runs as a single script so concurrent gateways see a consistent log.
// With ARGV[5] == 'server' the Redis clock replaces the caller's, so
// gateways with skewed clocks still agree on what is inside the window.
// Returns {held + 1, oldest_ms}.
const SLIDING_LOG: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

if ARGV[5] == 'server' then
  local t = redis.call('TIME')
  now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
end

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local held = redis.call('ZCARD', key)
if held < limit then
  redis.call('ZADD', key, now, ARGV[4])
  redis.call('PEXPIRE', key, window)
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] == nil then
  return { held + 1, now }
end
return { held + 1, tonumber(oldest[2]) }
"#;

// Redis-backed store, shared by every gateway instance pointing at it
pub struct RedisStore {
    conn: ConnectionManager,
    script: Script,
    server_clock: bool,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        Ok(Self {
            conn,
            script: Script::new(SLIDING_LOG),
            server_clock: true,
        })
    }

    // Use the `now_ms` handed to `hit` instead of the Redis clock
    pub fn with_caller_clock(mut self) -> Self {
        self.server_clock = false;
        self
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn hit(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowCount, StoreError> {
        // sorted-set members must be unique or same-millisecond hits collapse
        let member = format!("{}-{:016x}", now_ms, rand::random::<u64>());
        let clock = if self.server_clock { "server" } else { "caller" };
        let mut conn = self.conn.clone();

        let (count, oldest_ms): (u64, u64) = self
            .script
            .key(key)
            .arg(now_ms)
            .arg(window.as_millis() as u64)
            .arg(limit)
            .arg(member)
            .arg(clock)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() {
                    StoreError::Unreachable(e.to_string())
                } else {
                    StoreError::BadReply(e.to_string())
                }
            })?;

        Ok(WindowCount { count, oldest_ms })
    }
}

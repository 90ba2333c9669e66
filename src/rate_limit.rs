use axum::http::{HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use crate::store::{CounterStore, StoreError};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

// Window configuration - fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for WindowSpec {
    // 5 requests from the same client in 10 seconds
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(10),
        }
    }
}

// Outcome of one limiter check. Built once per inbound request and attached
// to every response sent for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: u64, // epoch ms when the oldest counted request expires
}

impl RateLimitDecision {
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset_at));
        headers
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

// What to do when the store cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StoreFailurePolicy {
    #[default]
    FailClosed, // deny, so an outage cannot be used to bypass the limit
    FailOpen,
}

impl StoreFailurePolicy {
    pub fn resolve(&self, spec: &WindowSpec, now_ms: u64) -> RateLimitDecision {
        let reset_at = now_ms + spec.window.as_millis() as u64;
        match self {
            StoreFailurePolicy::FailClosed => RateLimitDecision {
                allowed: false,
                limit: spec.max_requests,
                remaining: 0,
                reset_at,
            },
            StoreFailurePolicy::FailOpen => RateLimitDecision {
                allowed: true,
                limit: spec.max_requests,
                remaining: spec.max_requests,
                reset_at,
            },
        }
    }
}

// Sliding-window limiter. One instance lives for the whole process and is
// shared by every request through AppState.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    spec: WindowSpec,
    prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, spec: WindowSpec, prefix: impl Into<String>) -> Self {
        Self {
            store,
            spec,
            prefix: prefix.into(),
        }
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    // Decides whether one request for `identity` may proceed. An admitted
    // request is recorded in the store; a refused one is not, so hammering
    // while denied does not push the reset further out.
    pub async fn check(&self, identity: &str) -> Result<RateLimitDecision, RateLimitError> {
        self.check_at(identity, now_millis()).await
    }

    pub async fn check_at(
        &self,
        identity: &str,
        now_ms: u64,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let key = self.key_for(identity);
        let window_ms = self.spec.window.as_millis() as u64;

        let limit = u64::from(self.spec.max_requests);
        let observed = self
            .store
            .hit(&key, now_ms, self.spec.window, limit)
            .await?;

        let decision = RateLimitDecision {
            allowed: observed.count <= limit,
            limit: self.spec.max_requests,
            remaining: limit.saturating_sub(observed.count) as u32,
            reset_at: observed.oldest_ms + window_ms,
        };

        tracing::debug!(
            identity,
            count = observed.count,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "rate limit checked"
        );

        Ok(decision)
    }

    // The window length is part of the key so a config change starts fresh logs
    fn key_for(&self, identity: &str) -> String {
        format!(
            "{}:{}:{}",
            self.prefix,
            self.spec.window.as_millis(),
            identity
        )
    }
}

pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), WindowSpec::default(), "test")
    }

    #[tokio::test]
    async fn allows_up_to_the_limit_then_denies() {
        let limiter = limiter();

        for i in 0..5 {
            let decision = limiter.check_at("1.2.3.4", 1_000 + i).await.unwrap();
            assert!(decision.allowed, "request {} should pass", i + 1);
            assert_eq!(decision.limit, 5);
        }

        let sixth = limiter.check_at("1.2.3.4", 1_010).await.unwrap();
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
    }

    #[tokio::test]
    async fn boundary_request_is_the_last_allowed() {
        let limiter = limiter();
        for i in 0..4 {
            limiter.check_at("edge", i).await.unwrap();
        }

        let fifth = limiter.check_at("edge", 4).await.unwrap();
        assert!(fifth.allowed);
        assert_eq!(fifth.remaining, 0);
    }

    #[tokio::test]
    async fn remaining_never_increases_within_a_window() {
        let limiter = limiter();
        let mut previous = u32::MAX;

        for i in 0..8 {
            let decision = limiter.check_at("client", 100 * i).await.unwrap();
            assert!(decision.remaining <= previous);
            previous = decision.remaining;
        }
    }

    #[tokio::test]
    async fn denied_client_recovers_after_the_window() {
        let limiter = limiter();
        for i in 0..6 {
            limiter.check_at("burst", i).await.unwrap();
        }
        assert!(!limiter.check_at("burst", 100).await.unwrap().allowed);

        // every hit of the burst is at least 10s old by now
        let later = limiter.check_at("burst", 10_100).await.unwrap();
        assert!(later.allowed);
        assert_eq!(later.remaining, 4);
    }

    #[tokio::test]
    async fn denied_client_recovers_one_window_after_its_first_call() {
        let limiter = limiter();
        for t in 0..6 {
            limiter.check_at("a", t).await.unwrap();
        }

        let decision = limiter.check_at("a", 10_000).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn steady_client_just_over_the_rate_is_not_locked_out() {
        let limiter = limiter();

        // one request every 1.9s is slightly above 5 per 10s
        let mut admitted = 0;
        for i in 0..100u64 {
            if limiter.check_at("steady", i * 1_900).await.unwrap().allowed {
                admitted += 1;
            }
        }

        assert!(admitted > 80, "only {} of 100 admitted", admitted);
    }

    #[tokio::test]
    async fn reset_is_when_the_oldest_hit_expires() {
        let limiter = limiter();
        limiter.check_at("r", 2_000).await.unwrap();
        let decision = limiter.check_at("r", 7_000).await.unwrap();

        assert_eq!(decision.reset_at, 12_000);
    }

    #[tokio::test]
    async fn identities_have_separate_quotas() {
        let limiter = limiter();
        for i in 0..6 {
            limiter.check_at("noisy", i).await.unwrap();
        }

        let quiet = limiter.check_at("quiet", 10).await.unwrap();
        assert!(quiet.allowed);
        assert_eq!(quiet.remaining, 4);
    }

    #[test]
    fn failure_policies() {
        let spec = WindowSpec::default();

        let closed = StoreFailurePolicy::FailClosed.resolve(&spec, 1_000);
        assert!(!closed.allowed);
        assert_eq!(closed.remaining, 0);
        assert_eq!(closed.reset_at, 11_000);

        let open = StoreFailurePolicy::FailOpen.resolve(&spec, 1_000);
        assert!(open.allowed);
        assert_eq!(open.limit, 5);
    }

    #[test]
    fn decision_headers() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 5,
            remaining: 3,
            reset_at: 1_700_000_000_000,
        };
        let headers = decision.headers();

        assert_eq!(headers[HEADER_LIMIT], "5");
        assert_eq!(headers[HEADER_REMAINING], "3");
        assert_eq!(headers[HEADER_RESET], "1700000000000");
    }
}

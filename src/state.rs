use std::sync::Arc;

use crate::fallback::FallbackPool;
use crate::rate_limit::{RateLimiter, StoreFailurePolicy};
use crate::upstream::ImageUpstream;

// What an admitted request turns into
pub enum Responder {
    Forward(Arc<dyn ImageUpstream>),
    Fallback(FallbackPool),
}

// app's shared state, built once at startup
pub struct AppState {
    pub limiter: RateLimiter,
    pub on_store_failure: StoreFailurePolicy,
    pub responder: Responder,
    pub answer_preflight: bool,
    pub trust_forwarded_for: bool,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(limiter: RateLimiter, responder: Responder) -> Self {
        Self {
            limiter,
            on_store_failure: StoreFailurePolicy::default(),
            responder,
            answer_preflight: false,
            trust_forwarded_for: false,
            max_body_bytes: 64 * 1024,
        }
    }
}

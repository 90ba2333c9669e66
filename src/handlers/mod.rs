mod health;
mod metrics;
mod generate;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use generate::{LOOPBACK_IDENTITY, generate_handler};

use axum::{
    Router,
    routing::{any, get},
};
use std::sync::Arc;

use crate::state::AppState;

// every verb reaches generate_handler so it can answer 405 and preflights itself
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/generate", any(generate_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

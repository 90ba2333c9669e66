pub mod config;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod upstream;

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of generate requests").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("gateway_rate_limited_total", "Requests denied by the local limiter").unwrap();
    pub static ref STORE_ERRORS: Counter =
        register_counter!("gateway_store_errors_total", "Counter store failures").unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("gateway_upstream_failures_total", "Non-success or failed upstream calls").unwrap();
    pub static ref FALLBACK_SERVED: Counter =
        register_counter!("gateway_fallback_served_total", "Fallback images served").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "gateway_request_latency_seconds",
        "Time to first byte of the generate response in seconds"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge =
        register_gauge!("gateway_tracked_clients", "Client keys held by the in-memory store").unwrap();
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::rate_limit::RateLimitDecision;

// Everything that can end a generate request early. Converted to a plain
// text response at the handler boundary, nothing escapes past it.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Rate limit exceeded")]
    RateLimited(RateLimitDecision),

    #[error("Rate limit exceeded. Please try again later.")]
    UpstreamRateLimited(StatusCode, RateLimitDecision),

    #[error("Failed to fetch data from external API.")]
    UpstreamFailure(StatusCode, RateLimitDecision),

    #[error("Failed to fetch data from external API.")]
    UpstreamUnreachable(RateLimitDecision),

    #[error("{1}")]
    MalformedBody(RateLimitDecision, String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamRateLimited(status, _) => *status,
            GatewayError::UpstreamFailure(status, _) => *status,
            GatewayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::MalformedBody(..) => StatusCode::BAD_REQUEST,
        }
    }

    // 405 is decided before the limiter runs, so it has no quota to report
    pub fn decision(&self) -> Option<&RateLimitDecision> {
        match self {
            GatewayError::MethodNotAllowed => None,
            GatewayError::RateLimited(d)
            | GatewayError::UpstreamRateLimited(_, d)
            | GatewayError::UpstreamFailure(_, d)
            | GatewayError::UpstreamUnreachable(d)
            | GatewayError::MalformedBody(d, _) => Some(d),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.to_string();

        match self.decision() {
            Some(decision) => (status, decision.headers(), body).into_response(),
            None => (status, body).into_response(),
        }
    }
}

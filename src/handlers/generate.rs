use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::error::GatewayError;
use crate::metrics::{
    FALLBACK_SERVED, RATE_LIMITED, REQUEST_LATENCY, REQUEST_TOTAL, STORE_ERRORS, UPSTREAM_FAILURES,
};
use crate::models::GenerationRequest;
use crate::rate_limit::{RateLimitDecision, now_millis};
use crate::state::{AppState, Responder};
use crate::upstream::ImageUpstream;

// Identity used when the peer address is unknown. Every such client shares
// one quota.
pub const LOOPBACK_IDENTITY: &str = "127.0.0.1";

pub async fn generate_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let response = match handle(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    response
}

async fn handle(state: &AppState, request: Request) -> Result<Response, GatewayError> {
    let method = request.method();
    if method == Method::OPTIONS && state.answer_preflight {
        return Ok(StatusCode::OK.into_response());
    }
    if method != Method::POST {
        return Err(GatewayError::MethodNotAllowed);
    }

    let identity = client_identity(&request, state.trust_forwarded_for);

    // the only limiter call for this request
    let decision = match state.limiter.check(&identity).await {
        Ok(decision) => decision,
        Err(err) => {
            STORE_ERRORS.inc();
            tracing::warn!(
                identity = %identity,
                error = %err,
                policy = ?state.on_store_failure,
                "rate limit store failed, applying policy"
            );
            state
                .on_store_failure
                .resolve(state.limiter.spec(), now_millis())
        }
    };

    if !decision.allowed {
        RATE_LIMITED.inc();
        tracing::warn!(identity = %identity, reset_at = decision.reset_at, "rate limit exceeded");
        return Err(GatewayError::RateLimited(decision));
    }

    match &state.responder {
        Responder::Forward(upstream) => {
            forward(upstream.as_ref(), request, decision, state.max_body_bytes).await
        }
        Responder::Fallback(pool) => {
            FALLBACK_SERVED.inc();
            Ok((StatusCode::OK, decision.headers(), Json(pool.pick())).into_response())
        }
    }
}

async fn forward(
    upstream: &dyn ImageUpstream,
    request: Request,
    decision: RateLimitDecision,
    max_body_bytes: usize,
) -> Result<Response, GatewayError> {
    let body = axum::body::to_bytes(request.into_body(), max_body_bytes)
        .await
        .map_err(|e| GatewayError::MalformedBody(decision, format!("cannot read body: {}", e)))?;
    let payload = GenerationRequest::from_slice(&body)
        .map_err(|reason| GatewayError::MalformedBody(decision, reason))?;

    let reply = upstream.generate(&payload).await.map_err(|err| {
        UPSTREAM_FAILURES.inc();
        tracing::warn!(error = %err, "upstream unreachable");
        GatewayError::UpstreamUnreachable(decision)
    })?;

    // the upstream has its own quota on top of ours
    if reply.status == StatusCode::TOO_MANY_REQUESTS {
        UPSTREAM_FAILURES.inc();
        tracing::warn!("upstream rate limited the gateway");
        return Err(GatewayError::UpstreamRateLimited(reply.status, decision));
    }

    if !reply.status.is_success() {
        UPSTREAM_FAILURES.inc();
        tracing::warn!(status = %reply.status, "upstream returned an error");
        return Err(GatewayError::UpstreamFailure(reply.status, decision));
    }

    let mut response = Response::new(reply.body);
    response.headers_mut().extend(decision.headers());
    if let Some(content_type) = reply.content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}

// Peer address of the connection, or the first X-Forwarded-For hop when the
// gateway sits behind a proxy it trusts
fn client_identity(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| LOOPBACK_IDENTITY.to_string())
}

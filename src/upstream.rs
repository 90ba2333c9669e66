use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use std::time::Duration;

use crate::models::{GenerationRequest, TextToImageBody};

pub const DEFAULT_UPSTREAM_URL: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image";

// What came back from the generation API. The body is still streaming.
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Body,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ImageUpstream: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<UpstreamReply, UpstreamError>;
}

// Text-to-image HTTP client
pub struct StabilityClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl StabilityClient {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl ImageUpstream for StabilityClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<UpstreamReply, UpstreamError> {
        let res = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(&self.api_key)
            .json(&TextToImageBody::from(request))
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = res.status();
        let content_type = res.headers().get(reqwest::header::CONTENT_TYPE).cloned();

        // Not buffered: dropping the response body drops this stream and
        // closes the upstream connection with it
        Ok(UpstreamReply {
            status,
            content_type,
            body: Body::from_stream(res.bytes_stream()),
        })
    }
}

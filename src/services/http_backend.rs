use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::backend::{upstream_error_message, GenerationBackend};
use crate::{
    core::state::GenerationPath,
    error::{GenerationError, Result},
    types::request::TripRequest,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// reqwest-backed client for the trip generation endpoints
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_request_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Upper bound for a single HTTP exchange. The orchestrator applies its own,
    /// shorter primary budget on top of this.
    pub fn with_request_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tripgen-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| GenerationError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: GenerationPath, body: &Value) -> Result<Value> {
        let request_url = build_url(&self.base_url, path.endpoint());
        debug!(target: "tripgen::http", url = %request_url, "sending generation request");

        let response = self
            .client
            .post(&request_url)
            .json(body)
            .send()
            .await
            .map_err(|err| map_transport_error(&request_url, err))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|err| map_transport_error(&request_url, err))?;

        debug!(
            target: "tripgen::http",
            url = %request_url,
            status = status.as_u16(),
            bytes = response_text.len(),
            "received generation response"
        );

        let parsed = serde_json::from_str::<Value>(&response_text);

        if !status.is_success() {
            let message = parsed
                .ok()
                .as_ref()
                .and_then(upstream_error_message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(GenerationError::upstream(Some(status.as_u16()), message));
        }

        if response_text.trim().is_empty() {
            return Err(GenerationError::upstream(
                Some(status.as_u16()),
                "服务器没有返回任何数据",
            ));
        }

        Ok(parsed.unwrap_or(Value::String(response_text)))
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate_trip(&self, request: &TripRequest) -> Result<Value> {
        self.post(GenerationPath::Primary, &request.primary_body())
            .await
    }

    async fn generate_itinerary(&self, request: &TripRequest) -> Result<Value> {
        self.post(GenerationPath::Fallback, &request.fallback_body())
            .await
    }
}

fn map_transport_error(url: &str, err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(format!("request to {url} timed out"))
    } else {
        GenerationError::NetworkFailure(format!("request to {url} failed: {err}"))
    }
}

fn build_url(base_url: &str, endpoint: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/api") {
        format!("{}{}", trimmed, endpoint.trim_start_matches("/api"))
    } else {
        format!("{}{}", trimmed, endpoint)
    }
}

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::Result, types::request::TripRequest};

/// The two generation calls the orchestrator can issue.
///
/// Implementations return the parsed response body. A body that cannot be parsed as
/// JSON is returned as a `Value::String` so the normalizer can still try to decode it.
#[async_trait]
pub trait GenerationBackend: Send + Sync + std::fmt::Debug {
    /// Primary, AI-backed generation (`POST /api/generate_trip`)
    async fn generate_trip(&self, request: &TripRequest) -> Result<Value>;

    /// Secondary, faster generation (`POST /api/generate_itinerary`)
    async fn generate_itinerary(&self, request: &TripRequest) -> Result<Value>;
}

/// Error message carried in a response body's `error` field, if any.
///
/// Accepts `{"error": "..."}` and `{"error": {"message": "..."}}`.
pub fn upstream_error_message(body: &Value) -> Option<String> {
    let error = body.get("error").filter(|error| !error.is_null())?;

    let message = match error {
        Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    Some(message)
}

use std::fmt;

use thiserror::Error;

/// Longest raw fragment kept on a normalization failure.
const MAX_FRAGMENT_CHARS: usize = 512;

/// Why an upstream payload could not be turned into an itinerary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationReason {
    /// Payload matches none of the known response shapes, or unwrapping went too deep
    UnrecognizedShape,
    /// Text embedded in a chat-style envelope is not valid JSON
    MalformedEmbeddedJson(String),
    /// A string-encoded body could not be decoded
    InvalidStringPayload(String),
    /// A structured payload has a field of the wrong type
    InvalidField { path: String, message: String },
    /// Two days share the same day number
    DuplicateDay(u32),
    /// A day number of zero
    InvalidDayNumber,
    /// Structured payload with no days
    EmptyItinerary,
}

impl fmt::Display for NormalizationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationReason::UnrecognizedShape => write!(f, "unrecognized response shape"),
            NormalizationReason::MalformedEmbeddedJson(err) => {
                write!(f, "malformed embedded JSON: {err}")
            }
            NormalizationReason::InvalidStringPayload(err) => {
                write!(f, "invalid string payload: {err}")
            }
            NormalizationReason::InvalidField { path, message } => {
                write!(f, "invalid field at {path}: {message}")
            }
            NormalizationReason::DuplicateDay(day) => write!(f, "duplicate day number {day}"),
            NormalizationReason::InvalidDayNumber => write!(f, "day numbers must start at 1"),
            NormalizationReason::EmptyItinerary => write!(f, "itinerary contains no days"),
        }
    }
}

/// Normalization failure carrying the offending raw fragment for diagnostics
#[derive(Error, Debug, Clone, PartialEq)]
#[error("normalization failed: {reason}")]
pub struct NormalizationFailure {
    pub reason: NormalizationReason,
    pub fragment: String,
}

impl NormalizationFailure {
    pub fn new(reason: NormalizationReason, fragment: impl AsRef<str>) -> Self {
        let fragment = fragment.as_ref();
        let fragment = match fragment.char_indices().nth(MAX_FRAGMENT_CHARS) {
            Some((cut, _)) => format!("{}…", &fragment[..cut]),
            None => fragment.to_string(),
        };
        Self { reason, fragment }
    }

    pub fn unrecognized(fragment: impl AsRef<str>) -> Self {
        Self::new(NormalizationReason::UnrecognizedShape, fragment)
    }
}

/// Main error type for trip generation
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid trip request: {0}")]
    InvalidRequest(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Upstream error: {message}")]
    UpstreamError { status: Option<u16>, message: String },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error(transparent)]
    Normalization(#[from] NormalizationFailure),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Generation attempt was superseded by a newer submission")]
    Superseded,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GenerationError>;

impl GenerationError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        GenerationError::UpstreamError {
            status,
            message: message.into(),
        }
    }

    /// Only a primary timeout is recovered locally (through the fallback path)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GenerationError::Timeout(_))
    }

    /// Get the error code for structured responses
    pub fn error_code(&self) -> &'static str {
        match self {
            GenerationError::Config(_) => "CONFIG_ERROR",
            GenerationError::InvalidRequest(_) => "INVALID_REQUEST",
            GenerationError::NetworkFailure(_) => "NETWORK_FAILURE",
            GenerationError::UpstreamError { .. } => "UPSTREAM_ERROR",
            GenerationError::Timeout(_) => "TIMEOUT_ERROR",
            GenerationError::Normalization(_) => "NORMALIZATION_FAILURE",
            GenerationError::Serialization(_) => "SERIALIZATION_ERROR",
            GenerationError::Storage(_) => "STORAGE_ERROR",
            GenerationError::Superseded => "SUPERSEDED",
        }
    }

    /// Single message suitable for showing to the person who submitted the trip
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::UpstreamError { message, .. } => message.clone(),
            GenerationError::Normalization(_) => "响应格式异常，请稍后重试".to_string(),
            GenerationError::Timeout(_) => "生成行程超时，请重试".to_string(),
            other => other.to_string(),
        }
    }

    /// Convert to a structured error payload
    pub fn to_error_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.user_message(),
                "recoverable": self.is_recoverable()
            }
        })
    }
}

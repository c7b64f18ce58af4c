//! Upstream calls and payload normalization

pub mod backend;
pub mod http_backend;
pub mod normalizer;

pub use backend::{upstream_error_message, GenerationBackend};
pub use http_backend::HttpBackend;
pub use normalizer::{normalize, normalize_text};

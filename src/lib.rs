//! tripgen-rs: trip generation orchestration and itinerary normalization
//!
//! Submits trip preferences to an AI-backed generation service with a bounded wait,
//! falls back once to a faster generation endpoint on timeout, normalizes whatever
//! response shape comes back into one canonical [`Itinerary`], and hands it to a
//! session-backed [`TripStore`] for downstream views and exporters.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tripgen_rs::{HttpBackend, Orchestrator, TripRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(HttpBackend::new("http://localhost:5001")?);
//!
//!     let request = TripRequest::new("Beijing", 2).with_preferences(["美食"]);
//!     let outcome = orchestrator.submit(&request).await?;
//!     println!("{} days in {}", outcome.itinerary.days.len(), outcome.itinerary.city);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod types;

pub use config::{EnvConfig, OrchestratorConfig};
pub use core::{
    FileSessionStorage, GenerationOutcome, GenerationPath, GenerationState, MemorySessionStorage,
    Orchestrator, ProgressConfig, ProgressReporter, ProgressSnapshot, SessionStorage, TripStore,
    LATEST_TRIP_KEY,
};
pub use error::{GenerationError, NormalizationFailure, NormalizationReason, Result};
pub use services::{normalize, normalize_text, GenerationBackend, HttpBackend};
pub use types::{Activity, DayPlan, Itinerary, RawGenerationResponse, TripRequest};

#[cfg(feature = "cli")]
pub mod cli;

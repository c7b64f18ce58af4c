use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::itinerary::Itinerary;

/// States of one generation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Idle,
    Requesting,
    TimedOut,
    FallbackRequesting,
    Succeeded,
    Failed,
}

impl GenerationState {
    /// True while a request is outstanding or a fallback is pending
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            GenerationState::Requesting
                | GenerationState::TimedOut
                | GenerationState::FallbackRequesting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationState::Succeeded | GenerationState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Any state may be forced back to `Idle` by a new submission.
    pub fn can_transition_to(&self, next: GenerationState) -> bool {
        use GenerationState::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle, Requesting) => true,
            (Requesting, Succeeded | TimedOut | Failed) => true,
            (TimedOut, FallbackRequesting) => true,
            (FallbackRequesting, Succeeded | Failed) => true,
            // normalization failure after a resolved request
            (Succeeded, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GenerationState::Idle => "idle",
            GenerationState::Requesting => "requesting",
            GenerationState::TimedOut => "timed_out",
            GenerationState::FallbackRequesting => "fallback_requesting",
            GenerationState::Succeeded => "succeeded",
            GenerationState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Which generation call produced the itinerary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPath {
    /// `POST /api/generate_trip`
    Primary,
    /// `POST /api/generate_itinerary`, used once after a primary timeout
    Fallback,
}

impl GenerationPath {
    pub fn endpoint(&self) -> &'static str {
        match self {
            GenerationPath::Primary => "/api/generate_trip",
            GenerationPath::Fallback => "/api/generate_itinerary",
        }
    }
}

/// Result of a successful generation attempt
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// The itinerary as written to the trip store
    pub itinerary: Arc<Itinerary>,
    pub path: GenerationPath,
    /// Wall time from submission to store write
    pub elapsed: Duration,
}

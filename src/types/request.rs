use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{GenerationError, Result};

pub const DEFAULT_PACE: &str = "中庸";
pub const DEFAULT_TRANSPORT: &str = "driving";
pub const DEFAULT_PRIORITY: &str = "效率优先";
pub const MAX_TRIP_DAYS: u32 = 30;

/// Trip preferences collected from the submitter.
///
/// Also serves as the request context during normalization: any canonical field the
/// upstream payload omits is filled from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRequest {
    /// Destination city
    pub city: String,
    /// Number of days, 1 to 30
    pub days: u32,
    /// Interest tags such as "美食" or "文化"
    #[serde(default)]
    pub preferences: Vec<String>,
    /// Travel pace ("佛系", "中庸", "硬核")
    #[serde(default = "default_pace")]
    pub pace: String,
    /// Transport mode ("driving", "walking", "transit", "bicycling")
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Planning priority ("价格优先", "效率优先", ...)
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_pace() -> String {
    DEFAULT_PACE.to_string()
}

fn default_transport() -> String {
    DEFAULT_TRANSPORT.to_string()
}

fn default_priority() -> String {
    DEFAULT_PRIORITY.to_string()
}

impl TripRequest {
    pub fn new(city: impl Into<String>, days: u32) -> Self {
        Self {
            city: city.into(),
            days,
            preferences: Vec::new(),
            pace: default_pace(),
            transport: default_transport(),
            priority: default_priority(),
        }
    }

    pub fn with_preferences<I, S>(mut self, preferences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferences = preferences.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pace(mut self, pace: impl Into<String>) -> Self {
        self.pace = pace.into();
        self
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Check bounds and return a cleaned copy: trimmed city, deduplicated non-empty
    /// preferences in first-seen order.
    pub fn validated(&self) -> Result<Self> {
        let city = self.city.trim();
        if city.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "city must not be empty".to_string(),
            ));
        }
        if self.days == 0 || self.days > MAX_TRIP_DAYS {
            return Err(GenerationError::InvalidRequest(format!(
                "days must be between 1 and {MAX_TRIP_DAYS}, got {}",
                self.days
            )));
        }

        let mut preferences: Vec<String> = Vec::with_capacity(self.preferences.len());
        for pref in &self.preferences {
            let pref = pref.trim();
            if !pref.is_empty() && !preferences.iter().any(|p| p == pref) {
                preferences.push(pref.to_string());
            }
        }

        Ok(Self {
            city: city.to_string(),
            days: self.days,
            preferences,
            pace: self.pace.clone(),
            transport: self.transport.clone(),
            priority: self.priority.clone(),
        })
    }

    /// Body for `POST /api/generate_trip`
    pub fn primary_body(&self) -> Value {
        json!({
            "city": self.city,
            "days": self.days,
            "preferences": self.preferences,
            "pace": self.pace,
            "transport": self.transport,
            "priority": self.priority,
        })
    }

    /// Body for `POST /api/generate_itinerary`; the fallback endpoint names the
    /// transport field `transport_mode`.
    pub fn fallback_body(&self) -> Value {
        json!({
            "city": self.city,
            "days": self.days,
            "preferences": self.preferences,
            "pace": self.pace,
            "transport_mode": self.transport,
            "priority": self.priority,
        })
    }
}

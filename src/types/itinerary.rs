use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Canonical trip plan produced by normalization and consumed by every
/// display/export collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    /// Destination city
    pub city: String,
    /// Number of days the trip was planned for (at least 1)
    pub day_count: u32,
    /// Travel pace, free-form
    pub pace: String,
    /// Transport mode, free-form
    pub transport_mode: String,
    /// Planning priority, free-form
    pub priority: String,
    /// Interest tags
    pub preferences: BTreeSet<String>,
    /// One-paragraph overview of the trip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Day plans ordered by ascending day number
    pub days: Vec<DayPlan>,
    /// Practical travel tips
    #[serde(default)]
    pub tips: Vec<String>,
}

/// Activities planned for a single day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    /// 1-based day counter, unique within the itinerary
    pub day_number: u32,
    /// Theme or summary for the day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Activities in presentation order
    pub activities: Vec<Activity>,
}

/// A single stop within a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Identifier, unique within its day
    pub id: String,
    pub name: String,
    /// Category tag (culture, food, nature, ...)
    #[serde(rename = "type")]
    pub activity_type: String,
    /// "HH:MM"
    pub start_time: String,
    /// "HH:MM"
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rating in [0, 5]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Price bracket such as "$$" or "免费"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_estimate: Option<f64>,
    /// 1-based position within the day
    pub order: u32,
}

impl Itinerary {
    /// Look up a day by its day number
    pub fn day(&self, day_number: u32) -> Option<&DayPlan> {
        self.days.iter().find(|day| day.day_number == day_number)
    }

    /// Total number of activities across all days
    pub fn activity_count(&self) -> usize {
        self.days.iter().map(|day| day.activities.len()).sum()
    }

    /// Sum of all known per-activity price estimates
    pub fn estimated_total(&self) -> f64 {
        self.days
            .iter()
            .flat_map(|day| day.activities.iter())
            .filter_map(|activity| activity.price_estimate)
            .sum()
    }
}

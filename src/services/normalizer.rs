use std::collections::{BTreeSet, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::{
    error::{NormalizationFailure, NormalizationReason},
    types::{
        itinerary::{Activity, DayPlan, Itinerary},
        raw::{
            non_empty, strip_code_fence, RawActivity, RawDay, RawGenerationResponse, RawId,
            RawItinerary, RawTags,
        },
        request::TripRequest,
    },
};

/// Maximum number of text unwraps (envelope or string decode) per payload
pub const MAX_UNWRAP_DEPTH: usize = 2;

pub const DEFAULT_ACTIVITY_NAME: &str = "未命名活动";
pub const DEFAULT_ACTIVITY_TYPE: &str = "体验";
pub const DEFAULT_RATING: f64 = 4.5;
pub const DEFAULT_START_TIME: &str = "09:00";
/// Span used to derive a missing end time when no duration is known
pub const DEFAULT_SPAN_MINUTES: u32 = 120;

const MAX_RATING: f64 = 5.0;
const LAST_MINUTE_OF_DAY: u32 = 23 * 60 + 59;

/// Convert an upstream payload into the canonical itinerary.
///
/// `context` supplies any trip-level field the payload leaves out; values present in
/// the payload win. The result depends only on the inputs, so normalizing the same
/// payload twice yields identical output.
pub fn normalize(raw: &Value, context: &TripRequest) -> Result<Itinerary, NormalizationFailure> {
    normalize_at(raw, context, 0)
}

/// Normalize a raw response body given as text.
///
/// Text that is not JSON at all is treated as the contents of a string-encoded body,
/// which covers bare fenced model output saved to a file.
pub fn normalize_text(
    text: &str,
    context: &TripRequest,
) -> Result<Itinerary, NormalizationFailure> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => normalize(&value, context),
        Err(_) => normalize(&Value::String(text.to_string()), context),
    }
}

fn normalize_at(
    raw: &Value,
    context: &TripRequest,
    depth: usize,
) -> Result<Itinerary, NormalizationFailure> {
    let shape = RawGenerationResponse::classify(raw)
        .ok_or_else(|| NormalizationFailure::unrecognized(raw.to_string()))?;

    debug!(
        target: "tripgen::normalizer",
        shape = shape.kind(),
        depth,
        "classified upstream payload"
    );

    match shape {
        RawGenerationResponse::Structured(value) => map_structured(&value, context),
        RawGenerationResponse::WrappedChatCompletion(text) => {
            let inner = unwrap_text(&text, depth, NormalizationReason::MalformedEmbeddedJson)?;
            normalize_at(&inner, context, depth + 1)
        }
        RawGenerationResponse::StringEncoded(text) => {
            let inner = unwrap_text(&text, depth, NormalizationReason::InvalidStringPayload)?;
            normalize_at(&inner, context, depth + 1)
        }
    }
}

fn unwrap_text(
    text: &str,
    depth: usize,
    on_error: fn(String) -> NormalizationReason,
) -> Result<Value, NormalizationFailure> {
    if depth >= MAX_UNWRAP_DEPTH {
        return Err(NormalizationFailure::unrecognized(text));
    }

    serde_json::from_str(strip_code_fence(text))
        .map_err(|err| NormalizationFailure::new(on_error(err.to_string()), text))
}

fn map_structured(value: &Value, context: &TripRequest) -> Result<Itinerary, NormalizationFailure> {
    let raw: RawItinerary = serde_path_to_error::deserialize(value).map_err(|err| {
        let path = err.path().to_string();
        let location = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        NormalizationFailure::new(
            NormalizationReason::InvalidField {
                path: location,
                message: err.inner().to_string(),
            },
            value.to_string(),
        )
    })?;

    if raw.days.is_empty() {
        return Err(NormalizationFailure::new(
            NormalizationReason::EmptyItinerary,
            value.to_string(),
        ));
    }

    let city = non_empty(raw.city.as_deref()).unwrap_or(context.city.as_str()).to_string();
    let day_count = raw
        .day_count()
        .filter(|count| *count >= 1)
        .unwrap_or(context.days)
        .max(1);
    let pace = non_empty(raw.pace.as_deref()).unwrap_or(context.pace.as_str()).to_string();
    let transport_mode = raw
        .transport_mode()
        .unwrap_or(context.transport.as_str())
        .to_string();
    let priority = non_empty(raw.priority.as_deref())
        .unwrap_or(context.priority.as_str())
        .to_string();
    let preferences = clean_set(
        raw.preferences
            .as_deref()
            .unwrap_or(context.preferences.as_slice()),
    );
    let summary = non_empty(raw.summary.as_deref()).map(str::to_string);
    let tips = raw.tips.map(clean_list).unwrap_or_default();

    let days = map_days(raw.days, value)?;

    Ok(Itinerary {
        city,
        day_count,
        pace,
        transport_mode,
        priority,
        preferences,
        summary,
        days,
        tips,
    })
}

/// Days without a number take the smallest number no other day claims, in input order.
fn map_days(raw_days: Vec<RawDay>, value: &Value) -> Result<Vec<DayPlan>, NormalizationFailure> {
    if raw_days.iter().any(|day| day.day_number == Some(0)) {
        return Err(NormalizationFailure::new(
            NormalizationReason::InvalidDayNumber,
            value.to_string(),
        ));
    }

    let mut claimed: BTreeSet<u32> = raw_days.iter().filter_map(|day| day.day_number).collect();
    let mut next_free = 1;
    let mut numbered = Vec::with_capacity(raw_days.len());
    for day in raw_days {
        let day_number = match day.day_number {
            Some(day_number) => day_number,
            None => {
                while claimed.contains(&next_free) {
                    next_free += 1;
                }
                claimed.insert(next_free);
                next_free
            }
        };
        numbered.push((day_number, day));
    }

    numbered.sort_by_key(|(day_number, _)| *day_number);

    if let Some(pair) = numbered.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(NormalizationFailure::new(
            NormalizationReason::DuplicateDay(pair[0].0),
            value.to_string(),
        ));
    }

    Ok(numbered
        .into_iter()
        .enumerate()
        .map(|(day_index, (day_number, day))| DayPlan {
            day_number,
            description: non_empty(day.description.as_deref()).map(str::to_string),
            activities: map_activities(day_index, day.activities),
        })
        .collect())
}

/// Explicit `order` values take precedence; activities without one keep their
/// input position. Ties keep input order.
fn map_activities(day_index: usize, raw_activities: Vec<RawActivity>) -> Vec<Activity> {
    let mut ranked: Vec<(u32, RawActivity)> = raw_activities
        .into_iter()
        .enumerate()
        .map(|(index, activity)| {
            let rank = activity
                .order
                .filter(|order| *order >= 1)
                .unwrap_or(index as u32 + 1);
            (rank, activity)
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);

    let mut used_ids = HashSet::new();
    ranked
        .into_iter()
        .enumerate()
        .map(|(activity_index, (_, mut raw))| {
            let id = assign_id(raw.id.take(), day_index, activity_index, &mut used_ids);
            map_activity(raw, id, activity_index as u32 + 1)
        })
        .collect()
}

fn map_activity(raw: RawActivity, id: String, order: u32) -> Activity {
    let start = raw
        .start_time
        .as_deref()
        .and_then(parse_clock)
        .or_else(|| parse_clock(DEFAULT_START_TIME))
        .unwrap_or(0);
    let end = raw
        .end_time
        .as_deref()
        .and_then(parse_clock)
        .unwrap_or_else(|| {
            let span = raw.duration_minutes.unwrap_or(DEFAULT_SPAN_MINUTES);
            start.saturating_add(span).min(LAST_MINUTE_OF_DAY)
        });

    Activity {
        id,
        name: non_empty(raw.name.as_deref())
            .unwrap_or(DEFAULT_ACTIVITY_NAME)
            .to_string(),
        activity_type: non_empty(raw.activity_type.as_deref())
            .unwrap_or(DEFAULT_ACTIVITY_TYPE)
            .to_string(),
        start_time: format_clock(start),
        end_time: format_clock(end),
        duration_minutes: raw.duration_minutes,
        address: non_empty(raw.address.as_deref()).map(str::to_string),
        description: non_empty(raw.description.as_deref()).map(str::to_string),
        rating: Some(
            raw.rating
                .filter(|rating| rating.is_finite())
                .map(|rating| rating.clamp(0.0, MAX_RATING))
                .unwrap_or(DEFAULT_RATING),
        ),
        tags: raw.tags.map(RawTags::into_vec).unwrap_or_default(),
        price_range: non_empty(raw.price_range.as_deref()).map(str::to_string),
        price_estimate: raw
            .price_estimate
            .filter(|price| price.is_finite() && *price >= 0.0),
        order,
    }
}

fn assign_id(
    raw: Option<RawId>,
    day_index: usize,
    activity_index: usize,
    used: &mut HashSet<String>,
) -> String {
    let explicit = raw
        .map(RawId::into_string)
        .filter(|id| !id.is_empty() && !used.contains(id));

    let id = explicit.unwrap_or_else(|| {
        let base = format!("{}-{}", day_index + 1, activity_index + 1);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while used.contains(&candidate) {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
        candidate
    });

    used.insert(id.clone());
    id
}

/// Minutes since midnight for "H:MM", "HH:MM" or "HH:MM:SS"
fn parse_clock(text: &str) -> Option<u32> {
    let mut parts = text.trim().split(':');
    let hours: u32 = parts.next()?.trim().parse().ok()?;
    let minutes: u32 = parts.next()?.trim().parse().ok()?;
    if let Some(seconds) = parts.next() {
        let seconds: u32 = seconds.trim().parse().ok()?;
        if seconds > 59 {
            return None;
        }
    }
    if parts.next().is_some() || hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

fn format_clock(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn clean_set(items: &[String]) -> BTreeSet<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

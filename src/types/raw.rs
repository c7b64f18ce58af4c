//! Untrusted upstream response shapes.
//!
//! The backends return one of three shapes: a structured plan with a `days` array,
//! a chat-completion style envelope whose text embeds the plan as JSON (often inside
//! a markdown code fence), or the whole body encoded as a JSON string.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

const FENCE: &str = "```";

/// JSON pointers probed, in order, for the text payload of a chat-style envelope
const CHAT_TEXT_POINTERS: &[&str] = &[
    "/choices/0/message/content",
    "/choices/0/text",
    "/output/text",
    "/output/choices/0/message/content",
    "/answer",
    "/data/outputs/text",
];

/// Closed set of upstream response shapes
#[derive(Debug, Clone, PartialEq)]
pub enum RawGenerationResponse {
    /// Object carrying a `days` array
    Structured(Value),
    /// Provider envelope; holds the embedded text payload
    WrappedChatCompletion(String),
    /// Whole body is a JSON string; holds the string contents
    StringEncoded(String),
}

impl RawGenerationResponse {
    /// Classify a payload. Returns `None` when it matches no known shape.
    pub fn classify(raw: &Value) -> Option<Self> {
        if raw.get("days").map(Value::is_array).unwrap_or(false) {
            return Some(Self::Structured(raw.clone()));
        }

        if raw.is_object() {
            if let Some(text) = extract_chat_text(raw) {
                return Some(Self::WrappedChatCompletion(text.to_string()));
            }
        }

        raw.as_str()
            .map(|text| Self::StringEncoded(text.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::WrappedChatCompletion(_) => "wrapped_chat_completion",
            Self::StringEncoded(_) => "string_encoded",
        }
    }
}

/// Text payload of a chat-style envelope, if any known path carries a string
pub fn extract_chat_text(raw: &Value) -> Option<&str> {
    CHAT_TEXT_POINTERS
        .iter()
        .find_map(|pointer| raw.pointer(pointer).and_then(Value::as_str))
}

/// Strip an optional markdown code fence around embedded JSON.
///
/// Content is taken from after the first fence (minus its language tag) up to the
/// last fence that ends a line. JSON strings cannot hold raw newlines, so fences
/// nested inside string values never qualify as the closing fence.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed.strip_suffix(FENCE).unwrap_or(trimmed).trim();
    }

    let Some(start) = trimmed.find(FENCE) else {
        return trimmed;
    };

    let after = &trimmed[start + FENCE.len()..];
    let tag_end = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(after.len());
    let body = &after[tag_end..];

    match closing_fence(body) {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn closing_fence(body: &str) -> Option<usize> {
    body.rmatch_indices(FENCE).map(|(index, _)| index).find(|index| {
        let rest = &body[index + FENCE.len()..];
        rest.split('\n').next().unwrap_or_default().trim().is_empty()
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawItinerary {
    pub city: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    pub day_count: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    pub total_days: Option<u32>,
    #[serde(rename = "dayCount", deserialize_with = "lenient_u32")]
    pub day_count_camel: Option<u32>,
    pub pace: Option<String>,
    pub transport_mode: Option<String>,
    pub transport: Option<String>,
    #[serde(rename = "transportMode")]
    pub transport_mode_camel: Option<String>,
    pub priority: Option<String>,
    #[serde(deserialize_with = "sparse_strings")]
    pub preferences: Option<Vec<String>>,
    pub summary: Option<String>,
    pub days: Vec<RawDay>,
    #[serde(deserialize_with = "sparse_strings")]
    pub tips: Option<Vec<String>>,
}

impl RawItinerary {
    pub fn day_count(&self) -> Option<u32> {
        self.day_count.or(self.total_days).or(self.day_count_camel)
    }

    pub fn transport_mode(&self) -> Option<&str> {
        [
            &self.transport_mode,
            &self.transport,
            &self.transport_mode_camel,
        ]
        .into_iter()
        .find_map(|value| non_empty(value.as_deref()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawDay {
    #[serde(alias = "day", alias = "dayNumber", deserialize_with = "lenient_u32")]
    pub day_number: Option<u32>,
    pub description: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub activities: Vec<RawActivity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawActivity {
    pub id: Option<RawId>,
    pub name: Option<String>,
    #[serde(rename = "type", alias = "category")]
    pub activity_type: Option<String>,
    #[serde(alias = "startTime")]
    pub start_time: Option<String>,
    #[serde(alias = "endTime")]
    pub end_time: Option<String>,
    #[serde(alias = "durationMinutes", deserialize_with = "lenient_u32")]
    pub duration_minutes: Option<u32>,
    pub address: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub rating: Option<f64>,
    pub tags: Option<RawTags>,
    #[serde(alias = "priceRange")]
    pub price_range: Option<String>,
    #[serde(alias = "priceEstimate", deserialize_with = "lenient_f64")]
    pub price_estimate: Option<f64>,
    #[serde(deserialize_with = "lenient_u32")]
    pub order: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    pub fn into_string(self) -> String {
        match self {
            RawId::Text(text) => text.trim().to_string(),
            RawId::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawTags {
    List(Vec<Option<String>>),
    Joined(String),
}

impl RawTags {
    pub fn into_vec(self) -> Vec<String> {
        let items: Vec<String> = match self {
            RawTags::List(items) => items.into_iter().flatten().collect(),
            RawTags::Joined(text) => text
                .split([',', '，', '、'])
                .map(str::to_string)
                .collect(),
        };
        items
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Number(serde_json::Number),
    Text(String),
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberLike>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(NumberLike::Number(number)) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrepresentable number {number}"))),
        Some(NumberLike::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("expected a number, got `{text}`")))
        }
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match lenient_number(deserializer)? {
        None => Ok(None),
        Some(value) if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 => {
            Ok(Some(value as u32))
        }
        Some(value) => Err(serde::de::Error::custom(format!(
            "expected a non-negative integer, got {value}"
        ))),
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_number(deserializer)
}

/// `null` deserializes to the field's default instead of failing
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// String list whose `null` entries are dropped
fn sparse_strings<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(items.map(|items| items.into_iter().flatten().collect()))
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_structured_before_envelope() {
        let raw = json!({"days": [], "choices": [{"message": {"content": "{}"}}]});
        assert!(matches!(
            RawGenerationResponse::classify(&raw),
            Some(RawGenerationResponse::Structured(_))
        ));
    }

    #[test]
    fn test_classify_known_envelopes() {
        let openai = json!({"choices": [{"message": {"content": "{\"days\": []}"}}]});
        let dashscope = json!({"output": {"text": "{\"days\": []}"}, "request_id": "abc"});
        let dify = json!({"data": {"outputs": {"text": "{}"}}});

        for raw in [openai, dashscope, dify] {
            assert_eq!(
                RawGenerationResponse::classify(&raw).map(|r| r.kind()),
                Some("wrapped_chat_completion")
            );
        }
    }

    #[test]
    fn test_classify_string_and_unknown() {
        assert_eq!(
            RawGenerationResponse::classify(&json!("{\"days\": []}")).map(|r| r.kind()),
            Some("string_encoded")
        );
        assert!(RawGenerationResponse::classify(&json!({"days": "soon"})).is_none());
        assert!(RawGenerationResponse::classify(&json!(42)).is_none());
        assert!(RawGenerationResponse::classify(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(
            strip_code_fence("Here is your plan:\n```json\n{\"a\": 1}\n```\nEnjoy!"),
            "{\"a\": 1}"
        );
        assert_eq!(strip_code_fence("```json{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_keeps_nested_fences() {
        let text = "```json\n{\"content\": \"```json\\n{}\\n```\"}\n```";
        assert_eq!(
            strip_code_fence(text),
            "{\"content\": \"```json\\n{}\\n```\"}"
        );
    }

    #[test]
    fn test_raw_activity_is_lenient() {
        let activity: RawActivity = serde_json::from_value(json!({
            "id": 7,
            "startTime": "9:00",
            "duration_minutes": "90",
            "rating": "4.2",
            "tags": "历史，必游, 地标",
            "category": "文化"
        }))
        .unwrap();

        assert_eq!(activity.id.unwrap().into_string(), "7");
        assert_eq!(activity.start_time.as_deref(), Some("9:00"));
        assert_eq!(activity.duration_minutes, Some(90));
        assert_eq!(activity.rating, Some(4.2));
        assert_eq!(activity.tags.unwrap().into_vec(), vec!["历史", "必游", "地标"]);
        assert_eq!(activity.activity_type.as_deref(), Some("文化"));
    }

    #[test]
    fn test_unclosed_fence_keeps_nested_fences() {
        let text = "```json\n{\"content\": \"```json\\n{}\\n```\"}";
        assert_eq!(strip_code_fence(text), "{\"content\": \"```json\\n{}\\n```\"}");
    }

    #[test]
    fn test_null_lists_are_tolerated() {
        let day: RawDay = serde_json::from_value(json!({"day": 1, "activities": null})).unwrap();
        assert!(day.activities.is_empty());

        let raw: RawItinerary =
            serde_json::from_value(json!({"tips": ["早起", null], "preferences": null}))
                .unwrap();
        assert_eq!(raw.tips, Some(vec!["早起".to_string()]));
        assert_eq!(raw.preferences, None);
    }

    #[test]
    fn test_raw_itinerary_transport_aliases() {
        let raw: RawItinerary =
            serde_json::from_value(json!({"transport": "walking", "transport_mode": " "}))
                .unwrap();
        assert_eq!(raw.transport_mode(), Some("walking"));
    }
}

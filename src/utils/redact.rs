use serde_json::Value as JsonValue;

const REDACTED: &str = "[REDACTED]";

/// Mask personal context before an oracle payload is logged.
///
/// Mood, environment, weather, free-text hints and every title-like field
/// are replaced; time ranges, zone names and counts pass through so the log
/// still shows what the oracle was asked to work around.
pub fn redact_sensitive_data(data: &JsonValue) -> JsonValue {
    match data {
        JsonValue::Object(map) => {
            let mut redacted_map = serde_json::Map::new();
            for (key, val) in map {
                let redacted_val = if is_sensitive_field(key) {
                    redact_leaf(val)
                } else {
                    redact_sensitive_data(val)
                };
                redacted_map.insert(key.clone(), redacted_val);
            }
            JsonValue::Object(redacted_map)
        }
        JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(redact_sensitive_data).collect()),
        _ => data.clone(),
    }
}

fn is_sensitive_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    matches!(
        lower.as_str(),
        "mood"
            | "environment"
            | "weather"
            | "title"
            | "task"
            | "tags"
            | "avoidtitles"
            | "retryhint"
            | "content"
    )
}

fn redact_leaf(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) if !s.is_empty() => JsonValue::String(REDACTED.to_string()),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(redact_leaf).collect()),
        _ => value.clone(),
    }
}

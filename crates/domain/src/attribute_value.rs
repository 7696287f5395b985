//! Values exposed for each machine, one per sensor key.

use serde::{Deserialize, Serialize};

/// A decoded sensor value as published in a bundle snapshot.
///
/// Serialised untagged so a snapshot reads as plain JSON:
/// `{"caps_number": 258, "slider": 1, "state": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Counters that fit in an `i64`, and the slider open/closed flag.
    Int(i64),
    /// The slider's `N/A` sentinel.
    String(String),
    /// Structured values: the state flag map, and counters above `i64::MAX`.
    Json(serde_json::Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_publish_unknown_slider_as_plain_string() {
        let json = serde_json::to_string(&AttributeValue::String("N/A".to_string())).unwrap();
        assert_eq!(json, "\"N/A\"");
    }

    #[test]
    fn should_publish_counter_as_bare_number() {
        let json = serde_json::to_string(&AttributeValue::Int(1_234)).unwrap();
        assert_eq!(json, "1234");
    }

    #[test]
    fn should_publish_state_flags_as_nested_object() {
        let value = AttributeValue::Json(serde_json::json!({"water_empty": 1, "ready": 0}));
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"ready":0,"water_empty":1}"#);
    }

    #[test]
    fn should_read_back_small_numbers_as_int() {
        let value: AttributeValue = serde_json::from_str("258").unwrap();
        assert_eq!(value, AttributeValue::Int(258));
    }

    #[test]
    fn should_read_back_huge_counters_as_json() {
        let value: AttributeValue = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(value, AttributeValue::Json(serde_json::Value::from(u64::MAX)));
    }
}

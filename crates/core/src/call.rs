//! The envelope of one endpoint call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one HTTP call made on the model's behalf.
///
/// Failures are data, not errors: the envelope is fed back to the model so
/// it can retry, pick another endpoint, or finish anyway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,

    #[serde(default)]
    pub status_code: Option<u16>,

    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default)]
    pub raw_text: String,

    /// Present only when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResult {
    /// A successful call. `data` is the body parsed as JSON when it is
    /// non-empty and valid JSON.
    pub fn ok(status_code: u16, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let data = if raw_text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&raw_text).ok()
        };
        Self {
            success: true,
            status_code: Some(status_code),
            data,
            raw_text,
            error: None,
        }
    }

    /// A failed call, with whatever the failure exposed.
    pub fn failed(
        error: impl Into<String>,
        status_code: Option<u16>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            status_code,
            data: None,
            raw_text: raw_text.into(),
            error: Some(error.into()),
        }
    }

    /// Pretty JSON rendering used in the iteration context.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_parses_json_body() {
        let result = CallResult::ok(200, r#"{"users": 3}"#);
        assert!(result.success);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.data, Some(json!({"users": 3})));
        assert!(result.error.is_none());
    }

    #[test]
    fn ok_with_empty_or_text_body_has_no_data() {
        assert!(CallResult::ok(204, "").data.is_none());
        let text = CallResult::ok(200, "plain text");
        assert!(text.data.is_none());
        assert_eq!(text.raw_text, "plain text");
    }

    #[test]
    fn failed_carries_error_and_status() {
        let result = CallResult::failed("500 Internal Server Error", Some(500), "boom");
        assert!(!result.success);
        assert_eq!(result.status_code, Some(500));
        assert_eq!(result.raw_text, "boom");

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"], "500 Internal Server Error");
    }

    #[test]
    fn success_omits_error_key() {
        let value = serde_json::to_value(CallResult::ok(200, "{}")).unwrap();
        assert!(value.get("error").is_none());
        assert_eq!(value["status_code"], 200);
    }
}

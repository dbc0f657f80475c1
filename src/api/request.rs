//! Action request schema.
//!
//! ```text
//! {"action": "<non-empty string>", "version": <integer>, "params": {...}}
//! ```
//!
//! `action` is required; `version` and `params` are optional.

use super::error::ApiError;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct RawActionRequest {
    action: String,
    #[serde(default)]
    version: Option<i64>,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

/// A validated action call.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action: String,
    pub version: i64,
    pub params: Map<String, Value>,
}

impl ActionRequest {
    /// Decode and validate a request body.
    pub fn from_slice(body: &[u8], default_version: i64) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_slice(body).map_err(ApiError::InvalidJson)?;
        if !value.is_object() {
            return Err(ApiError::InvalidRequest("expected a JSON object".to_string()));
        }

        let raw: RawActionRequest = serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        if raw.action.is_empty() {
            return Err(ApiError::InvalidRequest("action must not be empty".to_string()));
        }

        Ok(Self {
            action: raw.action,
            version: raw.version.unwrap_or(default_version),
            params: raw.params.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_request() {
        let request = ActionRequest::from_slice(br#"{"action": "version"}"#, 6).unwrap();
        assert_eq!(request.action, "version");
        assert_eq!(request.version, 6);
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_full_request() {
        let body = br#"{"action": "findCards", "version": 5, "params": {"query": "deck:current"}}"#;
        let request = ActionRequest::from_slice(body, 6).unwrap();
        assert_eq!(request.version, 5);
        assert_eq!(request.params["query"], "deck:current");
    }

    #[test]
    fn test_schema_violations() {
        for body in [
            &br#"{}"#[..],
            br#"{"action": ""}"#,
            br#"{"action": 3}"#,
            br#"{"action": "x", "version": "6"}"#,
            br#"{"action": "x", "params": []}"#,
            br#"["action"]"#,
        ] {
            match ActionRequest::from_slice(body, 6) {
                Err(ApiError::InvalidRequest(_)) => {}
                other => panic!("unexpected for {:?}: {:?}", body, other),
            }
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ActionRequest::from_slice(b"{not json", 6),
            Err(ApiError::InvalidJson(_))
        ));
        assert!(matches!(
            ActionRequest::from_slice(b"", 6),
            Err(ApiError::InvalidJson(_))
        ));
    }
}

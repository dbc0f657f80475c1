//! Errors reported through the JSON error envelope.

use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    /// Body is not valid JSON.
    InvalidJson(serde_json::Error),
    /// JSON does not match the request schema.
    InvalidRequest(String),
    /// No action registered under this name.
    UnsupportedAction(String),
    /// The action ran and reported a failure.
    ActionFailed { action: String, message: String },
    /// Method other than POST or OPTIONS.
    UnsupportedMethod(Option<String>),
}

impl ApiError {
    /// Name of the action that failed, if one ran.
    pub fn action(&self) -> Option<&str> {
        match self {
            ApiError::ActionFailed { action, .. } => Some(action),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidJson(e) => write!(f, "invalid JSON: {e}"),
            ApiError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            ApiError::UnsupportedAction(action) => write!(f, "unsupported action: {action}"),
            ApiError::ActionFailed { message, .. } => f.write_str(message),
            ApiError::UnsupportedMethod(Some(method)) => write!(f, "unsupported method: {method}"),
            ApiError::UnsupportedMethod(None) => f.write_str("missing request method"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::InvalidJson(e) => Some(e),
            _ => None,
        }
    }
}

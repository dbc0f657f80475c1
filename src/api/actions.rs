//! Action dispatch table.
//!
//! The flashcard application registers its actions here; the endpoint only
//! ships `version`.

use super::error::ApiError;
use super::request::ActionRequest;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// An action receives the request's `params` object.
type Action = Box<dyn Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync>;

#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Action>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the endpoint's own actions.
    pub fn with_builtins(api_version: i64) -> Self {
        let mut registry = Self::new();
        registry.register("version", move |_| Ok(Value::from(api_version)));
        registry
    }

    /// Register `action` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, action: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Box::new(action));
    }

    pub fn dispatch(&self, request: &ActionRequest) -> Result<Value, ApiError> {
        let action = self
            .actions
            .get(&request.action)
            .ok_or_else(|| ApiError::UnsupportedAction(request.action.clone()))?;

        action(&request.params).map_err(|message| ApiError::ActionFailed {
            action: request.action.clone(),
            message,
        })
    }
}

//! JSON action endpoint on top of the connection framer.

use super::actions::ActionRegistry;
use super::error::ApiError;
use super::request::ActionRequest;
use super::{failure_reply, success_reply};
use crate::http::{Request, Response, StatusCode};
use crate::runtime::RequestHandler;
use serde_json::Value;
use tracing::{debug, warn};

/// Answers `POST` action calls and `OPTIONS` preflight requests.
pub struct ApiHandler {
    actions: ActionRegistry,
    api_version: i64,
}

impl ApiHandler {
    pub fn new(actions: ActionRegistry, api_version: i64) -> Self {
        Self {
            actions,
            api_version,
        }
    }

    fn call(&self, body: &[u8]) -> Result<Value, ApiError> {
        let request = ActionRequest::from_slice(body, self.api_version)?;
        debug!(action = %request.action, version = request.version, "Dispatching action");
        self.actions.dispatch(&request)
    }

    fn post(&self, body: &[u8]) -> Response {
        match self.call(body) {
            Ok(result) => json_response(StatusCode::Ok, &success_reply(result)),
            Err(e) => {
                warn!(action = ?e.action(), error = %e, "Action failed");
                json_response(StatusCode::InternalServerError, &failure_reply(&e))
            }
        }
    }
}

impl RequestHandler for ApiHandler {
    fn handle(&self, request: Request) -> Vec<u8> {
        let response = match request.method() {
            Some("POST") => self.post(&request.body),
            Some("OPTIONS") => preflight(),
            method => {
                let e = ApiError::UnsupportedMethod(method.map(str::to_string));
                debug!(error = %e, "Rejecting request");
                json_response(StatusCode::NotImplemented, &failure_reply(&e))
            }
        };
        response.to_bytes()
    }
}

fn preflight() -> Response {
    Response::new(StatusCode::Ok)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "*")
}

fn json_response(status: StatusCode, body: &Value) -> Response {
    Response::new(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(body.to_string())
}

//! JSON action API served through the framer.
//!
//! Every reply carries the same envelope:
//!
//! ```text
//! success: {"result": <value>, "error": null}
//! failure: {"result": null, "error": "<message>"}
//! ```

mod actions;
mod error;
mod handler;
mod request;

pub use actions::ActionRegistry;
pub use handler::ApiHandler;

use serde_json::{json, Value};
use std::fmt::Display;

pub fn success_reply(result: Value) -> Value {
    json!({ "result": result, "error": null })
}

pub fn failure_reply(error: impl Display) -> Value {
    json!({ "result": null, "error": error.to_string() })
}

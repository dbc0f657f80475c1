//! HTTP/1.x framing: request parsing and response serialization.

pub mod parser;
pub mod request;
pub mod response;

pub use request::{Request, RequestHead};
pub use response::{Response, StatusCode};

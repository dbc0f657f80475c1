//! The request handler seam between framing and application logic.

use crate::http::Request;

/// Turns one framed request into the complete serialized response.
///
/// The framer calls this at most once per connection and writes the
/// returned bytes verbatim; the handler owns response framing.
pub trait RequestHandler {
    fn handle(&self, request: Request) -> Vec<u8>;
}

impl<F> RequestHandler for F
where
    F: Fn(Request) -> Vec<u8>,
{
    fn handle(&self, request: Request) -> Vec<u8> {
        self(request)
    }
}

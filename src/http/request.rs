//! A framed HTTP request.

use bytes::Bytes;
use std::collections::HashMap;

/// Header map keyed by lower-cased field name.
///
/// A header line without a `": "` delimiter is stored with a `None` value.
pub type Headers = HashMap<Vec<u8>, Option<Vec<u8>>>;

/// Request line and header fields, parsed once per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHead {
    /// Upper-cased method token, `None` if the request line was empty.
    pub method: Option<String>,
    /// Second token of the request line, if any.
    pub target: Option<String>,
    pub headers: Headers,
}

impl RequestHead {
    /// Look up a header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        let key = name.to_ascii_lowercase();
        self.headers
            .get(key.as_bytes())
            .and_then(|value| value.as_deref())
    }

    /// Declared body length.
    ///
    /// Missing, valueless and non-numeric headers all count as zero.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }
}

/// A complete request: head plus exactly `content_length()` body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub head: RequestHead,
    pub body: Bytes,
}

impl Request {
    pub fn new(head: RequestHead, body: Bytes) -> Self {
        Self { head, body }
    }

    pub fn method(&self) -> Option<&str> {
        self.head.method.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.head.target.as_deref()
    }
}

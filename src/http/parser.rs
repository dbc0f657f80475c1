//! HTTP/1.x request framing.
//!
//! Recognises one request in a byte buffer: request line, `\r\n`-delimited
//! header fields, a blank line, then exactly `Content-Length` body bytes.
//! Parsing is permissive and never fails; malformed input yields absent
//! values and the caller decides what to reject.

use super::request::{Headers, Request, RequestHead};
use bytes::Bytes;

const SEPARATOR: &[u8] = b"\r\n\r\n";
const HEADER_DELIMITER: &[u8] = b": ";

/// Length of the blank-line separator ending the header block.
pub const SEPARATOR_LEN: usize = SEPARATOR.len();

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// A complete request and the number of bytes it occupies.
    Complete(Request, usize),
    /// Head parsed, fewer than `header_len + body_len` bytes buffered.
    PartialBody {
        head: RequestHead,
        header_len: usize,
        body_len: usize,
    },
    /// Header separator not received yet.
    Incomplete,
}

/// Parse one request from the front of `input`.
///
/// The separator search starts at `scan_from`; pass 0 for a fresh buffer.
/// A caller resuming over a growing buffer may skip a prefix already known
/// to hold no separator (see [`find_head_end`]).
pub fn parse(input: &[u8], scan_from: usize) -> ParseResult {
    let head_end = match find_head_end(input, scan_from) {
        Some(pos) => pos,
        None => return ParseResult::Incomplete,
    };

    let head = parse_head(&input[..head_end]);
    let header_len = head_end + SEPARATOR_LEN;
    let body_len = head.content_length();

    match complete_body(head, header_len, body_len, input) {
        Ok((request, consumed)) => ParseResult::Complete(request, consumed),
        Err(head) => ParseResult::PartialBody {
            head,
            header_len,
            body_len,
        },
    }
}

/// Build the request once `header_len + body_len` bytes are in `input`.
///
/// Returns the request with its byte length, or hands `head` back when the
/// body is still short.
pub fn complete_body(
    head: RequestHead,
    header_len: usize,
    body_len: usize,
    input: &[u8],
) -> Result<(Request, usize), RequestHead> {
    let total_len = header_len.saturating_add(body_len);
    if total_len > input.len() {
        return Err(head);
    }

    let body = Bytes::copy_from_slice(&input[header_len..total_len]);
    Ok((Request::new(head, body), total_len))
}

/// Find the blank-line separator, returning the offset of its first byte.
///
/// The search starts at `from`, so a caller that has already scanned a
/// prefix can resume; pass an offset at least three bytes before the end
/// of the previously scanned data to catch a separator split across reads.
pub fn find_head_end(buffer: &[u8], from: usize) -> Option<usize> {
    if from >= buffer.len() {
        return None;
    }
    buffer[from..]
        .windows(SEPARATOR.len())
        .position(|w| w == SEPARATOR)
        .map(|pos| from + pos)
}

/// Parse the header block (everything before the separator).
pub fn parse_head(block: &[u8]) -> RequestHead {
    let mut lines = CrlfLines { rest: Some(block) };

    let request_line = lines.next().unwrap_or_default();
    let mut tokens = request_line
        .split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty());

    let method = tokens
        .next()
        .map(|t| String::from_utf8_lossy(t).to_ascii_uppercase());
    let target = tokens.next().map(|t| String::from_utf8_lossy(t).into_owned());

    let mut headers = Headers::new();
    for line in lines {
        let (name, value) = match find(line, HEADER_DELIMITER) {
            Some(pos) => (&line[..pos], Some(line[pos + HEADER_DELIMITER.len()..].to_vec())),
            None => (line, None),
        };
        headers.insert(name.to_ascii_lowercase(), value);
    }

    RequestHead {
        method,
        target,
        headers,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Iterator over `\r\n`-separated lines of a header block.
struct CrlfLines<'a> {
    rest: Option<&'a [u8]>,
}

impl<'a> Iterator for CrlfLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest?;
        match find(rest, b"\r\n") {
            Some(pos) => {
                self.rest = Some(&rest[pos + 2..]);
                Some(&rest[..pos])
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";

    fn complete(input: &[u8]) -> (Request, usize) {
        match parse(input, 0) {
            ParseResult::Complete(request, consumed) => (request, consumed),
            other => panic!("not complete: {:?} from {:?}", other, input),
        }
    }

    #[test]
    fn test_parse_post_with_body() {
        let (request, consumed) = complete(POST);
        assert_eq!(request.method(), Some("POST"));
        assert_eq!(request.target(), Some("/"));
        assert_eq!(request.head.header("content-length"), Some(&b"5"[..]));
        assert_eq!(&request.body[..], b"hello");
        assert_eq!(consumed, POST.len());
    }

    #[test]
    fn test_missing_content_length_means_empty_body() {
        let input = b"GET / HTTP/1.1\r\n\r\n";
        let (request, consumed) = complete(input);
        assert_eq!(request.method(), Some("GET"));
        assert!(request.body.is_empty());
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_incomplete_headers() {
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nHost: x\r\n", 0),
            ParseResult::Incomplete
        ));
        assert!(matches!(parse(b"", 0), ParseResult::Incomplete));
    }

    #[test]
    fn test_short_body_keeps_parsed_head() {
        let input = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
        let (head, header_len, body_len) = match parse(input, 0) {
            ParseResult::PartialBody {
                head,
                header_len,
                body_len,
            } => (head, header_len, body_len),
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(head.method.as_deref(), Some("POST"));
        assert_eq!(header_len, input.len() - 5);
        assert_eq!(body_len, 10);

        let mut full = input.to_vec();
        full.extend_from_slice(b"world");
        let (request, consumed) = complete_body(head, header_len, body_len, &full).unwrap();
        assert_eq!(&request.body[..], b"helloworld");
        assert_eq!(consumed, full.len());
    }

    #[test]
    fn test_complete_body_hands_head_back_when_short() {
        let head = parse_head(b"POST / HTTP/1.1\r\nContent-Length: 3");
        let head = complete_body(head, 10, 3, b"0123456789ab").unwrap_err();
        assert_eq!(head.content_length(), 3);
    }

    #[test]
    fn test_parse_skips_scanned_prefix() {
        let input = b"GET / HTTP/1.1\r\n\r\n";
        assert!(matches!(parse(input, 13), ParseResult::Complete(_, 18)));
        assert!(matches!(parse(&input[..17], 13), ParseResult::Incomplete));
    }

    #[test]
    fn test_trailing_bytes_not_consumed() {
        let mut input = POST.to_vec();
        input.extend_from_slice(b"GET /second HTTP/1.1\r\n\r\n");
        let (request, consumed) = complete(&input);
        assert_eq!(&request.body[..], b"hello");
        assert_eq!(consumed, POST.len());
    }

    #[test]
    fn test_header_names_lower_cased() {
        for name in ["content-length", "Content-Length", "CONTENT-LENGTH"] {
            let input = format!("POST / HTTP/1.1\r\n{name}: 2\r\n\r\nok");
            let (request, _) = complete(input.as_bytes());
            assert_eq!(request.head.headers.get(&b"content-length"[..]), Some(&Some(b"2".to_vec())));
            assert_eq!(&request.body[..], b"ok");
        }
    }

    #[test]
    fn test_method_upper_cased() {
        let (request, _) = complete(b"post /x HTTP/1.1\r\n\r\n");
        assert_eq!(request.method(), Some("POST"));
    }

    #[test]
    fn test_empty_request_line_has_no_method() {
        let (request, consumed) = complete(b"\r\n\r\n");
        assert_eq!(request.method(), None);
        assert_eq!(consumed, 4);

        let (request, _) = complete(b"\r\nHost: x\r\n\r\n");
        assert_eq!(request.method(), None);
        assert_eq!(request.head.header("host"), Some(&b"x"[..]));
    }

    #[test]
    fn test_header_without_delimiter_has_no_value() {
        let (request, _) = complete(b"GET / HTTP/1.1\r\nBroken\r\nX-A: 1\r\n\r\n");
        assert_eq!(request.head.headers.get(&b"broken"[..]), Some(&None));
        assert_eq!(request.head.header("x-a"), Some(&b"1"[..]));
    }

    #[test]
    fn test_header_value_split_on_first_delimiter() {
        let (request, _) = complete(b"GET / HTTP/1.1\r\nX-Time: 12: 30\r\n\r\n");
        assert_eq!(request.head.header("x-time"), Some(&b"12: 30"[..]));
    }

    #[test]
    fn test_duplicate_header_overwrites() {
        let (request, _) = complete(b"GET / HTTP/1.1\r\nX-A: 1\r\nx-a: 2\r\n\r\n");
        assert_eq!(request.head.header("x-a"), Some(&b"2"[..]));
    }

    #[test]
    fn test_non_numeric_content_length() {
        let input = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
        let (request, consumed) = complete(input);
        assert!(request.body.is_empty());
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_find_head_end_resumes() {
        let buf = b"GET / HTTP/1.1\r\n\r\n";
        assert_eq!(find_head_end(buf, 0), Some(14));
        assert_eq!(find_head_end(buf, 14), Some(14));
        assert_eq!(find_head_end(buf, 15), None);
        assert_eq!(find_head_end(buf, 100), None);
    }
}

//! HTTP message value types.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Display;

use crate::MAX_HEADER_COUNT;
use crate::body::InboundBody;
use crate::error::{FrameError, snippet};
use crate::io::Transport;
use crate::parse;
use crate::range::{ContentRange, Range};

fn to_ascii_lowercase_cow(text: &str) -> Cow<'_, str> {
    if text.chars().any(|c| c.is_ascii_uppercase()) {
        Cow::Owned(text.to_ascii_lowercase())
    } else {
        Cow::Borrowed(text)
    }
}

/// The five supported request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Head,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Head => "HEAD",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a request with this method may carry a body.
    pub fn allows_body(self) -> bool {
        matches!(self, Self::Put | Self::Post)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed header value.
///
/// The framing-relevant names parse into dedicated variants; everything else
/// stays text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Str(String),
    ContentLength(u64),
    Chunked,
    Range(Range),
    ContentRange(ContentRange),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        if let Self::Str(v) = self { Some(v) } else { None }
    }
}

impl Display for HeaderValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(value) => f.write_str(value),
            Self::ContentLength(length) => write!(f, "{length}"),
            Self::Chunked => f.write_str("chunked"),
            Self::Range(range) => write!(f, "{range}"),
            Self::ContentRange(range) => write!(f, "{range}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<u64> for HeaderValue {
    fn from(value: u64) -> Self {
        Self::ContentLength(value)
    }
}

impl From<Range> for HeaderValue {
    fn from(value: Range) -> Self {
        Self::Range(value)
    }
}

impl From<ContentRange> for HeaderValue {
    fn from(value: ContentRange) -> Self {
        Self::ContentRange(value)
    }
}

/// Header map with lower-cased keys and deterministic (sorted) emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: BTreeMap<String, HeaderValue>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(to_ascii_lowercase_cow(name).as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.fields.get(to_ascii_lowercase_cow(name).as_ref())
    }

    pub fn insert(&mut self, name: &str, value: impl Into<HeaderValue>) -> Option<HeaderValue> {
        self.fields
            .insert(to_ascii_lowercase_cow(name).into_owned(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        self.fields.remove(to_ascii_lowercase_cow(name).as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn content_length(&self) -> Option<u64> {
        match self.fields.get("content-length") {
            Some(HeaderValue::ContentLength(length)) => Some(*length),
            _ => None,
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.fields.get("transfer-encoding"), Some(HeaderValue::Chunked))
    }

    pub fn range(&self) -> Option<&Range> {
        match self.fields.get("range") {
            Some(HeaderValue::Range(range)) => Some(range),
            _ => None,
        }
    }

    pub fn content_range(&self) -> Option<&ContentRange> {
        match self.fields.get("content-range") {
            Some(HeaderValue::ContentRange(range)) => Some(range),
            _ => None,
        }
    }

    /// Append `name: value\r\n` lines in sorted key order plus the blank
    /// line, re-validating names and text values on the way out.
    pub(crate) fn serialize(&self, out: &mut Vec<u8>) -> Result<(), FrameError> {
        if self.len() > MAX_HEADER_COUNT {
            return Err(FrameError::TooManyHeaders);
        }

        for (name, value) in &self.fields {
            parse::parse_header_name(name.as_bytes())?;

            if let HeaderValue::Str(text) = value {
                if text.is_empty() {
                    return Err(FrameError::EmptyHeaderValue);
                }

                if !text.bytes().all(parse::is_value_byte) {
                    return Err(FrameError::BadHeaderValueBytes(snippet(text.as_bytes())));
                }
            }

            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");

        Ok(())
    }
}

/// A received request, bound to the connection it arrived on.
pub struct Request<'a, T: Transport> {
    pub method: Method,
    pub uri: String,
    pub headers: Headers,
    pub body: Option<InboundBody<'a, T>>,
    /// Path segments already consumed by routing.
    pub mount: Vec<String>,
    /// Path segments not yet routed.
    pub path: Vec<String>,
    /// `None` when the uri has no '?', empty when present but empty.
    pub query: Option<String>,
}

impl<T: Transport> std::fmt::Debug for Request<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| "..."))
            .field("mount", &self.mount)
            .field("path", &self.path)
            .field("query", &self.query)
            .finish()
    }
}

impl<T: Transport> Request<'_, T> {
    /// Pop the head of `path` onto the tail of `mount`, returning the moved
    /// segment. The router is the only intended caller.
    pub fn shift_path(&mut self) -> Option<&str> {
        if self.path.is_empty() {
            return None;
        }

        let segment = self.path.remove(0);
        self.mount.push(segment);
        self.mount.last().map(|s| s.as_str())
    }
}

/// A received response, bound to the connection it arrived on.
pub struct Response<'a, T: Transport> {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Option<InboundBody<'a, T>>,
}

impl<T: Transport> std::fmt::Debug for Response<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| "..."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Host", "example.com");

        assert!(headers.contains("host"));
        assert!(headers.contains("HOST"));
        assert_eq!(
            headers.get("hOsT"),
            Some(&HeaderValue::Str("example.com".into()))
        );

        headers.insert("HOST", "other.example");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.remove("host"), Some(HeaderValue::Str("other.example".into())));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_typed_accessors() {
        let mut headers = Headers::new();
        headers.insert("content-length", 17u64);
        assert_eq!(headers.content_length(), Some(17));
        assert!(!headers.is_chunked());

        headers.remove("content-length");
        headers.insert("transfer-encoding", HeaderValue::Chunked);
        assert!(headers.is_chunked());

        headers.insert("range", Range::new(10, 20).unwrap());
        assert_eq!(headers.range(), Some(&Range::new(10, 20).unwrap()));
    }

    #[test]
    fn test_headers_serialize_sorted() {
        let mut headers = Headers::new();
        headers.insert("x-b", "2");
        headers.insert("X-A", "1");
        headers.insert("content-length", 5u64);

        let mut out = Vec::new();
        headers.serialize(&mut out).unwrap();
        assert_eq!(out, b"content-length: 5\r\nx-a: 1\r\nx-b: 2\r\n\r\n");
    }

    #[test]
    fn test_shift_path() {
        use crate::io::testing::Script;

        let mut request: Request<'static, Script> = Request {
            method: Method::Get,
            uri: "/foo/bar".to_owned(),
            headers: Headers::new(),
            body: None,
            mount: Vec::new(),
            path: vec!["foo".to_owned(), "bar".to_owned()],
            query: None,
        };

        assert_eq!(request.shift_path(), Some("foo"));
        assert_eq!(request.mount, ["foo"]);
        assert_eq!(request.path, ["bar"]);

        assert_eq!(request.shift_path(), Some("bar"));
        assert_eq!(request.shift_path(), None);
        assert_eq!(request.mount, ["foo", "bar"]);
        assert!(request.path.is_empty());
    }

    #[test]
    fn test_headers_serialize_rejects_bad_fields() {
        let mut headers = Headers::new();
        headers.insert("x-bad value", "v");
        let mut out = Vec::new();
        assert_eq!(
            headers.serialize(&mut out).unwrap_err().to_string(),
            "bad bytes in header name: 'x-bad value'"
        );

        let mut headers = Headers::new();
        headers.insert("x-crlf", "a\r\nx-smuggled: b");
        let mut out = Vec::new();
        assert_eq!(
            headers.serialize(&mut out).unwrap_err().to_string(),
            "bad bytes in header value: 'a\\r\\nx-smuggled: b'"
        );

        let mut headers = Headers::new();
        for i in 0..21 {
            headers.insert(&format!("x-header-{i}"), "v");
        }
        let mut out = Vec::new();
        assert!(headers.serialize(&mut out).is_err());
    }
}

//! Wire grammar: tokenizers and validators for every textual production.
//!
//! These functions are pure; binding parsed preambles to a socket happens in
//! [`crate::io`]. Error strings are exact and stable.

use crate::error::{Error, FrameError, ProtocolError, snippet};
use crate::message::{HeaderValue, Headers, Method};
use crate::range::{ContentRange, Range};
use crate::{MAX_HEADER_COUNT, MAX_HEADER_NAME_BYTES, MAX_IO_SIZE, MAX_LENGTH, MAX_LINE_BYTES};

/// Index of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

pub(crate) fn is_value_byte(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

fn is_header_name_byte(b: u8) -> bool {
    b == b'-' || b.is_ascii_alphanumeric()
}

fn is_extension_key_byte(b: u8) -> bool {
    matches!(b, b'-' | b'_' | b'0'..=b'9' | b'a'..=b'z')
}

fn is_extension_value_byte(b: u8) -> bool {
    b.is_ascii_graphic() && b != b';' && b != b'='
}

/// Decimal with no sign, no leading zero (unless the literal is "0") and at
/// most 16 digits, which also caps the value at [`MAX_LENGTH`].
fn parse_decimal(src: &[u8]) -> Option<u64> {
    if src.is_empty() || src.len() > 16 {
        return None;
    }

    if src.len() > 1 && src[0] == b'0' {
        return None;
    }

    let mut value = 0u64;

    for &b in src {
        if !b.is_ascii_digit() {
            return None;
        }

        value = value * 10 + u64::from(b - b'0');
    }

    Some(value)
}

pub fn parse_method(src: &[u8]) -> Result<Method, FrameError> {
    match src {
        b"GET" => Ok(Method::Get),
        b"PUT" => Ok(Method::Put),
        b"POST" => Ok(Method::Post),
        b"HEAD" => Ok(Method::Head),
        b"DELETE" => Ok(Method::Delete),
        _ => Err(FrameError::BadMethod(snippet(src))),
    }
}

/// Parsed request target: raw uri, path segments and the query string.
///
/// `query` is `None` when the uri has no '?', and empty when the '?' is
/// present with nothing after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub uri: String,
    pub mount: Vec<String>,
    pub path: Vec<String>,
    pub query: Option<String>,
}

pub fn parse_uri(src: &[u8]) -> Result<Uri, FrameError> {
    if src.first() != Some(&b'/') || !src.iter().all(|&b| b.is_ascii_graphic()) {
        return Err(FrameError::BadUri(snippet(src)));
    }

    let (path_part, query) = match src.iter().position(|&b| b == b'?') {
        Some(i) => (&src[..i], Some(&src[i + 1..])),
        None => (&src[..], None),
    };

    if find(path_part, b"//").is_some() {
        return Err(FrameError::BadUri(snippet(src)));
    }

    let path = if path_part == b"/" {
        Vec::new()
    } else {
        path_part[1..]
            .split(|&b| b == b'/')
            .map(|segment| String::from_utf8(segment.to_vec()).unwrap())
            .collect()
    };

    Ok(Uri {
        uri: String::from_utf8(src.to_vec()).unwrap(),
        mount: Vec::new(),
        path,
        query: query.map(|q| String::from_utf8(q.to_vec()).unwrap()),
    })
}

pub fn parse_header_name(src: &[u8]) -> Result<String, FrameError> {
    if src.is_empty() {
        return Err(FrameError::EmptyHeaderName);
    }

    if src.len() > MAX_HEADER_NAME_BYTES {
        return Err(FrameError::HeaderNameTooLong);
    }

    if !src.iter().all(|&b| is_header_name_byte(b)) {
        return Err(FrameError::BadHeaderNameBytes(snippet(src)));
    }

    Ok(String::from_utf8(src.to_ascii_lowercase()).unwrap())
}

pub fn parse_content_length(src: &[u8]) -> Result<u64, FrameError> {
    if src.len() > 16 {
        return Err(FrameError::ContentLengthTooLong(snippet(src)));
    }

    parse_decimal(src).ok_or_else(|| FrameError::BadContentLength(snippet(src)))
}

pub fn parse_range(src: &[u8]) -> Result<Range, FrameError> {
    if src.len() > 39 {
        return Err(FrameError::RangeTooLong(snippet(src)));
    }

    let bad = || FrameError::BadRange(snippet(src));

    let rest = src.strip_prefix(b"bytes=").ok_or_else(bad)?;
    let dash = rest.iter().position(|&b| b == b'-').ok_or_else(bad)?;
    let start = parse_decimal(&rest[..dash]).ok_or_else(bad)?;
    let end = parse_decimal(&rest[dash + 1..]).ok_or_else(bad)?;

    // END is inclusive on the wire; stop = END + 1 must stay within bounds.
    if end >= MAX_LENGTH || start > end {
        return Err(bad());
    }

    Range::new(start, end + 1).map_err(|_| bad())
}

pub fn parse_content_range(src: &[u8]) -> Result<ContentRange, FrameError> {
    if src.len() > 56 {
        return Err(FrameError::ContentRangeTooLong(snippet(src)));
    }

    let bad = || FrameError::BadContentRange(snippet(src));

    let rest = src.strip_prefix(b"bytes ").ok_or_else(bad)?;
    let dash = rest.iter().position(|&b| b == b'-').ok_or_else(bad)?;
    let slash = rest.iter().position(|&b| b == b'/').ok_or_else(bad)?;

    if slash <= dash {
        return Err(bad());
    }

    let start = parse_decimal(&rest[..dash]).ok_or_else(bad)?;
    let end = parse_decimal(&rest[dash + 1..slash]).ok_or_else(bad)?;
    let total = parse_decimal(&rest[slash + 1..]).ok_or_else(bad)?;

    if end >= MAX_LENGTH || start > end || end + 1 > total {
        return Err(bad());
    }

    ContentRange::new(start, end + 1, total).map_err(|_| bad())
}

/// Lowercase hex, no leading zero unless the value is 0, at most 7 digits.
pub fn parse_chunk_size(src: &[u8]) -> Result<u64, FrameError> {
    if src.len() > 7 {
        return Err(FrameError::ChunkSizeTooLong(snippet(src)));
    }

    let lower_hex = |b: u8| b.is_ascii_digit() || (b'a'..=b'f').contains(&b);

    if src.is_empty() || !src.iter().all(|&b| lower_hex(b)) {
        return Err(FrameError::BadChunkSize(snippet(src)));
    }

    if src.len() > 1 && src[0] == b'0' {
        return Err(FrameError::BadChunkSize(snippet(src)));
    }

    let mut value = 0u64;

    for &b in src {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            _ => b - b'a' + 10,
        };
        value = value * 16 + u64::from(digit);
    }

    if value > MAX_IO_SIZE as u64 {
        return Err(FrameError::ChunkSizeTooBig(value));
    }

    Ok(value)
}

pub fn parse_chunk_extension(src: &[u8]) -> Result<(String, String), FrameError> {
    match wire::chunk_extension(src) {
        Ok((_remain, (key, value))) => Ok((
            String::from_utf8(key.to_vec()).unwrap(),
            String::from_utf8(value.to_vec()).unwrap(),
        )),
        Err(_) => Err(FrameError::BadChunkExtension(snippet(src))),
    }
}

/// Parse the header block (everything after the first preamble line).
///
/// Typed parsing is dispatched per name; the framing-header exclusions and
/// the request/response-only restrictions are enforced here.
pub fn parse_headers(src: &[u8], isresponse: bool) -> Result<Headers, FrameError> {
    let mut headers = Headers::new();

    if src.is_empty() {
        return Ok(headers);
    }

    let mut count = 0usize;
    let mut remaining = src;

    loop {
        let (line, rest) = match find(remaining, b"\r\n") {
            Some(i) => (&remaining[..i], Some(&remaining[i + 2..])),
            None => (remaining, None),
        };

        count += 1;

        if count > MAX_HEADER_COUNT {
            return Err(FrameError::TooManyHeaders);
        }

        if line.len() > MAX_LINE_BYTES {
            return Err(FrameError::HeaderLineTooLong);
        }

        let (name_bytes, value_bytes) = match wire::header_line(line) {
            Ok((_remain, pair)) => pair,
            Err(_) => return Err(FrameError::BadHeaderLine(snippet(line))),
        };

        let name = parse_header_name(name_bytes)?;

        if value_bytes.is_empty() {
            return Err(FrameError::EmptyHeaderValue);
        }

        if headers.contains(&name) {
            return Err(FrameError::DuplicateHeader(name));
        }

        let value = match name.as_str() {
            "content-length" => HeaderValue::ContentLength(parse_content_length(value_bytes)?),
            "transfer-encoding" => {
                if value_bytes != &b"chunked"[..] {
                    return Err(FrameError::BadTransferEncoding(snippet(value_bytes)));
                }
                HeaderValue::Chunked
            }
            "range" => {
                if isresponse {
                    return Err(FrameError::RangeInResponse);
                }
                HeaderValue::Range(parse_range(value_bytes)?)
            }
            "content-range" => {
                if !isresponse {
                    return Err(FrameError::ContentRangeInRequest);
                }
                HeaderValue::ContentRange(parse_content_range(value_bytes)?)
            }
            _ => {
                if !value_bytes.iter().all(|&b| is_value_byte(b)) {
                    return Err(FrameError::BadHeaderValueBytes(snippet(value_bytes)));
                }
                HeaderValue::Str(String::from_utf8(value_bytes.to_vec()).unwrap())
            }
        };

        headers.insert(&name, value);

        match rest {
            Some(r) => remaining = r,
            None => break,
        }
    }

    if headers.contains("content-length") && headers.contains("transfer-encoding") {
        return Err(FrameError::ContentLengthWithTransferEncoding);
    }

    if headers.contains("range") {
        if headers.contains("content-length") {
            return Err(FrameError::RangeWithContentLength);
        }

        if headers.contains("transfer-encoding") {
            return Err(FrameError::RangeWithTransferEncoding);
        }
    }

    Ok(headers)
}

/// How the message body is framed on the wire, when one is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPlan {
    Sized(u64),
    Chunked,
}

#[derive(Debug)]
pub struct RequestParts {
    pub method: Method,
    pub uri: String,
    pub headers: Headers,
    pub mount: Vec<String>,
    pub path: Vec<String>,
    pub query: Option<String>,
    pub body: Option<BodyPlan>,
}

pub fn parse_request(preamble: &[u8]) -> Result<RequestParts, Error> {
    if preamble.is_empty() {
        return Err(ProtocolError::EmptyPreamble.into());
    }

    let (first, rest) = match find(preamble, b"\r\n") {
        Some(i) => (&preamble[..i], &preamble[i + 2..]),
        None => (preamble, &b""[..]),
    };

    let head = first
        .strip_suffix(b" HTTP/1.1")
        .ok_or_else(|| FrameError::BadRequestProtocol(snippet(first)))?;
    let space = head
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| FrameError::BadRequestProtocol(snippet(first)))?;

    let method = parse_method(&head[..space])?;
    let uri = parse_uri(&head[space + 1..])?;
    let headers = parse_headers(rest, false)?;

    let body = if let Some(length) = headers.content_length() {
        Some(BodyPlan::Sized(length))
    } else if headers.is_chunked() {
        Some(BodyPlan::Chunked)
    } else {
        None
    };

    if let Some(plan) = body {
        if !method.allows_body() {
            let header = match plan {
                BodyPlan::Sized(..) => "content-length",
                BodyPlan::Chunked => "transfer-encoding",
            };
            return Err(FrameError::UnexpectedBodyHeader {
                method: method.as_str(),
                header,
            }
            .into());
        }
    }

    Ok(RequestParts {
        method,
        uri: uri.uri,
        headers,
        mount: uri.mount,
        path: uri.path,
        query: uri.query,
        body,
    })
}

#[derive(Debug)]
pub struct ResponseParts {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Option<BodyPlan>,
}

pub fn parse_response(method: Method, preamble: &[u8]) -> Result<ResponseParts, Error> {
    if preamble.is_empty() {
        return Err(ProtocolError::EmptyPreamble.into());
    }

    let (first, rest) = match find(preamble, b"\r\n") {
        Some(i) => (&preamble[..i], &preamble[i + 2..]),
        None => (preamble, &b""[..]),
    };

    let tail = first
        .strip_prefix(b"HTTP/1.1 ")
        .ok_or_else(|| FrameError::BadStatusProtocol(snippet(first)))?;

    // Exactly "SSS REASON"; the space is mandatory, the reason may be empty.
    if tail.len() < 4 || tail[3] != b' ' {
        return Err(FrameError::BadStatusProtocol(snippet(first)).into());
    }

    let status_bytes = &tail[..3];

    if !status_bytes.iter().all(|b| b.is_ascii_digit()) {
        return Err(FrameError::BadStatus(snippet(status_bytes)).into());
    }

    let status = status_bytes
        .iter()
        .fold(0u16, |acc, &b| acc * 10 + u16::from(b - b'0'));

    if !(100..=599).contains(&status) {
        return Err(FrameError::BadStatus(snippet(status_bytes)).into());
    }

    let reason_bytes = &tail[4..];

    if !reason_bytes.iter().all(|&b| is_value_byte(b)) {
        return Err(FrameError::BadReason(snippet(reason_bytes)).into());
    }

    let headers = parse_headers(rest, true)?;

    let body = if method == Method::Head {
        None
    } else if let Some(length) = headers.content_length() {
        Some(BodyPlan::Sized(length))
    } else if headers.is_chunked() {
        Some(BodyPlan::Chunked)
    } else {
        None
    };

    Ok(ResponseParts {
        status,
        reason: String::from_utf8(reason_bytes.to_vec()).unwrap(),
        headers,
        body,
    })
}

mod wire {
    use nom::{
        IResult, Parser,
        bytes::complete::{tag, take_while, take_while1},
        combinator::{all_consuming, rest},
        sequence::separated_pair,
    };

    pub fn header_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
        separated_pair(take_while(|b: u8| b != b':'), tag(": "), rest).parse(input)
    }

    pub fn chunk_extension(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
        all_consuming(separated_pair(
            take_while1(super::is_extension_key_byte),
            tag("="),
            take_while1(super::is_extension_value_byte),
        ))
        .parse(input)
    }
}

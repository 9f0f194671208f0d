//! Error representations.
//!
//! Message strings are part of the wire contract: peers and embedding
//! applications match on them, so they are asserted verbatim in tests.

use crate::body::BodyState;

/// Render at most the first 32 bytes of `data` with ASCII escapes.
pub(crate) fn snippet(data: &[u8]) -> String {
    data[..data.len().min(32)].escape_ascii().to_string()
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Body(#[from] BodyError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_frame(&self) -> bool {
        matches!(self, Self::Frame(..))
    }

    pub fn as_frame(&self) -> Option<&FrameError> {
        if let Self::Frame(v) = self { Some(v) } else { None }
    }

    pub fn is_body(&self) -> bool {
        matches!(self, Self::Body(..))
    }

    pub fn as_body(&self) -> Option<&BodyError> {
        if let Self::Body(v) = self { Some(v) } else { None }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(..))
    }

    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        if let Self::Protocol(v) = self { Some(v) } else { None }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(..))
    }

    pub fn as_io(&self) -> Option<&std::io::Error> {
        if let Self::Io(v) = self { Some(v) } else { None }
    }

    /// Whether this is the distinguished "peer sent nothing" condition.
    pub fn is_empty_preamble(&self) -> bool {
        matches!(self, Self::Protocol(ProtocolError::EmptyPreamble))
    }
}

/// Wire grammar violation. Always fatal to the current connection.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    #[error("bad HTTP method: '{0}'")]
    BadMethod(String),

    #[error("bad uri: '{0}'")]
    BadUri(String),

    #[error("header name is empty")]
    EmptyHeaderName,

    #[error("header name is too long")]
    HeaderNameTooLong,

    #[error("bad bytes in header name: '{0}'")]
    BadHeaderNameBytes(String),

    #[error("header value is empty")]
    EmptyHeaderValue,

    #[error("bad bytes in header value: '{0}'")]
    BadHeaderValueBytes(String),

    #[error("bad header line: '{0}'")]
    BadHeaderLine(String),

    #[error("header line is too long")]
    HeaderLineTooLong,

    #[error("too many headers")]
    TooManyHeaders,

    #[error("duplicate header: '{0}'")]
    DuplicateHeader(String),

    #[error("bad content-length: '{0}'")]
    BadContentLength(String),

    #[error("content-length is too long: '{0}'")]
    ContentLengthTooLong(String),

    #[error("bad transfer-encoding: '{0}'")]
    BadTransferEncoding(String),

    #[error("bad range: '{0}'")]
    BadRange(String),

    #[error("range is too long: '{0}'")]
    RangeTooLong(String),

    #[error("bad content-range: '{0}'")]
    BadContentRange(String),

    #[error("content-range is too long: '{0}'")]
    ContentRangeTooLong(String),

    #[error("need 0 <= start < stop <= 9999999999999999; got ({start}, {stop})")]
    RangeValues { start: u64, stop: u64 },

    #[error("need 0 <= start < stop <= total <= 9999999999999999; got ({start}, {stop}, {total})")]
    ContentRangeValues { start: u64, stop: u64, total: u64 },

    #[error("bad chunk_size: '{0}'")]
    BadChunkSize(String),

    #[error("chunk_size is too long: '{0}'")]
    ChunkSizeTooLong(String),

    #[error("need chunk_size <= 16777216; got {0}")]
    ChunkSizeTooBig(u64),

    #[error("bad chunk extension: '{0}'")]
    BadChunkExtension(String),

    #[error("bad chunk data termination")]
    BadChunkTermination,

    #[error("content-length with transfer-encoding")]
    ContentLengthWithTransferEncoding,

    #[error("range with content-length")]
    RangeWithContentLength,

    #[error("range with transfer-encoding")]
    RangeWithTransferEncoding,

    #[error("response with a 'range' header")]
    RangeInResponse,

    #[error("request with a 'content-range' header")]
    ContentRangeInRequest,

    #[error("'{method}' request with a '{header}' header")]
    UnexpectedBodyHeader {
        method: &'static str,
        header: &'static str,
    },

    #[error("bad protocol in request line: '{0}'")]
    BadRequestProtocol(String),

    #[error("bad protocol in status line: '{0}'")]
    BadStatusProtocol(String),

    #[error("bad status: '{0}'")]
    BadStatus(String),

    #[error("bad reason: '{0}'")]
    BadReason(String),

    #[error("'{delimiter}' not found in '{snippet}'...")]
    DelimiterNotFound { delimiter: String, snippet: String },
}

/// Body lifecycle or content violation. Always fatal to the body, and to the
/// connection when the body rides on a socket.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BodyError {
    #[error("cannot use body in {0} state")]
    Unusable(BodyState),

    #[error("expected to read {expected} bytes, but received {received}")]
    ShortRead { expected: u64, received: u64 },

    #[error("need size <= 16777216; got {0}")]
    OverMaxRead(u64),

    #[error("exceeds content_length: {sent} > {content_length}")]
    Exceeds { sent: u64, content_length: u64 },

    #[error("deceeds content_length: {sent} < {content_length}")]
    Deceeds { sent: u64, content_length: u64 },

    #[error("final chunk data was not empty")]
    FinalChunkNotEmpty,

    #[error("additional chunk after empty chunk data")]
    ChunkAfterFinal,
}

/// Connection or session contract violation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("empty preamble")]
    EmptyPreamble,

    #[error("Connection is closed")]
    Closed,

    #[error("previous response body not consumed")]
    UnconsumedResponseBody,

    #[error("conflicting '{0}' header")]
    ConflictingHeader(String),

    #[error("'{0}' request with a body")]
    BodyNotAllowed(&'static str),

    #[error("'content-length' header mismatch: header says {header}, body is {body}")]
    ContentLengthMismatch { header: String, body: u64 },

    #[error("'{0}' header with no body")]
    HeaderWithoutBody(&'static str),

    #[error("'content-length' header with a chunked body")]
    ContentLengthWithChunkedBody,

    #[error("'transfer-encoding' header with a sized body")]
    TransferEncodingWithSizedBody,

    #[error("need 100 <= status <= 599; got {0}")]
    StatusOutOfRange(u16),

    #[error("response to a 'HEAD' request with a body")]
    HeadResponseWithBody,

    #[error("request body in {0} state after handler returned")]
    RequestBodyNotConsumed(BodyState),

    #[error("need max_requests <= 75000; got {0}")]
    MaxRequestsOutOfRange(usize),

    #[error("max appmap depth 10 exceeded")]
    MaxAppmapDepth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_verbatim() {
        assert_eq!(
            FrameError::BadMethod("TRACE".into()).to_string(),
            "bad HTTP method: 'TRACE'"
        );
        assert_eq!(
            FrameError::ChunkSizeTooBig(16777217).to_string(),
            "need chunk_size <= 16777216; got 16777217"
        );
        assert_eq!(
            BodyError::ShortRead { expected: 10, received: 3 }.to_string(),
            "expected to read 10 bytes, but received 3"
        );
        assert_eq!(ProtocolError::Closed.to_string(), "Connection is closed");
        assert_eq!(
            ProtocolError::MaxAppmapDepth.to_string(),
            "max appmap depth 10 exceeded"
        );
    }

    #[test]
    fn test_snippet_caps_and_escapes() {
        assert_eq!(snippet(b"\r\n"), "\\r\\n");
        let long = vec![b'a'; 100];
        assert_eq!(snippet(&long).len(), 32);
    }

    #[test]
    fn test_empty_preamble_discrimination() {
        let error = Error::from(ProtocolError::EmptyPreamble);
        assert!(error.is_empty_preamble());
        assert!(error.is_protocol());

        let error = Error::from(FrameError::BadChunkTermination);
        assert!(!error.is_empty_preamble());
        assert!(error.is_frame());
    }
}

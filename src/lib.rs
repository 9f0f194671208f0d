//! Embedded HTTP/1.1 server and client library.
//!
//! The core is a wire-level message framing engine: byte-exact parsing and
//! rendering of requests and responses, a chunked transfer-encoding codec,
//! bounded-buffer socket I/O, and small state machines that keep a
//! connection's framing state from being corrupted by a partially-consumed
//! body. Sockets are consumed through the narrow [`io::Transport`]
//! capability; creating, binding and accepting them is the embedding
//! application's concern.

pub mod body;
pub mod client;
pub mod error;
pub mod io;
pub mod message;
pub mod parse;
pub mod range;
pub mod router;
pub mod server;

pub use body::{Body, BodyIter, BodyState, ChunkedBody, ChunkedBodyIter, InboundBody, OutboundBody};
pub use client::Connection;
pub use error::{BodyError, Error, FrameError, ProtocolError};
pub use io::{SocketWrapper, Transport};
pub use message::{HeaderValue, Headers, Method, Request, Response};
pub use range::{ContentRange, Range};
pub use router::{AppMap, Route, Router};
pub use server::{AppResponse, Credentials, Handler, HandlerFn, Session, handle_requests, handler_fn};

/// Largest value a content-length, range or content-range may carry.
pub const MAX_LENGTH: u64 = 9_999_999_999_999_999;

/// Upper bound on a single body read or chunk, in bytes.
pub const MAX_IO_SIZE: usize = 16 * 1024 * 1024;

/// Transfer size used when iterating a sized body.
pub const IO_SIZE: usize = 1024 * 1024;

/// Size of the per-connection scratch buffer, which also bounds the preamble.
pub const BUF_LEN: usize = 32 * 1024;

/// Maximum number of headers in one message.
pub const MAX_HEADER_COUNT: usize = 20;

/// Maximum length of one header line, in bytes.
pub const MAX_LINE_BYTES: usize = 4096;

/// Maximum length of a header name, in bytes.
pub const MAX_HEADER_NAME_BYTES: usize = 32;

/// Upper bound on [`Session`] `max_requests`.
pub const MAX_REQUESTS: usize = 75_000;

/// Default [`Session`] `max_requests`.
pub const DEFAULT_MAX_REQUESTS: usize = 500;

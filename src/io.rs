//! Bounded-buffer socket I/O.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};

use crate::body::{InboundBody, OutboundBody};
use crate::error::{Error, FrameError, ProtocolError, snippet};
use crate::message::{HeaderValue, Headers, Method, Request, Response};
use crate::parse;
use crate::BUF_LEN;

/// Narrow capability over a duplex byte stream.
///
/// The engine never creates, binds or accepts sockets; the embedding
/// application hands a connected endpoint in through this interface.
pub trait Transport {
    fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(self, buf)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Err(error) if error.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}

/// Buffered wrapper around a [`Transport`].
///
/// Holds one scratch buffer of [`BUF_LEN`] bytes, exclusively owned by this
/// wrapper; delimiter searches are bounded by it, which bounds both memory
/// and search time against slow or hostile peers.
pub struct SocketWrapper<T: Transport> {
    transport: T,
    buf: Box<[u8]>,
    start: usize,
    stop: usize,
    bytes_received: u64,
    bytes_sent: u64,
    closed: bool,
}

impl<T: Transport> SocketWrapper<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buf: vec![0u8; BUF_LEN].into_boxed_slice(),
            start: 0,
            stop: 0,
            bytes_received: 0,
            bytes_sent: 0,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shut the transport down. Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;

            if let Err(error) = self.transport.shutdown() {
                tracing::trace!(%error, "transport shutdown failed");
            }
        }
    }

    fn buffered_len(&self) -> usize {
        self.stop - self.start
    }

    /// Read until `delimiter` appears within the first `size` buffered
    /// bytes, returning the bytes before it and advancing past it.
    ///
    /// `Ok(None)` reports a clean end-of-stream with nothing pending.
    /// When the search window fills unmatched the call fails, bounding the
    /// cost a peer can impose by dribbling bytes.
    pub fn read_until(&mut self, size: usize, delimiter: &[u8]) -> Result<Option<&[u8]>, Error> {
        assert!(!delimiter.is_empty());
        assert!((2..=BUF_LEN).contains(&size));
        assert!(size >= delimiter.len());

        loop {
            let window_len = self.buffered_len().min(size);
            let found = parse::find(&self.buf[self.start..self.start + window_len], delimiter);

            if let Some(index) = found {
                let begin = self.start;
                self.start += index + delimiter.len();

                if self.start == self.stop {
                    self.start = 0;
                    self.stop = 0;
                }

                return Ok(Some(&self.buf[begin..begin + index]));
            }

            if self.buffered_len() >= size {
                return Err(FrameError::DelimiterNotFound {
                    delimiter: delimiter.escape_ascii().to_string(),
                    snippet: snippet(&self.buf[self.start..self.start + size]),
                }
                .into());
            }

            if self.stop == self.buf.len() {
                self.buf.copy_within(self.start..self.stop, 0);
                self.stop -= self.start;
                self.start = 0;
            }

            let count = self.transport.recv_into(&mut self.buf[self.stop..])?;

            if count == 0 {
                if self.buffered_len() == 0 {
                    return Ok(None);
                }

                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }

            self.bytes_received += count as u64;
            self.stop += count;
            tracing::trace!(count, pending = self.buffered_len(), "fill buffer");
        }
    }

    /// Read into `out`, draining scratch-buffered bytes before touching the
    /// transport. Returns 0 only at end-of-stream.
    pub fn read_into(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if self.buffered_len() > 0 {
            let count = self.buffered_len().min(out.len());
            out[..count].copy_from_slice(&self.buf[self.start..self.start + count]);
            self.start += count;

            if self.start == self.stop {
                self.start = 0;
                self.stop = 0;
            }

            return Ok(count);
        }

        let count = self.transport.recv_into(out)?;
        self.bytes_received += count as u64;
        Ok(count)
    }

    /// Fill `out` completely, or stop short at end-of-stream. Returns the
    /// number of bytes read.
    pub fn read_full(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;

        while filled < out.len() {
            let count = self.read_into(&mut out[filled..])?;

            if count == 0 {
                break;
            }

            filled += count;
        }

        Ok(filled)
    }

    /// Read one request preamble and bind its body (if any) to this wrapper.
    pub fn read_request(&mut self) -> Result<Request<'_, T>, Error> {
        let parts = {
            let preamble = match self.read_until(BUF_LEN, b"\r\n\r\n")? {
                Some(preamble) => preamble,
                None => return Err(ProtocolError::EmptyPreamble.into()),
            };

            parse::parse_request(preamble)?
        };

        tracing::debug!(method = %parts.method, uri = %parts.uri, "read request");

        let body = parts.body.map(|plan| InboundBody::from_plan(plan, self));

        Ok(Request {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            mount: parts.mount,
            path: parts.path,
            query: parts.query,
        })
    }

    /// Read one response preamble into owned parts, leaving body binding to
    /// the caller.
    pub(crate) fn read_response_parts(&mut self, method: Method) -> Result<parse::ResponseParts, Error> {
        let preamble = match self.read_until(BUF_LEN, b"\r\n\r\n")? {
            Some(preamble) => preamble,
            None => return Err(ProtocolError::EmptyPreamble.into()),
        };

        let parts = parse::parse_response(method, preamble)?;
        tracing::debug!(status = parts.status, "read response");
        Ok(parts)
    }

    /// Read one response preamble and bind its body (if any) to this
    /// wrapper. No body is constructed for a HEAD exchange.
    pub fn read_response(&mut self, method: Method) -> Result<Response<'_, T>, Error> {
        let parts = self.read_response_parts(method)?;

        let body = parts.body.map(|plan| InboundBody::from_plan(plan, self));

        Ok(Response {
            status: parts.status,
            reason: parts.reason,
            headers: parts.headers,
            body,
        })
    }

    fn send_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let count = self.transport.send(data)?;

            if count == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero));
            }

            self.bytes_sent += count as u64;
            data = &data[count..];
        }

        Ok(())
    }

    /// Render and send a request, streaming `body` after the preamble.
    ///
    /// The framing header (content-length or transfer-encoding) is derived
    /// from `body` and inserted into the caller's `headers`; a conflicting
    /// caller-supplied value is a hard error. Returns total bytes written.
    pub fn write_request(
        &mut self,
        method: Method,
        uri: &str,
        headers: &mut Headers,
        body: Option<&mut OutboundBody>,
    ) -> Result<u64, Error> {
        if !uri.starts_with('/') || !uri.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(FrameError::BadUri(snippet(uri.as_bytes())).into());
        }

        set_framing_headers(headers, body.as_deref())?;

        let mut preamble = Vec::with_capacity(256);
        preamble.extend_from_slice(method.as_str().as_bytes());
        preamble.push(b' ');
        preamble.extend_from_slice(uri.as_bytes());
        preamble.extend_from_slice(b" HTTP/1.1\r\n");
        headers.serialize(&mut preamble)?;

        self.send_all(&preamble)?;

        let mut total = preamble.len() as u64;

        if let Some(outbound) = body {
            total += outbound.write_to(self)?;
        }

        tracing::debug!(method = %method, uri, total, "request sent");

        Ok(total)
    }

    /// Render and send a response. Same framing-header contract as
    /// [`Self::write_request`].
    pub fn write_response(
        &mut self,
        status: u16,
        reason: &str,
        headers: &mut Headers,
        body: Option<&mut OutboundBody>,
    ) -> Result<u64, Error> {
        if !(100..=599).contains(&status) {
            return Err(ProtocolError::StatusOutOfRange(status).into());
        }

        if !reason.bytes().all(parse::is_value_byte) {
            return Err(FrameError::BadReason(snippet(reason.as_bytes())).into());
        }

        set_framing_headers(headers, body.as_deref())?;

        let mut preamble = Vec::with_capacity(256);
        preamble.extend_from_slice(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());
        headers.serialize(&mut preamble)?;

        self.send_all(&preamble)?;

        let mut total = preamble.len() as u64;

        if let Some(outbound) = body {
            total += outbound.write_to(self)?;
        }

        tracing::debug!(status, total, "response sent");

        Ok(total)
    }
}

impl<T: Transport> Write for SocketWrapper<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = self.transport.send(buf)?;
        self.bytes_sent += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Derive the framing header from the body argument, or validate the one the
/// caller supplied.
fn set_framing_headers(headers: &mut Headers, body: Option<&OutboundBody>) -> Result<(), Error> {
    match body {
        None => {
            if headers.contains("content-length") {
                return Err(ProtocolError::HeaderWithoutBody("content-length").into());
            }

            if headers.contains("transfer-encoding") {
                return Err(ProtocolError::HeaderWithoutBody("transfer-encoding").into());
            }
        }
        Some(outbound) => match outbound.content_length() {
            Some(length) => {
                if headers.contains("transfer-encoding") {
                    return Err(ProtocolError::TransferEncodingWithSizedBody.into());
                }

                match headers.get("content-length") {
                    None => {
                        headers.insert("content-length", length);
                    }
                    Some(HeaderValue::ContentLength(n)) if *n == length => {}
                    Some(value) => {
                        return Err(ProtocolError::ContentLengthMismatch {
                            header: value.to_string(),
                            body: length,
                        }
                        .into());
                    }
                }
            }
            None => {
                if headers.contains("content-length") {
                    return Err(ProtocolError::ContentLengthWithChunkedBody.into());
                }

                match headers.get("transfer-encoding") {
                    None => {
                        headers.insert("transfer-encoding", HeaderValue::Chunked);
                    }
                    Some(HeaderValue::Chunked) => {}
                    Some(value) => {
                        return Err(FrameError::BadTransferEncoding(snippet(
                            value.to_string().as_bytes(),
                        ))
                        .into());
                    }
                }
            }
        },
    }

    Ok(())
}

//! Message bodies with an explicit lifecycle.
//!
//! Every variant moves READY → STARTED → CONSUMED, or to ERROR from any
//! state on the first failure. Terminal states are sticky: draining exactly
//! once is a structural guarantee, not caller discipline. Inbound bodies
//! borrow the connection's [`SocketWrapper`] mutably, so a new exchange
//! cannot start while one is alive; their final state stays observable
//! through a shared handle after they are gone.

use std::cell::Cell;
use std::fmt::Display;
use std::io::{self, Write};
use std::rc::Rc;

use crate::error::{BodyError, Error, FrameError};
use crate::io::{SocketWrapper, Transport};
use crate::parse::{self, BodyPlan};
use crate::{IO_SIZE, MAX_IO_SIZE, MAX_LINE_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    Ready,
    Started,
    Consumed,
    Error,
}

impl Display for BodyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Ready => "ready",
            Self::Started => "started",
            Self::Consumed => "consumed",
            Self::Error => "error",
        };

        f.write_str(value)
    }
}

fn write_chunk<W: Write>(
    w: &mut W,
    extension: Option<&(String, String)>,
    data: &[u8],
) -> Result<u64, Error> {
    if data.len() > MAX_IO_SIZE {
        return Err(FrameError::ChunkSizeTooBig(data.len() as u64).into());
    }

    let head = match extension {
        Some((key, value)) => format!("{:x};{}={}\r\n", data.len(), key, value),
        None => format!("{:x}\r\n", data.len()),
    };

    w.write_all(head.as_bytes())?;
    w.write_all(data)?;
    w.write_all(b"\r\n")?;

    Ok((head.len() + data.len() + 2) as u64)
}

/// A content-length framed inbound body.
pub struct Body<'a, T: Transport> {
    sock: &'a mut SocketWrapper<T>,
    state: Rc<Cell<BodyState>>,
    content_length: u64,
    received: u64,
}

impl<'a, T: Transport> Body<'a, T> {
    pub(crate) fn new(sock: &'a mut SocketWrapper<T>, content_length: u64) -> Self {
        Self {
            sock,
            state: Rc::new(Cell::new(BodyState::Ready)),
            content_length,
            received: 0,
        }
    }

    pub fn state(&self) -> BodyState {
        self.state.get()
    }

    pub(crate) fn state_handle(&self) -> Rc<Cell<BodyState>> {
        Rc::clone(&self.state)
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    fn ensure_usable(&self) -> Result<(), Error> {
        match self.state.get() {
            BodyState::Ready | BodyState::Started => Ok(()),
            state => Err(BodyError::Unusable(state).into()),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        self.state.set(BodyState::Error);
        self.sock.close();
        error
    }

    /// Read up to `size` bytes, or everything left when `size` is `None`.
    ///
    /// A single call never moves more than [`MAX_IO_SIZE`] bytes. A short
    /// read means the peer broke its content-length promise: the body moves
    /// to ERROR and the socket is closed.
    pub fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>, Error> {
        self.ensure_usable()?;

        let remaining = self.content_length - self.received;

        let want: u64 = match size {
            Some(n) => {
                if n > MAX_IO_SIZE {
                    return Err(self.fail(BodyError::OverMaxRead(n as u64).into()));
                }
                (n as u64).min(remaining)
            }
            None => {
                if remaining > MAX_IO_SIZE as u64 {
                    return Err(self.fail(BodyError::OverMaxRead(remaining).into()));
                }
                remaining
            }
        };

        self.state.set(BodyState::Started);

        if want == 0 {
            if remaining == 0 {
                self.state.set(BodyState::Consumed);
            }
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; want as usize];

        let received = match self.sock.read_full(&mut buf) {
            Ok(count) => count as u64,
            Err(error) => return Err(self.fail(error.into())),
        };

        if received < want {
            return Err(self.fail(BodyError::ShortRead { expected: want, received }.into()));
        }

        self.received += want;

        if self.received == self.content_length {
            tracing::trace!(self.content_length, "body consumed");
            self.state.set(BodyState::Consumed);
        }

        Ok(buf)
    }

    /// Drain the rest of the body into `w`, returning the bytes moved.
    pub fn write_to<W: Write>(&mut self, w: &mut W) -> Result<u64, Error> {
        let mut total = 0u64;

        loop {
            let data = self.read(Some(IO_SIZE))?;

            if !data.is_empty() {
                if let Err(error) = w.write_all(&data) {
                    return Err(self.fail(error.into()));
                }
                total += data.len() as u64;
            }

            if self.state.get() == BodyState::Consumed {
                break;
            }
        }

        if let Err(error) = w.flush() {
            return Err(self.fail(error.into()));
        }

        Ok(total)
    }
}

impl<T: Transport> Iterator for Body<'_, T> {
    type Item = Result<Vec<u8>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state.get() == BodyState::Consumed {
            return None;
        }

        match self.read(Some(IO_SIZE)) {
            Ok(data) if data.is_empty() => None,
            Ok(data) => Some(Ok(data)),
            Err(error) => Some(Err(error)),
        }
    }
}

/// A chunked-transfer-encoded inbound body.
pub struct ChunkedBody<'a, T: Transport> {
    sock: &'a mut SocketWrapper<T>,
    state: Rc<Cell<BodyState>>,
}

impl<'a, T: Transport> ChunkedBody<'a, T> {
    pub(crate) fn new(sock: &'a mut SocketWrapper<T>) -> Self {
        Self {
            sock,
            state: Rc::new(Cell::new(BodyState::Ready)),
        }
    }

    pub fn state(&self) -> BodyState {
        self.state.get()
    }

    pub(crate) fn state_handle(&self) -> Rc<Cell<BodyState>> {
        Rc::clone(&self.state)
    }

    fn ensure_usable(&self) -> Result<(), Error> {
        match self.state.get() {
            BodyState::Ready | BodyState::Started => Ok(()),
            state => Err(BodyError::Unusable(state).into()),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        self.state.set(BodyState::Error);
        self.sock.close();
        error
    }

    /// Read one `SIZE[;key=value]\r\nDATA\r\n` unit.
    ///
    /// The zero-size chunk is terminal; no further reads are allowed after
    /// it.
    pub fn readchunk(&mut self) -> Result<(Option<(String, String)>, Vec<u8>), Error> {
        self.ensure_usable()?;
        self.state.set(BodyState::Started);

        let line = {
            let result = self.sock.read_until(MAX_LINE_BYTES, b"\r\n");
            match result {
                Ok(Some(line)) => Ok(line.to_vec()),
                Ok(None) => Err(Error::from(io::Error::from(io::ErrorKind::UnexpectedEof))),
                Err(error) => Err(error),
            }
        };

        let line = match line {
            Ok(line) => line,
            Err(error) => return Err(self.fail(error)),
        };

        let (size_bytes, extension_bytes) = match line.iter().position(|&b| b == b';') {
            Some(i) => (&line[..i], Some(&line[i + 1..])),
            None => (&line[..], None),
        };

        let size = match parse::parse_chunk_size(size_bytes) {
            Ok(size) => size as usize,
            Err(error) => return Err(self.fail(error.into())),
        };

        let extension = match extension_bytes {
            Some(bytes) => match parse::parse_chunk_extension(bytes) {
                Ok(pair) => Some(pair),
                Err(error) => return Err(self.fail(error.into())),
            },
            None => None,
        };

        // chunk data and its trailing CRLF in one read
        let mut buf = vec![0u8; size + 2];

        let received = match self.sock.read_full(&mut buf) {
            Ok(count) => count as u64,
            Err(error) => return Err(self.fail(error.into())),
        };

        if received < buf.len() as u64 {
            let expected = buf.len() as u64;
            return Err(self.fail(BodyError::ShortRead { expected, received }.into()));
        }

        if buf[size..] != *b"\r\n" {
            return Err(self.fail(FrameError::BadChunkTermination.into()));
        }

        buf.truncate(size);

        if size == 0 {
            tracing::trace!("chunked body consumed");
            self.state.set(BodyState::Consumed);
        }

        Ok((extension, buf))
    }

    pub(crate) fn read_all(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();

        loop {
            let (_extension, data) = self.readchunk()?;

            if data.is_empty() {
                return Ok(out);
            }

            if out.len() + data.len() > MAX_IO_SIZE {
                let total = (out.len() + data.len()) as u64;
                return Err(self.fail(BodyError::OverMaxRead(total).into()));
            }

            out.extend_from_slice(&data);
        }
    }

    /// Drain the body into `w` preserving the chunked framing, terminal
    /// chunk included. Returns the bytes written.
    pub fn write_to<W: Write>(&mut self, w: &mut W) -> Result<u64, Error> {
        let mut total = 0u64;

        loop {
            let (extension, data) = self.readchunk()?;

            total += match write_chunk(w, extension.as_ref(), &data) {
                Ok(count) => count,
                Err(error) => return Err(self.fail(error)),
            };

            if data.is_empty() {
                if let Err(error) = w.flush() {
                    return Err(self.fail(error.into()));
                }
                return Ok(total);
            }
        }
    }
}

impl<T: Transport> Iterator for ChunkedBody<'_, T> {
    type Item = Result<(Option<(String, String)>, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state.get() == BodyState::Consumed {
            return None;
        }

        Some(self.readchunk())
    }
}

/// Closed variant over the two inbound framings.
pub enum InboundBody<'a, T: Transport> {
    Sized(Body<'a, T>),
    Chunked(ChunkedBody<'a, T>),
}

impl<'a, T: Transport> InboundBody<'a, T> {
    pub(crate) fn from_plan(plan: BodyPlan, sock: &'a mut SocketWrapper<T>) -> Self {
        match plan {
            BodyPlan::Sized(length) => Self::Sized(Body::new(sock, length)),
            BodyPlan::Chunked => Self::Chunked(ChunkedBody::new(sock)),
        }
    }

    pub fn state(&self) -> BodyState {
        match self {
            Self::Sized(body) => body.state(),
            Self::Chunked(body) => body.state(),
        }
    }

    pub(crate) fn state_handle(&self) -> Rc<Cell<BodyState>> {
        match self {
            Self::Sized(body) => body.state_handle(),
            Self::Chunked(body) => body.state_handle(),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked(..))
    }

    pub fn as_sized(&mut self) -> Option<&mut Body<'a, T>> {
        if let Self::Sized(v) = self { Some(v) } else { None }
    }

    pub fn as_chunked(&mut self) -> Option<&mut ChunkedBody<'a, T>> {
        if let Self::Chunked(v) = self { Some(v) } else { None }
    }

    /// Drain the whole body into memory, bounded by [`MAX_IO_SIZE`].
    pub fn read_all(&mut self) -> Result<Vec<u8>, Error> {
        match self {
            Self::Sized(body) => body.read(None),
            Self::Chunked(body) => body.read_all(),
        }
    }

    pub fn write_to<W: Write>(&mut self, w: &mut W) -> Result<u64, Error> {
        match self {
            Self::Sized(body) => body.write_to(w),
            Self::Chunked(body) => body.write_to(w),
        }
    }
}

/// An outbound body framed by content-length, fed from an ordered sequence
/// of byte strings.
#[derive(Debug, Clone)]
pub struct BodyIter {
    parts: Vec<Vec<u8>>,
    content_length: u64,
    state: BodyState,
}

impl BodyIter {
    pub fn new(parts: Vec<Vec<u8>>, content_length: u64) -> Self {
        Self {
            parts,
            content_length,
            state: BodyState::Ready,
        }
    }

    pub fn state(&self) -> BodyState {
        self.state
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Write every element, enforcing that the total matches the declared
    /// content-length exactly.
    pub fn write_to<W: Write>(&mut self, w: &mut W) -> Result<u64, Error> {
        if self.state != BodyState::Ready {
            return Err(BodyError::Unusable(self.state).into());
        }

        self.state = BodyState::Started;

        let mut sent = 0u64;

        for part in &self.parts {
            sent += part.len() as u64;

            if sent > self.content_length {
                self.state = BodyState::Error;
                return Err(BodyError::Exceeds {
                    sent,
                    content_length: self.content_length,
                }
                .into());
            }

            if let Err(error) = w.write_all(part) {
                self.state = BodyState::Error;
                return Err(error.into());
            }
        }

        if sent < self.content_length {
            self.state = BodyState::Error;
            return Err(BodyError::Deceeds {
                sent,
                content_length: self.content_length,
            }
            .into());
        }

        if let Err(error) = w.flush() {
            self.state = BodyState::Error;
            return Err(error.into());
        }

        self.state = BodyState::Consumed;

        Ok(sent)
    }
}

/// An outbound chunk-framed body fed from an ordered `(extension, data)`
/// sequence whose final element must carry empty data.
#[derive(Debug, Clone)]
pub struct ChunkedBodyIter {
    parts: Vec<(Option<(String, String)>, Vec<u8>)>,
    state: BodyState,
}

impl ChunkedBodyIter {
    pub fn new(parts: Vec<(Option<(String, String)>, Vec<u8>)>) -> Self {
        Self {
            parts,
            state: BodyState::Ready,
        }
    }

    pub fn state(&self) -> BodyState {
        self.state
    }

    pub fn write_to<W: Write>(&mut self, w: &mut W) -> Result<u64, Error> {
        if self.state != BodyState::Ready {
            return Err(BodyError::Unusable(self.state).into());
        }

        self.state = BodyState::Started;

        let mut total = 0u64;
        let mut finished = false;

        for (extension, data) in &self.parts {
            if finished {
                self.state = BodyState::Error;
                return Err(BodyError::ChunkAfterFinal.into());
            }

            total += match write_chunk(w, extension.as_ref(), data) {
                Ok(count) => count,
                Err(error) => {
                    self.state = BodyState::Error;
                    return Err(error);
                }
            };

            if data.is_empty() {
                finished = true;
            }
        }

        if !finished {
            self.state = BodyState::Error;
            return Err(BodyError::FinalChunkNotEmpty.into());
        }

        if let Err(error) = w.flush() {
            self.state = BodyState::Error;
            return Err(error.into());
        }

        self.state = BodyState::Consumed;

        Ok(total)
    }
}

/// Closed variant over everything a caller can hand to the write path.
#[derive(Debug, Clone)]
pub enum OutboundBody {
    Bytes(Vec<u8>),
    Sized(BodyIter),
    Chunked(ChunkedBodyIter),
}

impl OutboundBody {
    /// Declared length, `None` for chunked framing.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::Bytes(data) => Some(data.len() as u64),
            Self::Sized(iter) => Some(iter.content_length()),
            Self::Chunked(..) => None,
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked(..))
    }

    pub fn write_to<W: Write>(&mut self, w: &mut W) -> Result<u64, Error> {
        match self {
            Self::Bytes(data) => {
                w.write_all(data)?;
                w.flush()?;
                Ok(data.len() as u64)
            }
            Self::Sized(iter) => iter.write_to(w),
            Self::Chunked(iter) => iter.write_to(w),
        }
    }
}

impl From<Vec<u8>> for OutboundBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for OutboundBody {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<&str> for OutboundBody {
    fn from(value: &str) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for OutboundBody {
    fn from(value: String) -> Self {
        Self::Bytes(value.into_bytes())
    }
}

impl From<BodyIter> for OutboundBody {
    fn from(value: BodyIter) -> Self {
        Self::Sized(value)
    }
}

impl From<ChunkedBodyIter> for OutboundBody {
    fn from(value: ChunkedBodyIter) -> Self {
        Self::Chunked(value)
    }
}

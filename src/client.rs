//! Client-side connection orchestration.

use std::cell::Cell;
use std::rc::Rc;

use crate::body::{BodyState, InboundBody, OutboundBody};
use crate::error::{Error, ProtocolError};
use crate::io::{SocketWrapper, Transport};
use crate::message::{Headers, Method, Response};
use crate::range::Range;

/// One-at-a-time request/response orchestration over a single transport.
///
/// The returned [`Response`] mutably borrows the connection, so a new
/// exchange cannot even be issued while one is alive. Once the response is
/// gone, the body's final state is checked through a shared handle: anything
/// but CONSUMED means the framing position of the stream is unknown, and the
/// connection closes for good rather than attempt to resynchronize.
pub struct Connection<T: Transport> {
    sock: SocketWrapper<T>,
    base_headers: Headers,
    last_body_state: Option<Rc<Cell<BodyState>>>,
    closed: bool,
}

impl<T: Transport> Connection<T> {
    /// Wrap a connected transport. `base_headers` (e.g. host) are layered
    /// under every request's headers.
    pub fn new(transport: T, base_headers: Headers) -> Self {
        Self {
            sock: SocketWrapper::new(transport),
            base_headers,
            last_body_state: None,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &SocketWrapper<T> {
        &self.sock
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.sock.is_closed()
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.sock.close();
    }

    fn check_previous_body(&mut self) -> Result<(), Error> {
        if let Some(state) = self.last_body_state.take() {
            if state.get() != BodyState::Consumed {
                return Err(ProtocolError::UnconsumedResponseBody.into());
            }
        }

        Ok(())
    }

    /// Layer base headers under the caller's: set if absent, no-op if
    /// equal, hard error if conflicting.
    fn merge_base_headers(&self, headers: &mut Headers) -> Result<(), Error> {
        for (name, value) in self.base_headers.iter() {
            let absent = match headers.get(name) {
                None => true,
                Some(existing) if existing == value => false,
                Some(_) => {
                    return Err(ProtocolError::ConflictingHeader(name.to_owned()).into());
                }
            };

            if absent {
                headers.insert(name, value.clone());
            }
        }

        Ok(())
    }

    fn begin(
        &mut self,
        method: Method,
        headers: &mut Headers,
        body: Option<&OutboundBody>,
    ) -> Result<(), Error> {
        self.check_previous_body()?;

        if body.is_some() && !method.allows_body() {
            return Err(ProtocolError::BodyNotAllowed(method.as_str()).into());
        }

        self.merge_base_headers(headers)?;

        Ok(())
    }

    /// Issue one request and read its response.
    ///
    /// Any failure, from argument validation to transport errors, closes
    /// the connection permanently; later calls fail fast with
    /// "Connection is closed" without touching the socket.
    pub fn request(
        &mut self,
        method: Method,
        uri: &str,
        mut headers: Headers,
        mut body: Option<OutboundBody>,
    ) -> Result<Response<'_, T>, Error> {
        if self.is_closed() {
            return Err(ProtocolError::Closed.into());
        }

        if let Err(error) = self.begin(method, &mut headers, body.as_ref()) {
            self.close();
            return Err(error);
        }

        if let Err(error) = self.sock.write_request(method, uri, &mut headers, body.as_mut()) {
            self.close();
            return Err(error);
        }

        let parts = match self.sock.read_response_parts(method) {
            Ok(parts) => parts,
            Err(error) => {
                self.close();
                return Err(error);
            }
        };

        let body = parts.body.map(|plan| InboundBody::from_plan(plan, &mut self.sock));
        self.last_body_state = body.as_ref().map(|b| b.state_handle());

        Ok(Response {
            status: parts.status,
            reason: parts.reason,
            headers: parts.headers,
            body,
        })
    }

    pub fn get(&mut self, uri: &str, headers: Headers) -> Result<Response<'_, T>, Error> {
        self.request(Method::Get, uri, headers, None)
    }

    pub fn head(&mut self, uri: &str, headers: Headers) -> Result<Response<'_, T>, Error> {
        self.request(Method::Head, uri, headers, None)
    }

    pub fn delete(&mut self, uri: &str, headers: Headers) -> Result<Response<'_, T>, Error> {
        self.request(Method::Delete, uri, headers, None)
    }

    pub fn put(
        &mut self,
        uri: &str,
        headers: Headers,
        body: OutboundBody,
    ) -> Result<Response<'_, T>, Error> {
        self.request(Method::Put, uri, headers, Some(body))
    }

    pub fn post(
        &mut self,
        uri: &str,
        headers: Headers,
        body: OutboundBody,
    ) -> Result<Response<'_, T>, Error> {
        self.request(Method::Post, uri, headers, Some(body))
    }

    /// GET with a `range` header for `[start, stop)`.
    pub fn get_range(
        &mut self,
        uri: &str,
        mut headers: Headers,
        start: u64,
        stop: u64,
    ) -> Result<Response<'_, T>, Error> {
        if headers.contains("range") {
            self.close();
            return Err(ProtocolError::ConflictingHeader("range".to_owned()).into());
        }

        let range = match Range::new(start, stop) {
            Ok(range) => range,
            Err(error) => {
                self.close();
                return Err(error.into());
            }
        };

        headers.insert("range", range);
        self.request(Method::Get, uri, headers, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testing::Script;

    fn base() -> Headers {
        let mut headers = Headers::new();
        headers.insert("host", "example.com");
        headers
    }

    #[test]
    fn test_request_response_exchange() {
        let script = Script::new(
            b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello\
              HTTP/1.1 404 Not Found\r\n\r\n",
        );
        let mut conn = Connection::new(script, base());

        let mut response = conn.get("/a", Headers::new()).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.body.as_mut().unwrap().read_all().unwrap(), b"hello");
        drop(response);

        // keep-alive: the connection is reusable once the body is consumed
        let response = conn.get("/b", Headers::new()).unwrap();
        assert_eq!(response.status, 404);
        assert!(response.body.is_none());
        drop(response);

        assert_eq!(
            conn.get_ref().get_ref().output,
            b"GET /a HTTP/1.1\r\nhost: example.com\r\n\r\n\
              GET /b HTTP/1.1\r\nhost: example.com\r\n\r\n"
        );
    }

    #[test]
    fn test_base_header_layering() {
        let mut conn = Connection::new(
            Script::new(b"HTTP/1.1 204 No Content\r\n\r\n"),
            base(),
        );

        // equal caller-supplied value is a no-op
        let mut headers = Headers::new();
        headers.insert("host", "example.com");
        assert_eq!(conn.get("/", headers).unwrap().status, 204);
        drop(conn);

        // conflicting value is a hard error and closes the connection
        let mut conn = Connection::new(Script::new(b""), base());
        let mut headers = Headers::new();
        headers.insert("host", "other.example");
        assert_eq!(
            conn.get("/", headers).unwrap_err().to_string(),
            "conflicting 'host' header"
        );
        assert!(conn.is_closed());
    }

    #[test]
    fn test_body_method_compatibility() {
        let mut conn = Connection::new(Script::new(b""), Headers::new());
        assert_eq!(
            conn.request(Method::Get, "/", Headers::new(), Some(OutboundBody::from("x")))
                .unwrap_err()
                .to_string(),
            "'GET' request with a body"
        );
        assert!(conn.is_closed());
    }

    #[test]
    fn test_unconsumed_body_invalidates_connection() {
        let script = Script::new(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello");
        let mut conn = Connection::new(script, Headers::new());

        let response = conn.get("/", Headers::new()).unwrap();
        assert!(response.body.is_some());
        drop(response); // body never consumed

        assert_eq!(
            conn.get("/", Headers::new()).unwrap_err().to_string(),
            "previous response body not consumed"
        );
        assert!(conn.is_closed());

        assert_eq!(
            conn.get("/", Headers::new()).unwrap_err().to_string(),
            "Connection is closed"
        );
    }

    #[test]
    fn test_closed_fast_fail_without_io() {
        let mut conn = Connection::new(Script::new(b"HTTP/1.1 200 OK\r\n\r\n"), Headers::new());
        conn.close();

        assert_eq!(
            conn.get("/", Headers::new()).unwrap_err().to_string(),
            "Connection is closed"
        );
        assert!(conn.get_ref().get_ref().output.is_empty());
    }

    #[test]
    fn test_get_range() {
        let script = Script::new(
            b"HTTP/1.1 206 Partial Content\r\ncontent-length: 10\r\ncontent-range: bytes 10-19/100\r\n\r\n0123456789",
        );
        let mut conn = Connection::new(script, Headers::new());

        let mut response = conn.get_range("/file", Headers::new(), 10, 20).unwrap();
        assert_eq!(response.status, 206);
        assert_eq!(
            response.headers.content_range(),
            Some(&crate::range::ContentRange::new(10, 20, 100).unwrap())
        );
        assert_eq!(response.body.as_mut().unwrap().read_all().unwrap(), b"0123456789");
        drop(response);

        assert_eq!(
            conn.get_ref().get_ref().output,
            b"GET /file HTTP/1.1\r\nrange: bytes=10-19\r\n\r\n"
        );
    }

    #[test]
    fn test_transport_failure_poisons_connection() {
        // stream ends before a full preamble arrives
        let mut conn = Connection::new(Script::new(b"HTTP/1.1 2"), Headers::new());

        assert!(conn.get("/", Headers::new()).is_err());
        assert!(conn.is_closed());
        assert_eq!(
            conn.get("/", Headers::new()).unwrap_err().to_string(),
            "Connection is closed"
        );
    }
}

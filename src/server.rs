//! Server-side session state and the request loop.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::body::{BodyState, OutboundBody};
use crate::error::{Error, ProtocolError};
use crate::io::{SocketWrapper, Transport};
use crate::message::{Headers, Method, Request};
use crate::{DEFAULT_MAX_REQUESTS, MAX_REQUESTS};

/// Peer credentials, for transports that can supply them (e.g. AF_UNIX).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

/// Per-connection server state.
///
/// The engine holds no process-wide mutable state; anything shared across
/// connections is the embedding application's concern, via `store`.
pub struct Session {
    address: SocketAddr,
    credentials: Option<Credentials>,
    max_requests: usize,
    requests: usize,
    /// Free-form per-connection storage for the application.
    pub store: HashMap<String, Box<dyn Any + Send>>,
    closed: bool,
    message: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("credentials", &self.credentials)
            .field("max_requests", &self.max_requests)
            .field("requests", &self.requests)
            .field("store", &self.store.keys())
            .field("closed", &self.closed)
            .field("message", &self.message)
            .finish()
    }
}

impl Session {
    pub fn new(
        address: SocketAddr,
        credentials: Option<Credentials>,
        max_requests: Option<usize>,
    ) -> Result<Self, Error> {
        let max_requests = max_requests.unwrap_or(DEFAULT_MAX_REQUESTS);

        if max_requests > MAX_REQUESTS {
            return Err(ProtocolError::MaxRequestsOutOfRange(max_requests).into());
        }

        Ok(Self {
            address,
            credentials,
            max_requests,
            requests: 0,
            store: HashMap::new(),
            closed: false,
            message: None,
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Requests served so far on this connection.
    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Why the request loop stopped, once it has.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// What a handler returns: status, reason, headers and an optional body.
pub type AppResponse = (u16, String, Headers, Option<OutboundBody>);

/// The application callback boundary.
pub trait Handler<T: Transport> {
    fn handle(
        &self,
        session: &mut Session,
        request: &mut Request<'_, T>,
    ) -> Result<AppResponse, Error>;
}

/// Adapter turning a plain function or closure into a [`Handler`].
pub struct HandlerFn<F>(F);

/// Wrap a function of `(&mut Session, &mut Request) -> AppResponse`.
pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn(f)
}

impl<T, F> Handler<T> for HandlerFn<F>
where
    T: Transport,
    F: Fn(&mut Session, &mut Request<'_, T>) -> Result<AppResponse, Error>,
{
    fn handle(
        &self,
        session: &mut Session,
        request: &mut Request<'_, T>,
    ) -> Result<AppResponse, Error> {
        (self.0)(session, request)
    }
}

/// Serve requests on one connection until a stop condition or failure.
///
/// The socket is always closed on exit, success or failure, and
/// `session.message` records why the loop stopped.
pub fn handle_requests<T, H>(
    app: &H,
    session: &mut Session,
    mut sock: SocketWrapper<T>,
) -> Result<(), Error>
where
    T: Transport,
    H: Handler<T>,
{
    let result = run_loop(app, session, &mut sock);
    sock.close();
    session.closed = true;

    match &result {
        Ok(()) => {
            tracing::info!(
                requests = session.requests,
                message = session.message.as_deref(),
                "connection done"
            );
        }
        Err(error) => {
            session.message = Some(error.to_string());
            tracing::warn!(requests = session.requests, error = %error, "connection failed");
        }
    }

    result
}

fn run_loop<T, H>(
    app: &H,
    session: &mut Session,
    sock: &mut SocketWrapper<T>,
) -> Result<(), Error>
where
    T: Transport,
    H: Handler<T>,
{
    loop {
        let mut request = match sock.read_request() {
            Ok(request) => request,
            Err(error) if error.is_empty_preamble() => {
                // peer hung up between exchanges
                session.message = Some("empty preamble".to_owned());
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        let method = request.method;
        let body_state = request.body.as_ref().map(|body| body.state_handle());

        let (status, reason, mut headers, mut body) = app.handle(session, &mut request)?;

        drop(request);

        if !(100..=599).contains(&status) {
            return Err(ProtocolError::StatusOutOfRange(status).into());
        }

        if let Some(state) = body_state {
            if state.get() != BodyState::Consumed {
                return Err(ProtocolError::RequestBodyNotConsumed(state.get()).into());
            }
        }

        if method == Method::Head && body.is_some() {
            return Err(ProtocolError::HeadResponseWithBody.into());
        }

        sock.write_response(status, &reason, &mut headers, body.as_mut())?;

        session.requests += 1;

        if session.requests >= session.max_requests {
            session.message = Some("max_requests".to_owned());
            return Ok(());
        }

        // 404/409/412 are ordinary application outcomes; any other >= 400
        // status may mean inconsistent state, so the connection is torn
        // down instead of reused.
        if status >= 400 && !matches!(status, 404 | 409 | 412) {
            session.message = Some(format!("{status} {reason}"));
            return Ok(());
        }
    }
}

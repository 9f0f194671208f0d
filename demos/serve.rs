//! Minimal embedding: a TCP accept loop in front of the request loop.
//!
//! Socket setup stays on this side of the boundary; the engine only ever
//! sees the connected stream.
use std::net::{TcpListener, TcpStream};
use std::thread;

use h1kit::{
    AppMap, AppResponse, Error, Headers, OutboundBody, Request, Route, Router, Session,
    SocketWrapper, handle_requests, handler_fn,
};

fn hello(
    _session: &mut Session,
    request: &mut Request<'_, TcpStream>,
) -> Result<AppResponse, Error> {
    let body = OutboundBody::from(format!("hello from {}\n", request.uri));
    Ok((200, "OK".to_owned(), Headers::new(), Some(body)))
}

fn main() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:8080")?;
    eprintln!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept()?;

        thread::spawn(move || {
            let mut appmap: AppMap<TcpStream> = AppMap::new();
            appmap.insert(Some(String::new()), Route::handler(handler_fn(hello)));
            appmap.insert(None, Route::handler(handler_fn(hello)));
            let router = Router::new(appmap);

            let mut session = match Session::new(peer, None, None) {
                Ok(session) => session,
                Err(error) => {
                    eprintln!("{peer}: {error}");
                    return;
                }
            };

            if let Err(error) = handle_requests(&router, &mut session, SocketWrapper::new(stream)) {
                eprintln!("{peer}: {error}");
            }
        });
    }
}

//! Bounded-depth path-segment dispatch.

use std::collections::HashMap;

use crate::error::{Error, ProtocolError};
use crate::io::Transport;
use crate::message::{Headers, Request};
use crate::server::{AppResponse, Handler, Session};

/// Nesting bound; also stops an accidentally looping appmap.
pub const MAX_APPMAP_DEPTH: usize = 10;

/// Routing table. `Some(segment)` matches a shifted path segment exactly;
/// `Some("")` is the index key, consulted when the path is exhausted;
/// `None` is the default.
pub type AppMap<T> = HashMap<Option<String>, Route<T>>;

pub enum Route<T: Transport> {
    Handler(Box<dyn Handler<T>>),
    Map(AppMap<T>),
}

impl<T: Transport> Route<T> {
    pub fn handler(handler: impl Handler<T> + 'static) -> Self {
        Self::Handler(Box::new(handler))
    }

    pub fn map(map: AppMap<T>) -> Self {
        Self::Map(map)
    }
}

/// Path-segment dispatcher over a (possibly nested) appmap.
///
/// A missing route is a normal outcome, answered with
/// `(410, "Gone", {}, None)` rather than a failure.
pub struct Router<T: Transport> {
    appmap: AppMap<T>,
}

impl<T: Transport> Router<T> {
    pub fn new(appmap: AppMap<T>) -> Self {
        Self { appmap }
    }
}

impl<T: Transport> Handler<T> for Router<T> {
    fn handle(
        &self,
        session: &mut Session,
        request: &mut Request<'_, T>,
    ) -> Result<AppResponse, Error> {
        let mut map = &self.appmap;

        for _ in 0..MAX_APPMAP_DEPTH {
            let key = request.shift_path().map(str::to_owned);

            let target = match &key {
                Some(_) => map.get(&key).or_else(|| map.get(&None)),
                None => map.get(&Some(String::new())).or_else(|| map.get(&None)),
            };

            match target {
                Some(Route::Handler(handler)) => return handler.handle(session, request),
                Some(Route::Map(inner)) => map = inner,
                None => {
                    tracing::debug!(uri = %request.uri, "no route");
                    return Ok((410, "Gone".to_owned(), Headers::new(), None));
                }
            }
        }

        Err(ProtocolError::MaxAppmapDepth.into())
    }
}

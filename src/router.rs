//! Radix-tree route table.
//!
//! One tree per HTTP method, filled by the [`Registrar`](crate::Registrar).
//! Lookup is O(path-length); a miss is a plain `404`.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::context::Context;
use crate::error::{ApiError, BuildError};
use crate::request::Request;
use crate::response::Response;
use crate::route::{Route, RouteInfo};

type Params = HashMap<String, String>;

/// The application route table.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve)
/// or drive it directly with [`Router::handle`].
#[derive(Clone, Default)]
pub struct Router {
    trees: HashMap<http::Method, MatchitRouter<Arc<Route>>>,
    routes: Vec<Arc<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiled route. Two routes for the same method and an
    /// overlapping path conflict.
    pub fn insert(&mut self, route: Route) -> Result<(), BuildError> {
        let route = Arc::new(route);
        self.trees
            .entry(route.method().to_http())
            .or_default()
            .insert(route.path(), Arc::clone(&route))
            .map_err(|e| BuildError::Conflict {
                method: route.method().to_string(),
                path: route.path().to_owned(),
                message: e.to_string(),
            })?;
        self.routes.push(route);
        Ok(())
    }

    /// Every registered route, in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &RouteInfo> {
        self.routes.iter().map(|r| r.info())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the route for `path` and percent-decodes its parameters. A
    /// segment that does not decode to UTF-8 is a path parameter error.
    pub(crate) fn lookup(&self, method: &http::Method, path: &str) -> Option<(Arc<Route>, Result<Params, ApiError>)> {
        let tree = self.trees.get(method)?;
        let matched = tree.at(path).ok()?;
        let route = Arc::clone(matched.value);
        let params: Result<Params, ApiError> = matched
            .params
            .iter()
            .map(|(k, v)| {
                percent_decode_str(v)
                    .decode_utf8()
                    .map(|value| (k.to_owned(), value.into_owned()))
                    .map_err(|e| ApiError::path_parameter(k, e))
            })
            .collect();
        Some((route, params))
    }

    /// Serves one buffered request with a fresh [`Context`].
    pub async fn handle(&self, req: http::Request<Bytes>) -> Response {
        self.handle_with(req, Context::new()).await
    }

    pub(crate) async fn handle_with(&self, req: http::Request<Bytes>, ctx: Context) -> Response {
        match self.lookup(req.method(), req.uri().path()) {
            Some((route, Ok(params))) => route.dispatch(Request::new(req, params), ctx).await,
            Some((route, Err(err))) => route.reject(err),
            None => {
                debug!(method = %req.method(), path = req.uri().path(), "no route");
                Response::status(StatusCode::NOT_FOUND)
            }
        }
    }
}

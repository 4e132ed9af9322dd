//! # restbind
//!
//! Declarative endpoint binding on top of a minimal hyper server.
//!
//! A handler is an async function or method. Its input is a plain struct (a
//! *metadata record*) whose fields carry directives saying where each value
//! comes from: the path, the query string, a header, or the body. Routes are
//! compiled once at startup; each request then binds a fresh record, calls
//! the handler, and renders whatever it returned.
//!
//! ## The contract
//!
//! A reverse proxy in front handles TLS, rate limiting, and body-size limits.
//! restbind does the part that changes between applications:
//!
//! - **Binding**: `path`, `query`, `header` and `body` directives, plus any
//!   you add to the [`registry`].
//! - **Routing**: radix-tree lookup via [`matchit`], nested groups with path
//!   prefixes.
//! - **Rendering**: JSON by default; values and errors can render themselves.
//! - **Graceful shutdown**: SIGTERM / Ctrl-C, drains in-flight requests.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use restbind::{Api, ApiBuilder, ApiError, FieldSpec, HttpGet, Json, Metadata, Registrar, Router, Server};
//! use serde::Serialize;
//!
//! #[derive(Default, Serialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[derive(Default)]
//! struct GetUser {
//!     get: HttpGet,
//!     id: u64,
//! }
//!
//! impl Metadata for GetUser {
//!     fn fields() -> Vec<FieldSpec<Self>> {
//!         vec![
//!             FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
//!             FieldSpec::marker("Path", "httppath:{id}"),
//!             FieldSpec::new("ID", |m: &mut Self| &mut m.id).api("path:id").description("User id"),
//!         ]
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Users;
//!
//! impl Users {
//!     async fn get(self: Arc<Self>, m: GetUser) -> Result<Json<User>, ApiError> {
//!         Ok(Json(User { id: m.id, name: "ada".into() }))
//!     }
//! }
//!
//! impl Api for Users {
//!     fn describe(api: &mut ApiBuilder<Self>) {
//!         api.endpoint("get", Self::get);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restbind::Error> {
//!     let mut router = Router::new();
//!     Registrar::new("/api")
//!         .produces(["application/json"])
//!         .register(&mut router, "users", Arc::new(Users))?;
//!
//!     Server::bind("0.0.0.0:3000").serve(router).await
//! }
//! ```

mod context;
mod directives;
mod error;
mod form;
mod handler;
mod metadata;
mod method;
mod registrar;
mod render;
mod request;
mod response;
mod route;
mod router;
mod server;
mod value;

pub mod health;
pub mod middleware;
pub mod registry;

pub use context::Context;
pub use error::{ApiError, BoxError, BuildError, DirectiveError, Error};
pub use form::{FORM_URLENCODED, FilePart, FormValues, MULTIPART_FORM_DATA, MultipartForm};
pub use handler::{
    Arguments, BoxFuture, Handler, MethodHandler, Output, OutputSlot, Param, ParamSlot, RecordType, ReturnSlot,
    ReturnValue, Signature, analyze,
};
pub use metadata::{Accessor, FieldSpec, HttpDelete, HttpGet, HttpOptions, HttpPatch, HttpPost, HttpPut, Metadata};
pub use method::{Method, UnknownMethod};
pub use registrar::{Api, ApiBuilder, Registrar};
pub use render::{Custom, ErrorBody, HandlerError, Render, RenderError, error_chain, register_error_renderer};
pub use request::Request;
pub use response::{APPLICATION_JSON, Response, ResponseWriter, TEXT_PLAIN};
pub use route::{Parameter, ResponseDoc, Route, RouteInfo, join_paths};
pub use router::Router;
pub use server::Server;
pub use value::{AsAny, FieldKind, FieldValue, Json, ParseError, Shape, Wrapper, parse_value};

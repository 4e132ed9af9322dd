//! Route descriptors and the per-request dispatcher.
//!
//! A [`Route`] is compiled once, at registration, from a handler's
//! [`Signature`] and its metadata record's binders. Every request then runs
//! the same three steps:
//!
//! 1. **Bind**: a fresh record, binders in declaration order, first error wins.
//! 2. **Invoke**: the handler, with arguments pulled from their slots.
//! 3. **Render**: the error if there is one, otherwise the response value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::context::Context;
use crate::error::{ApiError, BuildError};
use crate::form::MULTIPART_FORM_DATA;
use crate::handler::{Arguments, ErasedCall, ReturnValue, Signature};
use crate::metadata::Binder;
use crate::method::Method;
use crate::middleware::Hooks;
use crate::registry::{FieldTarget, Registry};
use crate::render::{self, HandlerError};
use crate::request::Request;
use crate::response::{Response, ResponseWriter};

// ── Descriptors ──────────────────────────────────────────────────────────────

/// A declared path, query, or header parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub field_name: String,
    pub name: String,
    pub description: String,
    pub allow_multiple: bool,
}

impl Parameter {
    pub fn new(field_name: &str, name: &str, description: &str, allow_multiple: bool) -> Self {
        Self {
            field_name: field_name.to_owned(),
            name: name.to_owned(),
            description: description.to_owned(),
            allow_multiple,
        }
    }
}

/// A documented response code.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseDoc {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

/// Everything known about a route's HTTP contract.
///
/// Directive factories fill this in while the record is walked; the
/// registrar then resolves the full path and applies its defaults.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RouteInfo {
    pub method: Option<Method>,
    pub path: String,
    pub doc: String,
    pub notes: String,
    pub path_parameters: Vec<Parameter>,
    pub query_parameters: Vec<Parameter>,
    pub header_parameters: Vec<Parameter>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_example: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_example: Option<serde_json::Value>,
    pub responses: Vec<ResponseDoc>,
    /// Free-form notes left by custom directives.
    pub annotations: BTreeMap<String, String>,
}

impl RouteInfo {
    /// Documents a response code. A later entry for the same code wins.
    pub fn add_response(&mut self, code: u16, message: &str, example: Option<serde_json::Value>) {
        self.responses.retain(|r| r.code != code);
        self.responses.push(ResponseDoc { code, message: message.to_owned(), example });
        self.responses.sort_by_key(|r| r.code);
    }

    fn has_parameters(&self) -> bool {
        !(self.path_parameters.is_empty() && self.query_parameters.is_empty() && self.header_parameters.is_empty())
    }
}

// ── Compilation ──────────────────────────────────────────────────────────────

/// Replaces a handler error before it is rendered.
pub(crate) type ErrorMapper = Arc<dyn Fn(HandlerError) -> HandlerError + Send + Sync>;

/// Registrar settings that apply to one route.
#[derive(Clone, Default)]
pub(crate) struct RouteOptions {
    pub(crate) prefix: String,
    pub(crate) consumes: Vec<String>,
    pub(crate) produces: Vec<String>,
    pub(crate) attributes: BTreeMap<String, serde_json::Value>,
    pub(crate) hooks: Hooks,
    pub(crate) map_errors: Option<ErrorMapper>,
}

/// Joins path pieces with exactly one `/` between non-empty segments and one
/// leading `/`.
///
/// ```rust
/// assert_eq!(restbind::join_paths(&["/api/", "", "/v1", "users/{id}/"]), "/api/v1/users/{id}");
/// assert_eq!(restbind::join_paths(&["", "/"]), "/");
/// ```
pub fn join_paths(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts.iter().map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// A compiled route: its descriptor plus everything needed to serve it.
pub struct Route {
    info: RouteInfo,
    method: Method,
    label: Arc<str>,
    signature: Signature,
    binders: Vec<Binder>,
    call: ErasedCall,
    options: RouteOptions,
    /// Multipart bodies are decoded before binding.
    reads_multipart: bool,
}

impl Route {
    pub(crate) fn compile(
        signature: Signature,
        call: ErasedCall,
        registry: &Registry,
        options: RouteOptions,
    ) -> Result<Self, BuildError> {
        let mut info = RouteInfo::default();
        let binders = match &signature.metadata {
            Some((_, record)) => record.walk(registry, &mut info)?,
            None => Vec::new(),
        };
        let method = info.method.ok_or(BuildError::MissingMethod)?;

        info.path = join_paths(&[&options.prefix, &info.path]);
        if info.consumes.is_empty() {
            info.consumes.clone_from(&options.consumes);
        }
        if info.produces.is_empty() {
            info.produces.clone_from(&options.produces);
        }
        if info.has_parameters() || info.body_example.is_some() {
            info.add_response(400, "Bad Request", None);
        }
        if signature.response.is_some() {
            info.response_example.clone_from(&signature.response_example);
            info.add_response(200, "OK", signature.response_example.clone());
        }

        let label: Arc<str> = format!("{method} {}", info.path).into();
        let reads_multipart = info.consumes.iter().any(|c| c == MULTIPART_FORM_DATA);
        debug!(route = %label, binders = binders.len(), "compiled route");
        Ok(Self { info, method, label, signature, binders, call, options, reads_multipart })
    }

    pub fn info(&self) -> &RouteInfo {
        &self.info
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.info.path
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Serves one request. Every outcome ends in exactly one response.
    pub async fn dispatch(&self, mut req: Request, mut ctx: Context) -> Response {
        ctx.set_route(Arc::clone(&self.label));
        for (key, value) in &self.options.attributes {
            ctx.set_attribute(key.clone(), value.clone());
        }
        self.options.hooks.apply(&mut ctx, &self.info);
        if self.reads_multipart {
            req.decode_multipart().await;
        }

        let mut w = ResponseWriter::new();
        match self.run(&req, ctx).await {
            Ok(value) => {
                debug!(route = %self.label, "request succeeded");
                render::render_value(value, &mut w);
            }
            Err(err) => {
                info!(route = %self.label, error = %render::error_chain(err.error()), "request failed");
                render::render_error(&err, &mut w);
            }
        }
        w.finish()
    }

    /// Answers a request that failed before it could be bound.
    pub(crate) fn reject(&self, err: ApiError) -> Response {
        info!(route = %self.label, error = %err, "request rejected");
        let mut w = ResponseWriter::new();
        render::render_error(&HandlerError::from(err), &mut w);
        w.finish()
    }

    /// Bind and invoke. Returns the value to render, or the error to render
    /// in its place.
    async fn run(&self, req: &Request, ctx: Context) -> Result<ReturnValue, HandlerError> {
        let mut args = Arguments { context: self.signature.context.map(|_| ctx), record: None };
        if let Some((_, record_type)) = &self.signature.metadata {
            let mut record = record_type.instantiate();
            for binder in &self.binders {
                debug!(route = %self.label, field = %binder.field_name, "binding field");
                let mut target = FieldTarget::new(&mut *record, &binder.accessor, &binder.field_name);
                (binder.bind)(&mut target, req)?;
            }
            args.record = Some(record);
        }

        let values = (self.call)(args).await?;
        if values.len() != self.signature.outputs {
            return Err(ApiError::internal(format!(
                "unexpected output count: got {}, expected {}",
                values.len(),
                self.signature.outputs
            ))
            .into());
        }

        let mut response = ReturnValue::Absent;
        let mut error = None;
        for (i, value) in values.into_iter().enumerate() {
            if Some(i) == self.signature.error {
                if let ReturnValue::Error(err) = value {
                    error = Some(err);
                }
            } else if Some(i) == self.signature.response {
                response = value;
            }
        }

        if let Some(err) = error {
            return Err(match &self.options.map_errors {
                Some(map) => map(err),
                None => err,
            });
        }
        match response {
            ReturnValue::Error(err) => Err(err),
            value => Ok(value),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("route", &self.label)
            .field("binders", &self.binders.iter().map(|b| b.field_name.as_str()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_join_with_single_separators() {
        assert_eq!(join_paths(&["api", "users"]), "/api/users");
        assert_eq!(join_paths(&["/", "//a//", "b/"]), "/a/b");
        assert_eq!(join_paths(&[]), "/");
    }

    #[test]
    fn response_docs_are_unique_per_code() {
        let mut info = RouteInfo::default();
        info.add_response(400, "Bad Request", None);
        info.add_response(200, "OK", None);
        info.add_response(400, "Bad Request", None);
        let codes: Vec<u16> = info.responses.iter().map(|r| r.code).collect();
        assert_eq!(codes, [200, 400]);
    }
}

//! Turning handler outputs into responses.
//!
//! Two capabilities let a value take over its own rendering:
//!
//! - [`Render`] for response values. Wrap any implementor in [`Custom`] (or
//!   return a [`Response`](crate::Response), which already is one).
//! - [`RenderError`] for errors. [`ApiError`] is one; user error types opt in
//!   with [`register_error_renderer`] so they are found behind a
//!   [`BoxError`] and anywhere on a `source()` chain.
//!
//! Everything else is rendered generically: plain values as JSON with
//! `200 OK`, errors as `{"type", "message"}` with `500`.

use std::any::TypeId;
use std::error::Error as StdError;
use std::sync::LazyLock;

use http::StatusCode;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{ApiError, BoxError};
use crate::handler::{OutputSlot, ReturnSlot, ReturnValue};
use crate::response::{APPLICATION_JSON, ResponseWriter};

// ── Capabilities ─────────────────────────────────────────────────────────────

/// A response value that writes itself.
pub trait Render: Send + 'static {
    fn render(self: Box<Self>, w: &mut ResponseWriter);
}

/// An error that writes itself, status included.
pub trait RenderError: StdError + Send + Sync + 'static {
    fn render_error(&self, w: &mut ResponseWriter);
}

/// Marks a handler return value as self-rendering.
///
/// ```rust
/// use restbind::{Custom, Render, ResponseWriter};
///
/// struct Teapot;
///
/// impl Render for Teapot {
///     fn render(self: Box<Self>, w: &mut ResponseWriter) {
///         w.write_header(http::StatusCode::IM_A_TEAPOT);
///         w.write(b"short and stout");
///     }
/// }
///
/// async fn brew() -> Custom<Teapot> {
///     Custom(Teapot)
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Custom<T>(pub T);

impl<T: Render> ReturnSlot for Custom<T> {
    fn slot() -> OutputSlot {
        OutputSlot::response::<T>(None)
    }

    fn into_value(self) -> ReturnValue {
        ReturnValue::custom(self.0)
    }
}

// ── Error renderer registry ──────────────────────────────────────────────────

type Finder = for<'a> fn(&'a (dyn StdError + 'static)) -> Option<&'a dyn RenderError>;

static ERROR_RENDERERS: LazyLock<RwLock<Vec<(TypeId, Finder)>>> =
    LazyLock::new(|| RwLock::new(Vec::new()));

/// Makes `T` discoverable as a self-rendering error when it travels as a
/// [`BoxError`] or sits on another error's `source()` chain.
///
/// Call once per type at startup. Registering a type twice is harmless.
pub fn register_error_renderer<T: RenderError>() {
    let id = TypeId::of::<T>();
    let mut renderers = ERROR_RENDERERS.write();
    if !renderers.iter().any(|(registered, _)| *registered == id) {
        let finder: Finder = downcast_renderer::<T>;
        renderers.push((id, finder));
    }
}

fn downcast_renderer<'a, T: RenderError>(err: &'a (dyn StdError + 'static)) -> Option<&'a dyn RenderError> {
    err.downcast_ref::<T>().map(|t| t as &dyn RenderError)
}

/// Walks `err` and its sources, outermost first, for a self-rendering error.
pub(crate) fn find_renderer<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a dyn RenderError> {
    let renderers = ERROR_RENDERERS.read();
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return Some(api);
        }
        if let Some(found) = renderers.iter().find_map(|(_, f)| f(e)) {
            return Some(found);
        }
        current = e.source();
    }
    None
}

// ── Generic rendering ────────────────────────────────────────────────────────

/// The JSON error body: `{"type", "message"}` plus `parameter` for
/// parameter errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// A handler error together with the name of the type it was returned as.
#[derive(Debug)]
pub struct HandlerError {
    pub(crate) error: BoxError,
    pub(crate) type_name: &'static str,
}

impl HandlerError {
    /// Wraps `error`, recording `E` as the reported type. A `BoxError` is
    /// reported as `"error"`.
    pub fn new<E: Into<BoxError> + 'static>(error: E) -> Self {
        Self { type_name: error_label::<E>(), error: error.into() }
    }

    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.error
    }

    pub fn into_inner(self) -> BoxError {
        self.error
    }
}

impl From<ApiError> for HandlerError {
    fn from(err: ApiError) -> Self {
        Self::new(err)
    }
}

/// The `type` reported in the generic error body.
///
/// This is the static type of the handler's error slot, minus the crate
/// prefix for ours. A [`BoxError`] slot erases the concrete type, so it
/// reports `"error"`: return a concrete error type, or register a renderer
/// for it, when the name matters to clients.
fn error_label<E: 'static>() -> &'static str {
    if TypeId::of::<E>() == TypeId::of::<BoxError>() {
        return "error";
    }
    let name = std::any::type_name::<E>();
    name.strip_prefix("restbind::error::").unwrap_or(name)
}

/// The full error chain joined with `": "`. A source whose text already ends
/// its parent's message is not repeated.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if !text.is_empty() && !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        current = e.source();
    }
    message
}

/// Renders a handler or bind error.
pub(crate) fn render_error(err: &HandlerError, w: &mut ResponseWriter) {
    let inner: &(dyn StdError + 'static) = &*err.error;
    if let Some(renderer) = find_renderer(inner) {
        renderer.render_error(w);
        return;
    }
    let body = ErrorBody {
        kind: err.type_name.to_owned(),
        message: error_chain(inner),
        parameter: None,
    };
    w.write_entity(StatusCode::INTERNAL_SERVER_ERROR, &body);
}

/// Renders a non-error handler output.
pub(crate) fn render_value(value: ReturnValue, w: &mut ResponseWriter) {
    match value {
        ReturnValue::Absent => {}
        ReturnValue::Plain(bytes) => {
            w.write_header(StatusCode::OK);
            w.set_header("content-type", APPLICATION_JSON);
            w.write(&bytes);
        }
        ReturnValue::Custom(renderer) => renderer.render(w),
        ReturnValue::Error(err) => render_error(&err, w),
    }
}

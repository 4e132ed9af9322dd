//! Outgoing HTTP response type and the [`ResponseWriter`] sink.
//!
//! Handlers rarely build a [`Response`] by hand: plain return values are
//! serialised for them, and self-rendering values write into a
//! [`ResponseWriter`]. A [`Response`] is itself self-rendering, so returning
//! one from a handler sends it untouched.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::error;

use crate::handler::{OutputSlot, ReturnSlot, ReturnValue};
use crate::render::Render;

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use restbind::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::bytes_raw(APPLICATION_JSON, body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes_raw(TEXT_PLAIN, body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: code }
    }

    /// Adds a header. Returns `self` for chaining.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    fn bytes_raw(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            body,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            status: StatusCode::OK,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Case-insensitive header lookup; the last value set wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the hyper representation. An invalid header turns the
    /// whole response into a bare `500`.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|e| {
                error!("invalid response: {e}");
                let mut fallback = http::Response::new(Full::new(Bytes::new()));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}

impl Render for Response {
    fn render(self: Box<Self>, w: &mut ResponseWriter) {
        let Response { body, headers, status } = *self;
        w.write_header(status);
        for (name, value) in headers {
            w.set_header(&name, &value);
        }
        w.write(&body);
    }
}

impl ReturnSlot for Response {
    fn slot() -> OutputSlot {
        OutputSlot::response::<Self>(None)
    }

    fn into_value(self) -> ReturnValue {
        ReturnValue::custom(self)
    }
}

// ── ResponseWriter ───────────────────────────────────────────────────────────

/// The response sink handed to self-rendering values.
///
/// Starts as an empty `200 OK`. Writers may set headers, pick a status, and
/// append body bytes in any order; the dispatcher turns the result into one
/// [`Response`].
#[derive(Debug)]
pub struct ResponseWriter {
    response: Response,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self { response: Response::status(StatusCode::OK) }
    }

    /// Sets a header, replacing any earlier value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.response.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.response.headers.push((name.to_owned(), value.to_owned()));
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.response.headers.push((name.to_owned(), value.to_owned()));
    }

    pub fn write_header(&mut self, status: StatusCode) {
        self.response.status = status;
    }

    /// Appends raw body bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        self.response.body.extend_from_slice(bytes);
    }

    /// Writes `status` and `entity` serialised as JSON, replacing any body
    /// written so far. A value that cannot be serialised becomes a `500`.
    pub fn write_entity<T: Serialize + ?Sized>(&mut self, status: StatusCode, entity: &T) {
        match serde_json::to_vec(entity) {
            Ok(bytes) => {
                self.write_header(status);
                self.set_header("content-type", APPLICATION_JSON);
                self.response.body = bytes;
            }
            Err(e) => {
                error!("could not serialise response entity: {e}");
                self.write_header(StatusCode::INTERNAL_SERVER_ERROR);
                self.response.body.clear();
            }
        }
    }

    pub fn finish(self) -> Response {
        self.response
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

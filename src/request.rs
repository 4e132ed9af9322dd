//! Incoming HTTP request type.
//!
//! The server buffers the body before dispatch, so a [`Request`] is a cheap,
//! clonable handle: binders read from it, and the `request` directive hands
//! the same handle to the handler.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Uri, Version};
use percent_encoding::percent_decode_str;

use crate::form::{FormValues, MultipartForm};
use crate::value::{FieldKind, FieldValue, Shape};

/// An incoming HTTP request with its matched path parameters.
#[derive(Clone, Debug, Default)]
pub struct Request {
    inner: Arc<Inner>,
}

#[derive(Clone, Debug, Default)]
struct Inner {
    method: http::Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    path: String,
    params: HashMap<String, String>,
    query: FormValues,
    body: Bytes,
    multipart: Option<Result<MultipartForm, String>>,
}

impl Request {
    /// Wraps a buffered `http::Request` together with the parameters the
    /// router extracted from its path. `params` are expected decoded.
    pub fn new(req: http::Request<Bytes>, params: HashMap<String, String>) -> Self {
        let (parts, body) = req.into_parts();
        let query = parts
            .uri
            .query()
            .map(|q| FormValues::parse(q.as_bytes()))
            .unwrap_or_default();
        let path = percent_decode_str(parts.uri.path()).decode_utf8_lossy().into_owned();
        Self {
            inner: Arc::new(Inner {
                method: parts.method,
                uri: parts.uri,
                version: parts.version,
                headers: parts.headers,
                path,
                params,
                query,
                body,
                multipart: None,
            }),
        }
    }

    pub fn method(&self) -> &http::Method {
        &self.inner.method
    }

    /// The percent-decoded request path. [`uri`](Request::uri) keeps the
    /// path as it arrived.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }

    /// First value of a header, if present and valid UTF-8. Case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a header, in arrival order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.inner
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.inner.params.get(key).map(String::as_str)
    }

    /// Every value of a query parameter. Empty if absent.
    pub fn query_values(&self, name: &str) -> &[String] {
        self.inner.query.get_all(name)
    }

    pub fn query(&self) -> &FormValues {
        &self.inner.query
    }

    /// The `content-type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    /// Decodes the buffered body as `multipart/form-data` and keeps the
    /// outcome for the body binder.
    pub(crate) async fn decode_multipart(&mut self) {
        let content_type = self.content_type().unwrap_or_default().to_owned();
        let decoded = MultipartForm::parse(&content_type, self.inner.body.clone())
            .await
            .map_err(|e| e.to_string());
        Arc::make_mut(&mut self.inner).multipart = Some(decoded);
    }

    /// The multipart body decoded before binding, if the route reads one.
    pub(crate) fn multipart(&self) -> Option<&Result<MultipartForm, String>> {
        self.inner.multipart.as_ref()
    }

    /// Rebuilds an owned `http::Request` carrying the buffered body.
    pub fn to_http(&self) -> http::Request<Bytes> {
        let mut req = http::Request::new(self.inner.body.clone());
        *req.method_mut() = self.inner.method.clone();
        *req.uri_mut() = self.inner.uri.clone();
        *req.version_mut() = self.inner.version;
        *req.headers_mut() = self.inner.headers.clone();
        req
    }
}

impl FieldValue for Request {
    fn shape(&self) -> Shape {
        Shape::of(FieldKind::Request)
    }
}

impl FieldValue for http::Request<Bytes> {
    fn shape(&self) -> Shape {
        Shape::of(FieldKind::RawRequest)
    }
}

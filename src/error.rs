//! Error types.
//!
//! Three families, by when they happen:
//!
//! - [`BuildError`] / [`DirectiveError`]: a route could not be compiled. These
//!   surface while the route table is being built and never at request time.
//! - [`ApiError`]: a request could not be bound, or a handler wants a specific
//!   status. Always rendered by the error itself.
//! - [`Error`]: the server could not bind or accept.

use http::StatusCode;

use crate::method::UnknownMethod;
use crate::render::{ErrorBody, RenderError};
use crate::response::ResponseWriter;

/// A boxed, thread-safe error. Handler errors are carried in this form.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Infrastructure failures: binding to a port or accepting a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid address: {0}")]
    Addr(#[from] std::net::AddrParseError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("build: {0}")]
    Build(#[from] BuildError),
}

// ── Build time ────────────────────────────────────────────────────────────────

/// Why a handler or its metadata record could not be compiled into a route.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("multiple context arguments")]
    MultipleContexts,
    #[error("multiple input arguments")]
    MultipleMetadata,
    #[error("multiple output arguments")]
    MultipleResponses,
    #[error("multiple error arguments")]
    MultipleErrors,
    #[error("could not handle field {field:?}: {source}")]
    Field {
        field: String,
        #[source]
        source: DirectiveError,
    },
    #[error("no HTTP method declared")]
    MissingMethod,
    #[error("could not parse function: {name}: {source}")]
    Endpoint {
        name: String,
        #[source]
        source: Box<BuildError>,
    },
    #[error("invalid route {method} {path}: {message}")]
    Conflict {
        method: String,
        path: String,
        message: String,
    },
}

impl BuildError {
    pub(crate) fn endpoint(name: &str, source: BuildError) -> Self {
        Self::Endpoint { name: name.to_owned(), source: Box::new(source) }
    }
}

/// A directive factory rejected a field.
#[derive(Debug, thiserror::Error)]
pub enum DirectiveError {
    #[error("unhandled API tag: {0}")]
    Unknown(String),
    #[error("missing tag value")]
    MissingValue,
    #[error("unexpected tag value: {0}")]
    UnexpectedValue(String),
    #[error("bad type: expected {expected}, got {found}")]
    BadType { expected: &'static str, found: &'static str },
    #[error("duplicate {kind} tag: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("invalid body tag: {0}")]
    InvalidOption(String),
    #[error("invalid type for content-type {content_type}: {found}")]
    ContentType { content_type: String, found: &'static str },
    #[error(transparent)]
    Method(#[from] UnknownMethod),
    #[error("{0}")]
    Other(String),
}

// ── Request time ──────────────────────────────────────────────────────────────

/// A request-level failure that knows how to render itself.
///
/// Parameter and body errors are always `400 Bad Request`. `Response` carries
/// whatever status the handler chose.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{source}")]
    Body { source: BoxError },
    #[error("{source}")]
    PathParameter { parameter: String, source: BoxError },
    #[error("{source}")]
    QueryParameter { parameter: String, source: BoxError },
    #[error("{source}")]
    HeaderParameter { parameter: String, source: BoxError },
    #[error("{message}")]
    Response { status: StatusCode, message: String },
}

impl ApiError {
    /// The body could not be read or decoded.
    pub fn body(source: impl Into<BoxError>) -> Self {
        Self::Body { source: source.into() }
    }

    /// A path parameter was missing or could not be parsed.
    pub fn path_parameter(parameter: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::PathParameter { parameter: parameter.into(), source: source.into() }
    }

    /// A query parameter could not be parsed.
    pub fn query_parameter(parameter: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::QueryParameter { parameter: parameter.into(), source: source.into() }
    }

    /// A header was missing or could not be parsed.
    pub fn header_parameter(parameter: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::HeaderParameter { parameter: parameter.into(), source: source.into() }
    }

    /// A general failure rendered with `status`.
    ///
    /// An empty `message` is replaced by the status' canonical reason phrase.
    pub fn response(status: StatusCode, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = status.canonical_reason().unwrap_or_default().to_owned();
        }
        Self::Response { status, message }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::response(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// The status this error renders with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Response { status, .. } => *status,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// The parameter name, for parameter errors.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::PathParameter { parameter, .. }
            | Self::QueryParameter { parameter, .. }
            | Self::HeaderParameter { parameter, .. } => Some(parameter),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Body { .. } => "BodyError",
            Self::PathParameter { .. } => "PathParameterError",
            Self::QueryParameter { .. } => "QueryParameterError",
            Self::HeaderParameter { .. } => "HeaderParameterError",
            Self::Response { .. } => "ResponseError",
        }
    }
}

impl RenderError for ApiError {
    fn render_error(&self, w: &mut ResponseWriter) {
        let body = ErrorBody {
            kind: self.kind().to_owned(),
            message: self.to_string(),
            parameter: self.parameter().map(str::to_owned),
        };
        w.write_entity(self.status(), &body);
    }
}

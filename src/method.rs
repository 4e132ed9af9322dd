//! HTTP method as a typed enum.
//!
//! Only the verbs an endpoint can be declared with are represented. A
//! `httpmethod:<VERB>` directive naming anything else fails at build time.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// A verb an endpoint may be bound to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(into = "&'static str")]
pub enum Method {
    Delete,
    Get,
    Options,
    Patch,
    Post,
    Put,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
        }
    }

    pub(crate) fn to_http(self) -> http::Method {
        match self {
            Self::Delete  => http::Method::DELETE,
            Self::Get     => http::Method::GET,
            Self::Options => http::Method::OPTIONS,
            Self::Patch   => http::Method::PATCH,
            Self::Post    => http::Method::POST,
            Self::Put     => http::Method::PUT,
        }
    }
}

/// Returned by [`Method::from_str`] for verbs outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnknownMethod(pub String);

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            other     => Err(UnknownMethod(other.to_owned())),
        }
    }
}

impl From<Method> for &'static str {
    fn from(m: Method) -> Self {
        m.as_str()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

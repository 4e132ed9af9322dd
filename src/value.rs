//! Bindable field values and the single-token value parser.
//!
//! Every field a directive can write implements [`FieldValue`]. The trait is
//! object safe: binders only ever see `&mut dyn FieldValue`, and the build-time
//! walker inspects a field's [`Shape`] through a zero-valued probe record.
//!
//! Scalars (`bool`, every integer width, `f32`/`f64`) and `String` parse a
//! single token. User types opt in by overriding [`FieldValue::parse_str`];
//! [`from_str_field!`](crate::from_str_field) does that for any `FromStr` type.

use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;

// ── Shape ─────────────────────────────────────────────────────────────────────

/// What kind of value a field holds, ignoring `Option`/`Vec` wrapping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Parsed from a single token.
    Scalar,
    /// A `String`: any token is valid, raw body text is accepted.
    Text,
    /// Raw body bytes.
    Bytes,
    /// A URL-encoded form body.
    Form,
    /// A multipart form body.
    Multipart,
    /// The framework request handle.
    Request,
    /// The raw `http::Request`.
    RawRequest,
    /// Anything decoded from a structured (JSON) body.
    Structured,
}

/// How the value is wrapped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wrapper {
    None,
    Option,
    Vec,
}

/// The build-time description of a field's type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Shape {
    pub kind: FieldKind,
    pub wrapper: Wrapper,
}

impl Shape {
    pub const fn of(kind: FieldKind) -> Self {
        Self { kind, wrapper: Wrapper::None }
    }

    pub const fn scalar() -> Self {
        Self::of(FieldKind::Scalar)
    }

    /// A single token can be parsed into this shape.
    pub fn is_parseable(self) -> bool {
        matches!(self.kind, FieldKind::Scalar | FieldKind::Text)
    }

    /// True for `Vec<T>` fields, which accept repeated values.
    pub fn is_sequence(self) -> bool {
        self.wrapper == Wrapper::Vec
    }

    /// True for a bare `String`.
    pub fn is_plain_text(self) -> bool {
        self.kind == FieldKind::Text && self.wrapper == Wrapper::None
    }
}

// ── ParseError ────────────────────────────────────────────────────────────────

/// Why a token could not be written into a field.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("parsing {token:?}: {message}")]
    Invalid { token: String, message: String },
    #[error("parsing {token:?}: value out of range")]
    OutOfRange { token: String },
    #[error("could not parse to single value: unhandled type: {type_name}")]
    Unsupported { type_name: &'static str },
    #[error("could not parse string value: {source}")]
    Custom { source: BoxError },
}

impl ParseError {
    pub fn invalid(token: &str, message: impl fmt::Display) -> Self {
        Self::Invalid { token: token.to_owned(), message: message.to_string() }
    }

    /// Wraps a failure reported by a user-defined parser.
    pub fn custom(source: impl Into<BoxError>) -> Self {
        Self::Custom { source: source.into() }
    }
}

// ── FieldValue ────────────────────────────────────────────────────────────────

/// Upcasting helper so trait objects can be downcast to concrete types.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A field a binder can write into.
///
/// Only [`parse_str`](FieldValue::parse_str) needs overriding for a user type
/// that parses from a single token; the default [`shape`](FieldValue::shape)
/// reports a scalar.
pub trait FieldValue: AsAny + Send + Sync {
    fn shape(&self) -> Shape {
        Shape::scalar()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Parses one token into this value.
    fn parse_str(&mut self, _token: &str) -> Result<(), ParseError> {
        Err(ParseError::Unsupported { type_name: self.type_name() })
    }

    /// Replaces this value with one element per token. Only sequences support this.
    fn parse_each(&mut self, _tokens: &[String]) -> Result<(), ParseError> {
        Err(ParseError::Unsupported { type_name: self.type_name() })
    }

    /// Fills this value from a raw request body.
    fn read_body(&mut self, _body: &Bytes) -> Result<(), BoxError> {
        Err(format!("cannot read a body into {}", self.type_name()).into())
    }

    /// A documentation example of this value, if it has one.
    fn example(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Parses `token` into `target`.
///
/// Fails unless the target is a scalar or string location, optionally wrapped
/// in `Option`. A user type's own `parse_str` always decides the outcome.
pub fn parse_value(token: &str, target: &mut dyn FieldValue) -> Result<(), ParseError> {
    let shape = target.shape();
    if !shape.is_parseable() || shape.wrapper == Wrapper::Vec {
        return Err(ParseError::Unsupported { type_name: target.type_name() });
    }
    target.parse_str(token)
}

// ── Scalars ───────────────────────────────────────────────────────────────────

macro_rules! integer_field {
    ($($ty:ty),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn parse_str(&mut self, token: &str) -> Result<(), ParseError> {
                *self = token.parse::<$ty>().map_err(|e| {
                    use std::num::IntErrorKind::{NegOverflow, PosOverflow};
                    match e.kind() {
                        PosOverflow | NegOverflow => ParseError::OutOfRange { token: token.to_owned() },
                        _ => ParseError::invalid(token, e),
                    }
                })?;
                Ok(())
            }

            fn example(&self) -> Option<serde_json::Value> {
                serde_json::to_value(self).ok()
            }
        }
    )*};
}

integer_field!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! float_field {
    ($($ty:ty),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn parse_str(&mut self, token: &str) -> Result<(), ParseError> {
                let v = token.parse::<$ty>().map_err(|e| ParseError::invalid(token, e))?;
                if v.is_infinite() && !spells_infinity(token) {
                    return Err(ParseError::OutOfRange { token: token.to_owned() });
                }
                *self = v;
                Ok(())
            }

            fn example(&self) -> Option<serde_json::Value> {
                serde_json::to_value(self).ok()
            }
        }
    )*};
}

float_field!(f32, f64);

fn spells_infinity(token: &str) -> bool {
    let unsigned = token.trim_start_matches(['+', '-']);
    unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity")
}

impl FieldValue for bool {
    fn parse_str(&mut self, token: &str) -> Result<(), ParseError> {
        *self = token.parse::<bool>().map_err(|e| ParseError::invalid(token, e))?;
        Ok(())
    }

    fn example(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::Bool(*self))
    }
}

impl FieldValue for String {
    fn shape(&self) -> Shape {
        Shape::of(FieldKind::Text)
    }

    fn parse_str(&mut self, token: &str) -> Result<(), ParseError> {
        token.clone_into(self);
        Ok(())
    }

    fn read_body(&mut self, body: &Bytes) -> Result<(), BoxError> {
        *self = String::from_utf8(body.to_vec())?;
        Ok(())
    }

    fn example(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::String(self.clone()))
    }
}

impl FieldValue for Bytes {
    fn shape(&self) -> Shape {
        Shape::of(FieldKind::Bytes)
    }

    fn read_body(&mut self, body: &Bytes) -> Result<(), BoxError> {
        *self = body.clone();
        Ok(())
    }

    fn example(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::String(String::new()))
    }
}

// ── Wrappers ──────────────────────────────────────────────────────────────────

impl<T: FieldValue + Default + 'static> FieldValue for Option<T> {
    fn shape(&self) -> Shape {
        Shape { kind: T::default().shape().kind, wrapper: Wrapper::Option }
    }

    fn parse_str(&mut self, token: &str) -> Result<(), ParseError> {
        let mut value = T::default();
        value.parse_str(token)?;
        *self = Some(value);
        Ok(())
    }

    fn read_body(&mut self, body: &Bytes) -> Result<(), BoxError> {
        let mut value = T::default();
        value.read_body(body)?;
        *self = Some(value);
        Ok(())
    }

    fn example(&self) -> Option<serde_json::Value> {
        T::default().example()
    }
}

impl<T: FieldValue + Default + 'static> FieldValue for Vec<T> {
    fn shape(&self) -> Shape {
        Shape { kind: T::default().shape().kind, wrapper: Wrapper::Vec }
    }

    fn parse_each(&mut self, tokens: &[String]) -> Result<(), ParseError> {
        let mut values = Vec::with_capacity(tokens.len());
        for token in tokens {
            let mut value = T::default();
            parse_value(token, &mut value)?;
            values.push(value);
        }
        *self = values;
        Ok(())
    }

    fn example(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::Array(T::default().example().into_iter().collect()))
    }
}

// ── Structured bodies ─────────────────────────────────────────────────────────

/// A field decoded from (and documented as) JSON.
///
/// ```rust
/// use std::collections::HashMap;
/// use restbind::Json;
///
/// let body: Json<HashMap<String, String>> = Json::default();
/// assert!(body.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> FieldValue for Json<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    fn shape(&self) -> Shape {
        Shape::of(FieldKind::Structured)
    }

    fn read_body(&mut self, body: &Bytes) -> Result<(), BoxError> {
        self.0 = serde_json::from_slice(body)?;
        Ok(())
    }

    fn example(&self) -> Option<serde_json::Value> {
        serde_json::to_value(T::default()).ok()
    }
}

impl FieldValue for serde_json::Value {
    fn shape(&self) -> Shape {
        Shape::of(FieldKind::Structured)
    }

    fn read_body(&mut self, body: &Bytes) -> Result<(), BoxError> {
        *self = serde_json::from_slice(body)?;
        Ok(())
    }

    fn example(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::Null)
    }
}

/// Implements [`FieldValue`] for types that parse through [`FromStr`](std::str::FromStr).
///
/// ```rust
/// use std::str::FromStr;
///
/// #[derive(Debug, Default, PartialEq)]
/// enum Color { #[default] Red, Blue }
///
/// impl FromStr for Color {
///     type Err = String;
///     fn from_str(s: &str) -> Result<Self, String> {
///         match s {
///             "red" => Ok(Color::Red),
///             "blue" => Ok(Color::Blue),
///             other => Err(format!("unknown color {other}")),
///         }
///     }
/// }
///
/// restbind::from_str_field!(Color);
///
/// let mut c = Color::Red;
/// restbind::parse_value("blue", &mut c).unwrap();
/// assert_eq!(c, Color::Blue);
/// ```
#[macro_export]
macro_rules! from_str_field {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::FieldValue for $ty {
            fn parse_str(&mut self, token: &str) -> ::std::result::Result<(), $crate::ParseError> {
                *self = <$ty as ::std::str::FromStr>::from_str(token)
                    .map_err(|e| $crate::ParseError::custom(e.to_string()))?;
                Ok(())
            }
        }
    )+};
}

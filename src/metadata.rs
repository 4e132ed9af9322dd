//! Metadata records and the field walker.
//!
//! A metadata record is a plain struct whose fields a route binds from the
//! request. The record lists its fields through [`Metadata::fields`]: a name,
//! an optional directive, free-form attributes, and an accessor that reaches
//! the field in a live instance.
//!
//! ```rust
//! use restbind::{FieldSpec, HttpGet, Metadata};
//!
//! #[derive(Default)]
//! struct GetUser {
//!     get: HttpGet,
//!     id: u64,
//!     verbose: bool,
//! }
//!
//! impl Metadata for GetUser {
//!     fn fields() -> Vec<FieldSpec<Self>> {
//!         vec![
//!             FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
//!             FieldSpec::marker("Path", "httppath:users/{id}"),
//!             FieldSpec::new("ID", |m: &mut Self| &mut m.id).api("path:id"),
//!             FieldSpec::new("Verbose", |m: &mut Self| &mut m.verbose)
//!                 .api("query:verbose,v")
//!                 .default_value("false"),
//!         ]
//!     }
//! }
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BuildError, DirectiveError};
use crate::registry::{BindFn, ErasedAccessor, FieldDescription, Registry, erased_accessor};
use crate::route::RouteInfo;
use crate::value::{FieldKind, FieldValue, Shape};

/// A struct whose fields are bound from requests.
///
/// `Default` supplies both the fresh per-request instance and the zero value
/// the walker inspects at build time.
pub trait Metadata: Default + Send + 'static {
    /// The record's fields, in declaration order.
    fn fields() -> Vec<FieldSpec<Self>>;
}

/// Reaches one field of an `M`.
pub type Accessor<M> = Arc<dyn for<'a> Fn(&'a mut M) -> &'a mut (dyn FieldValue) + Send + Sync>;

type Projection<M, E> = Arc<dyn for<'a> Fn(&'a mut M) -> &'a mut E + Send + Sync>;

fn accessor<M, F>(f: F) -> Accessor<M>
where
    F: for<'a> Fn(&'a mut M) -> &'a mut (dyn FieldValue) + Send + Sync + 'static,
{
    Arc::new(f)
}

// ── FieldSpec ────────────────────────────────────────────────────────────────

/// One declared field of a metadata record.
pub struct FieldSpec<M> {
    name: String,
    directive: Option<String>,
    attributes: BTreeMap<String, String>,
    node: Node<M>,
}

enum Node<M> {
    Value(Accessor<M>),
    /// No storage. Described to factories as a `String`.
    Marker,
    /// Another record's fields, expanded in place.
    Embedded(Vec<FieldSpec<M>>),
}

impl<M: 'static> FieldSpec<M> {
    /// A field stored in the record.
    pub fn new<T, F>(name: &str, access: F) -> Self
    where
        T: FieldValue + 'static,
        F: for<'a> Fn(&'a mut M) -> &'a mut T + Send + Sync + 'static,
    {
        Self::with_node(name, Node::Value(accessor(move |m| access(m) as &mut dyn FieldValue)))
    }

    /// A field that only carries a directive, like an anonymous `String`
    /// whose value nobody reads. Binders built for it are discarded.
    pub fn marker(name: &str, directive: &str) -> Self {
        Self::with_node(name, Node::Marker).api(directive)
    }

    /// Expands the fields of the embedded record `E` in place.
    pub fn embed<E, F>(name: &str, project: F) -> Self
    where
        E: Metadata,
        F: for<'a> Fn(&'a mut M) -> &'a mut E + Send + Sync + 'static,
    {
        let project: Projection<M, E> = Arc::new(project);
        let fields = E::fields().into_iter().map(|f| f.lift(&project)).collect();
        Self::with_node(name, Node::Embedded(fields))
    }

    fn with_node(name: &str, node: Node<M>) -> Self {
        Self { name: name.to_owned(), directive: None, attributes: BTreeMap::new(), node }
    }

    /// Sets the directive, e.g. `"query:limit"`.
    pub fn api(mut self, directive: &str) -> Self {
        self.directive = Some(directive.to_owned());
        self
    }

    pub fn description(self, text: &str) -> Self {
        self.attr("description", text)
    }

    /// Value used by `query` when the request carries none.
    pub fn default_value(self, value: &str) -> Self {
        self.attr("default", value)
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directive(&self) -> Option<&str> {
        self.directive.as_deref()
    }
}

impl<E: 'static> FieldSpec<E> {
    /// Re-roots this field onto an outer record reaching `E` through `project`.
    fn lift<M: 'static>(self, project: &Projection<M, E>) -> FieldSpec<M> {
        let node = match self.node {
            Node::Value(inner) => {
                let project = Arc::clone(project);
                Node::Value(accessor(move |m: &mut M| inner(project(m))))
            }
            Node::Marker => Node::Marker,
            Node::Embedded(fields) => Node::Embedded(fields.into_iter().map(|f| f.lift(project)).collect()),
        };
        FieldSpec { name: self.name, directive: self.directive, attributes: self.attributes, node }
    }
}

impl<M> fmt::Debug for FieldSpec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.node {
            Node::Value(_) => "value",
            Node::Marker => "marker",
            Node::Embedded(_) => "embedded",
        };
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("directive", &self.directive)
            .field("kind", &kind)
            .finish()
    }
}

// ── Method markers ───────────────────────────────────────────────────────────

macro_rules! method_markers {
    ($($(#[$doc:meta])* $name:ident => $verb:literal;)*) => {$(
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name;

        impl Metadata for $name {
            fn fields() -> Vec<FieldSpec<Self>> {
                vec![FieldSpec::marker("_", concat!("httpmethod:", $verb))]
            }
        }
    )*};
}

method_markers! {
    /// Embed to declare a `DELETE` endpoint.
    HttpDelete => "DELETE";
    /// Embed to declare a `GET` endpoint.
    HttpGet => "GET";
    /// Embed to declare an `OPTIONS` endpoint.
    HttpOptions => "OPTIONS";
    /// Embed to declare a `PATCH` endpoint.
    HttpPatch => "PATCH";
    /// Embed to declare a `POST` endpoint.
    HttpPost => "POST";
    /// Embed to declare a `PUT` endpoint.
    HttpPut => "PUT";
}

// ── Walker ───────────────────────────────────────────────────────────────────

/// A compiled per-field binder, run in declaration order.
pub(crate) struct Binder {
    pub(crate) field_name: String,
    pub(crate) accessor: ErasedAccessor,
    pub(crate) bind: BindFn,
}

/// Splits a directive into key and argument at the first `:` or `;`.
pub(crate) fn split_directive(directive: &str) -> (&str, &str) {
    match directive.find([':', ';']) {
        Some(at) => (&directive[..at], &directive[at + 1..]),
        None => (directive, ""),
    }
}

/// Walks `M`'s fields, feeding each directive to its factory.
///
/// Factories record route metadata in `info`. The first failure aborts the
/// walk and names the field it happened on.
pub(crate) fn walk<M: Metadata>(registry: &Registry, info: &mut RouteInfo) -> Result<Vec<Binder>, BuildError> {
    let mut probe = M::default();
    let mut binders = Vec::new();
    walk_fields(M::fields(), &mut probe, registry, info, &mut binders)?;
    Ok(binders)
}

fn walk_fields<M: 'static>(
    fields: Vec<FieldSpec<M>>,
    probe: &mut M,
    registry: &Registry,
    info: &mut RouteInfo,
    binders: &mut Vec<Binder>,
) -> Result<(), BuildError> {
    for field in fields {
        let FieldSpec { name, directive, attributes, node } = field;
        let accessor = match node {
            Node::Embedded(inner) => {
                walk_fields(inner, probe, registry, info, binders)?;
                continue;
            }
            Node::Value(accessor) => Some(accessor),
            Node::Marker => None,
        };
        let Some(directive) = directive else { continue };
        if directive == "-" {
            continue;
        }

        let fail = |source: DirectiveError| BuildError::Field { field: name.clone(), source };
        let (key, arg) = split_directive(&directive);
        let factory = registry.get(key).ok_or_else(|| fail(DirectiveError::Unknown(key.to_owned())))?;

        let description = match &accessor {
            Some(access) => {
                let value = access(&mut *probe);
                FieldDescription {
                    name: name.clone(),
                    shape: value.shape(),
                    type_name: value.type_name(),
                    example: value.example(),
                    attributes,
                    marker: false,
                }
            }
            None => FieldDescription {
                name: name.clone(),
                shape: Shape::of(FieldKind::Text),
                type_name: std::any::type_name::<String>(),
                example: Some(serde_json::Value::String(String::new())),
                attributes,
                marker: true,
            },
        };

        let bind = factory(arg, &description, &mut *info).map_err(fail)?;
        if let (Some(bind), Some(access)) = (bind, accessor) {
            binders.push(Binder { field_name: name, accessor: erase::<M>(access), bind });
        }
    }
    Ok(())
}

fn erase<M: 'static>(access: Accessor<M>) -> ErasedAccessor {
    erased_accessor(move |record: &mut dyn Any| record.downcast_mut::<M>().map(|m| access(m)))
}

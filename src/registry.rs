//! Field directive registry.
//!
//! A directive is the `key[:argument]` string attached to a metadata field.
//! The registry maps each key to a factory. At build time the walker calls
//! the factory once per field; the factory validates the field, records what
//! it learned in the [`RouteInfo`], and may hand back a [`BindFn`] that runs
//! on every request.
//!
//! The process-wide registry starts with the built-in directives. Custom
//! directives must be registered before the first route is built: the first
//! call to [`registry`] seals it.
//!
//! ```rust
//! use restbind::registry::{self, FieldTarget};
//! use restbind::{ApiError, DirectiveError};
//!
//! registry::register("tenant", |arg, field, _route| {
//!     if !field.shape.is_plain_text() {
//!         return Err(DirectiveError::BadType { expected: "String", found: field.type_name });
//!     }
//!     let header = arg.to_owned();
//!     Ok(Some(registry::bind_fn(move |target: &mut FieldTarget<'_>, req| {
//!         let tenant = req.header(&header).unwrap_or("default").to_owned();
//!         target.downcast_mut::<String>()?.clone_from(&tenant);
//!         Ok::<(), ApiError>(())
//!     })))
//! });
//! ```

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::directives;
use crate::error::{ApiError, DirectiveError};
use crate::request::Request;
use crate::route::RouteInfo;
use crate::value::{FieldValue, Shape};

// ── Field access ─────────────────────────────────────────────────────────────

/// Reaches one field inside a type-erased record.
pub(crate) type ErasedAccessor =
    Arc<dyn for<'r> Fn(&'r mut dyn Any) -> Option<&'r mut dyn FieldValue> + Send + Sync>;

/// Pins down the higher-ranked signature for a closure literal.
pub(crate) fn erased_accessor<F>(f: F) -> ErasedAccessor
where
    F: for<'r> Fn(&'r mut dyn Any) -> Option<&'r mut dyn FieldValue> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The field a binder is writing, inside the record being bound.
pub struct FieldTarget<'a> {
    record: &'a mut (dyn Any + Send),
    accessor: &'a ErasedAccessor,
    name: &'a str,
}

impl<'a> FieldTarget<'a> {
    pub(crate) fn new(record: &'a mut (dyn Any + Send), accessor: &'a ErasedAccessor, name: &'a str) -> Self {
        Self { record, accessor, name }
    }

    /// The field's declared name.
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn value(&mut self) -> Result<&mut dyn FieldValue, ApiError> {
        let name = self.name;
        let record: &mut dyn Any = &mut *self.record;
        (self.accessor)(record).ok_or_else(|| ApiError::internal(format!("field {name:?} is not reachable")))
    }

    /// The field as its concrete type.
    pub fn downcast_mut<T: 'static>(&mut self) -> Result<&mut T, ApiError> {
        let name = self.name;
        self.value()?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| ApiError::internal(format!("field {name:?} is not a {}", std::any::type_name::<T>())))
    }

    /// Read access to the whole record, including fields bound earlier.
    pub fn record(&self) -> &dyn Any {
        &*self.record
    }
}

/// Binds one field from a request.
pub type BindFn = Arc<dyn Fn(&mut FieldTarget<'_>, &Request) -> Result<(), ApiError> + Send + Sync>;

/// Pins down the higher-ranked signature for a binder closure literal.
pub fn bind_fn<F>(f: F) -> BindFn
where
    F: Fn(&mut FieldTarget<'_>, &Request) -> Result<(), ApiError> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ── Field descriptions ───────────────────────────────────────────────────────

/// What a directive factory knows about the field it is asked to handle.
#[derive(Clone, Debug)]
pub struct FieldDescription {
    pub name: String,
    pub shape: Shape,
    pub type_name: &'static str,
    /// The zero value rendered as JSON, when the type has an example.
    pub example: Option<serde_json::Value>,
    pub attributes: BTreeMap<String, String>,
    /// A storage-less field: any binder the factory returns is dropped.
    pub marker: bool,
}

impl FieldDescription {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn description(&self) -> &str {
        self.attribute("description").unwrap_or_default()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Builds the binder for one field.
pub type Factory =
    Arc<dyn Fn(&str, &FieldDescription, &mut RouteInfo) -> Result<Option<BindFn>, DirectiveError> + Send + Sync>;

/// A table of directive factories keyed by directive name.
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    /// An empty registry. Useful for restricting which directives a
    /// [`Registrar`](crate::Registrar) accepts.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in directive.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        directives::install(&mut registry);
        registry
    }

    /// Adds a directive.
    ///
    /// # Panics
    ///
    /// Panics if `key` is already registered.
    pub fn register<F>(&mut self, key: &str, factory: F) -> &mut Self
    where
        F: Fn(&str, &FieldDescription, &mut RouteInfo) -> Result<Option<BindFn>, DirectiveError>
            + Send
            + Sync
            + 'static,
    {
        if self.factories.contains_key(key) {
            panic!("handler for api tag {key:?} already registered");
        }
        self.factories.insert(key.to_owned(), Arc::new(factory));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Factory> {
        self.factories.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("keys", &self.keys()).finish()
    }
}

// ── Process-wide registry ────────────────────────────────────────────────────

static GLOBAL: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(Registry::with_builtins()));
static SEALED: AtomicBool = AtomicBool::new(false);

/// Adds a directive to the process-wide registry.
///
/// # Panics
///
/// Panics if `key` is already registered, or if a route has already been
/// built from the process-wide registry.
pub fn register<F>(key: &str, factory: F)
where
    F: Fn(&str, &FieldDescription, &mut RouteInfo) -> Result<Option<BindFn>, DirectiveError>
        + Send
        + Sync
        + 'static,
{
    // Checked before locking: a live `registry()` guard holds the lock.
    assert_unsealed(key);
    let mut global = GLOBAL.write();
    assert_unsealed(key);
    global.register(key, factory);
}

fn assert_unsealed(key: &str) {
    if SEALED.load(Ordering::Acquire) {
        panic!("cannot register api tag {key:?}: directive registry is sealed");
    }
}

/// Read access to the process-wide registry. Seals it against further
/// registration.
pub fn registry() -> RwLockReadGuard<'static, Registry> {
    SEALED.store(true, Ordering::Release);
    GLOBAL.read()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &str, _: &FieldDescription, _: &mut RouteInfo) -> Result<Option<BindFn>, DirectiveError> {
        Ok(None)
    }

    #[test]
    fn builtins_are_present() {
        let registry = Registry::with_builtins();
        for key in ["httpmethod", "httppath", "doc", "notes", "path", "query", "header", "body", "httprequest", "request", "produces"] {
            assert!(registry.contains(key), "missing {key}");
        }
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_keys_panic() {
        let mut registry = Registry::new();
        registry.register("custom", noop).register("custom", noop);
    }

    #[test]
    fn field_target_reaches_the_field() {
        #[derive(Default)]
        struct Record {
            id: u32,
        }
        let accessor = erased_accessor(|r| {
            r.downcast_mut::<Record>().map(|rec| &mut rec.id as &mut dyn FieldValue)
        });
        let mut record = Record::default();
        let mut target = FieldTarget::new(&mut record, &accessor, "id");
        crate::value::parse_value("7", target.value().unwrap()).unwrap();
        assert!(target.downcast_mut::<String>().is_err());
        assert_eq!(record.id, 7);
    }
}

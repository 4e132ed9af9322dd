//! Recursive route registration.
//!
//! An [`Api`] value declares its endpoint methods and nested groups; the
//! [`Registrar`] compiles each endpoint into a [`Route`] and recurses into
//! groups with an extended path prefix.
//!
//! ```rust
//! use std::sync::Arc;
//! use restbind::{Api, ApiBuilder, FieldSpec, HttpGet, Json, Metadata, Registrar, Router};
//!
//! #[derive(Default)]
//! struct Users;
//!
//! #[derive(Default)]
//! struct ListUsers {
//!     get: HttpGet,
//!     limit: u32,
//! }
//!
//! impl Metadata for ListUsers {
//!     fn fields() -> Vec<FieldSpec<Self>> {
//!         vec![
//!             FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
//!             FieldSpec::new("Limit", |m: &mut Self| &mut m.limit).api("query:limit").default_value("10"),
//!         ]
//!     }
//! }
//!
//! impl Users {
//!     async fn list(self: Arc<Self>, m: ListUsers) -> Json<Vec<u32>> {
//!         Json((0..m.limit).collect())
//!     }
//! }
//!
//! impl Api for Users {
//!     fn describe(api: &mut ApiBuilder<Self>) {
//!         api.endpoint("list", Self::list);
//!     }
//! }
//!
//! let mut router = Router::new();
//! Registrar::new("/api")
//!     .produces(["application/json"])
//!     .mount(&mut router, "users", Arc::new(Users));
//! assert_eq!(router.routes().next().unwrap().path, "/api/users");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::error::BuildError;
use crate::handler::{ErasedCall, Handler, MethodHandler, Signature, erase, erase_method};
use crate::metadata::split_directive;
use crate::middleware::Hooks;
use crate::registry::{self, Registry};
use crate::render::HandlerError;
use crate::route::{ErrorMapper, Route, RouteInfo, RouteOptions, join_paths};
use crate::router::Router;

// ── Api ──────────────────────────────────────────────────────────────────────

/// A value whose methods are endpoints.
pub trait Api: Send + Sync + Sized + 'static {
    fn describe(api: &mut ApiBuilder<Self>);
}

/// Routes compiled for one `register` call, tagged with their endpoint name.
type Compiled = Vec<(String, Route)>;

type GroupFn<A> = Box<dyn Fn(&Registrar, &Registry, &str, &Arc<A>, &mut Compiled) -> Result<(), BuildError>>;

struct Endpoint<A> {
    name: String,
    signature: Result<Signature, BuildError>,
    bind: Box<dyn FnOnce(Arc<A>) -> ErasedCall>,
}

struct Group<A> {
    name: String,
    directive: String,
    register: GroupFn<A>,
}

/// Collects the endpoints and groups an [`Api`] declares.
pub struct ApiBuilder<A> {
    endpoints: Vec<Endpoint<A>>,
    groups: Vec<Group<A>>,
}

impl<A: Api> ApiBuilder<A> {
    fn describe() -> Self {
        let mut builder = Self { endpoints: Vec::new(), groups: Vec::new() };
        A::describe(&mut builder);
        builder
    }

    /// Declares an endpoint method: `async fn name(self: Arc<Self>, ...)`.
    pub fn endpoint<H, Args>(&mut self, name: &str, handler: H) -> &mut Self
    where
        H: MethodHandler<A, Args>,
        Args: 'static,
    {
        self.endpoints.push(Endpoint {
            name: name.to_owned(),
            signature: <H as MethodHandler<A, Args>>::signature(),
            bind: Box::new(move |receiver| erase_method::<A, H, Args>(handler, receiver)),
        });
        self
    }

    /// Declares a nested group reached through `access`.
    ///
    /// Every `httppath:<sub>` part of `directive` (parts are `;`-separated)
    /// registers the group again under `<prefix>/<sub>`.
    pub fn group<S, F>(&mut self, name: &str, directive: &str, access: F) -> &mut Self
    where
        S: Api,
        F: Fn(&A) -> Arc<S> + 'static,
    {
        self.groups.push(Group {
            name: name.to_owned(),
            directive: directive.to_owned(),
            register: Box::new(
                move |registrar: &Registrar, registry: &Registry, prefix: &str, api: &Arc<A>, out: &mut Compiled| {
                    registrar.compile_api(registry, prefix, access(api), out)
                },
            ),
        });
        self
    }

    /// Declares a nested group whose value is `S::default()`.
    pub fn group_default<S>(&mut self, name: &str, directive: &str) -> &mut Self
    where
        S: Api + Default,
    {
        self.group(name, directive, |_: &A| Arc::new(S::default()))
    }
}

// ── Registrar ────────────────────────────────────────────────────────────────

/// Compiles handlers into routes with shared defaults.
///
/// Builder methods take and return `self`; [`session`](Registrar::session)
/// forks a copy whose changes stay local to it.
#[derive(Clone)]
pub struct Registrar {
    root: String,
    consumes: Vec<String>,
    produces: Vec<String>,
    attributes: BTreeMap<String, serde_json::Value>,
    hooks: Hooks,
    map_errors: Option<ErrorMapper>,
    registry: Option<Arc<Registry>>,
}

impl Registrar {
    /// A registrar whose routes all live under `root`.
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_owned(),
            consumes: Vec::new(),
            produces: Vec::new(),
            attributes: BTreeMap::new(),
            hooks: Hooks::new(),
            map_errors: None,
            registry: None,
        }
    }

    pub fn session(&self) -> Self {
        self.clone()
    }

    /// Content types consumed by routes that declare none.
    pub fn consumes<I, S>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes.extend(content_types.into_iter().map(Into::into));
        self
    }

    /// Content types produced by routes that declare none.
    pub fn produces<I, S>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces.extend(content_types.into_iter().map(Into::into));
        self
    }

    /// Sets a context attribute on every request.
    pub fn attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    /// Adds a hook, run before binding on every request.
    pub fn hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context, &RouteInfo) + Send + Sync + 'static,
    {
        self.hooks.push(hook);
        self
    }

    /// Replaces handler errors before they are rendered. Bind errors are not
    /// passed through the mapper.
    pub fn map_errors<F>(mut self, map: F) -> Self
    where
        F: Fn(HandlerError) -> HandlerError + Send + Sync + 'static,
    {
        self.map_errors = Some(Arc::new(map));
        self
    }

    /// Uses `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Compiles every endpoint of `api` and its groups into `router`, under
    /// `prefix`. On error `router` is left as it was.
    pub fn register<A: Api>(&self, router: &mut Router, prefix: &str, api: Arc<A>) -> Result<(), BuildError> {
        let mut compiled = Compiled::new();
        match &self.registry {
            Some(registry) => self.compile_api(registry, prefix, api, &mut compiled)?,
            None => self.compile_api(&registry::registry(), prefix, api, &mut compiled)?,
        }

        let mut staged = router.clone();
        for (name, route) in compiled {
            debug!(endpoint = %name, method = %route.method(), path = route.path(), "registering endpoint");
            staged.insert(route).map_err(|e| BuildError::endpoint(&name, e))?;
        }
        *router = staged;
        Ok(())
    }

    /// Like [`register`](Registrar::register).
    ///
    /// # Panics
    ///
    /// Panics if any route fails to compile; a server should not start with a
    /// partial route table.
    pub fn mount<A: Api>(&self, router: &mut Router, prefix: &str, api: Arc<A>) {
        if let Err(e) = self.register(router, prefix, api) {
            panic!("could not register {}: {e}", std::any::type_name::<A>());
        }
    }

    /// Registers a single free-function handler under `prefix`.
    pub fn route<H, Args>(&self, router: &mut Router, prefix: &str, handler: H) -> Result<(), BuildError>
    where
        H: Handler<Args>,
        Args: 'static,
    {
        let name = std::any::type_name::<H>();
        let compile = |registry: &Registry| -> Result<Route, BuildError> {
            Route::compile(<H as Handler<Args>>::signature()?, erase::<H, Args>(handler), registry, self.options(prefix))
        };
        let route = match &self.registry {
            Some(registry) => compile(registry),
            None => compile(&registry::registry()),
        }
        .map_err(|e| BuildError::endpoint(name, e))?;
        router.insert(route).map_err(|e| BuildError::endpoint(name, e))
    }

    fn compile_api<A: Api>(
        &self,
        registry: &Registry,
        prefix: &str,
        api: Arc<A>,
        out: &mut Compiled,
    ) -> Result<(), BuildError> {
        debug!(api = std::any::type_name::<A>(), prefix, "compiling");
        let ApiBuilder { endpoints, groups } = ApiBuilder::<A>::describe();

        for Endpoint { name, signature, bind } in endpoints {
            let route = signature
                .and_then(|signature| Route::compile(signature, bind(Arc::clone(&api)), registry, self.options(prefix)))
                .map_err(|e| BuildError::endpoint(&name, e))?;
            out.push((name, route));
        }

        for group in groups {
            for part in group.directive.split(';') {
                let (key, value) = split_directive(part.trim());
                if key != "httppath" {
                    continue;
                }
                let sub = join_paths(&[prefix, value]);
                debug!(group = %group.name, prefix = %sub, "registering group");
                (group.register)(self, registry, &sub, &api, out)?;
            }
        }
        Ok(())
    }

    fn options(&self, prefix: &str) -> RouteOptions {
        RouteOptions {
            prefix: join_paths(&[&self.root, prefix]),
            consumes: self.consumes.clone(),
            produces: self.produces.clone(),
            attributes: self.attributes.clone(),
            hooks: self.hooks.clone(),
            map_errors: self.map_errors.clone(),
        }
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("root", &self.root)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("attributes", &self.attributes)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

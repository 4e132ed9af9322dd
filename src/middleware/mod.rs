//! Request hooks.
//!
//! A hook runs on every request to a route before its record is bound. It
//! sees the [`Context`] the handler will receive and the route's
//! [`RouteInfo`], and is the place for cross-cutting concerns such as
//! tagging the context with a tenant or a request id.
//!
//! Hooks are registered on a [`Registrar`](crate::Registrar) and run in
//! registration order. There is no chain to short-circuit: a hook that needs
//! to reject a request should record that in the context for the handler.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::route::RouteInfo;

/// One hook.
pub type Hook = Arc<dyn Fn(&mut Context, &RouteInfo) + Send + Sync>;

/// An ordered list of hooks.
#[derive(Clone, Default)]
pub struct Hooks(Vec<Hook>);

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, hook: F)
    where
        F: Fn(&mut Context, &RouteInfo) + Send + Sync + 'static,
    {
        self.0.push(Arc::new(hook));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn apply(&self, ctx: &mut Context, info: &RouteInfo) {
        for hook in &self.0 {
            hook(&mut *ctx, info);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hooks").field(&self.0.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_run_in_order() {
        let mut hooks = Hooks::new();
        hooks.push(|ctx, _| ctx.set_attribute("seen", "first"));
        hooks.push(|ctx, info| {
            let previous = ctx.attribute("seen").cloned().unwrap_or_default();
            ctx.set_attribute("seen", format!("{}+{}", previous.as_str().unwrap_or_default(), info.path));
        });
        let mut ctx = Context::new();
        let info = RouteInfo { path: "/x".into(), ..RouteInfo::default() };
        hooks.apply(&mut ctx, &info);
        assert_eq!(ctx.attribute("seen"), Some(&serde_json::json!("first+/x")));
        assert_eq!(hooks.len(), 2);
    }
}

//! Per-request context handed to handlers that ask for it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

/// Request-scoped values plus a cancellation signal.
///
/// A handler receives the context by declaring a `Context` parameter. The
/// signal fires when the server starts a graceful shutdown; long-running
/// handlers can select on [`Context::cancelled`].
#[derive(Clone, Debug, Default)]
pub struct Context {
    route: Option<Arc<str>>,
    attributes: BTreeMap<String, serde_json::Value>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_shutdown(shutdown: watch::Receiver<bool>) -> Self {
        Self { shutdown: Some(shutdown), ..Self::default() }
    }

    pub(crate) fn set_route(&mut self, route: Arc<str>) {
        self.route = Some(route);
    }

    /// `"METHOD /path"` of the route being served, once matched.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// A value set by a registrar attribute or a hook.
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the request is cancelled. Never resolves for a context
    /// without a shutdown signal.
    pub async fn cancelled(&self) {
        let Some(mut rx) = self.shutdown.clone() else {
            return std::future::pending().await;
        };
        // A closed channel means the server is gone; treat it as cancelled.
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

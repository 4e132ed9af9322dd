//! Built-in health-check endpoints.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Can it serve traffic right now? |
//!
//! Mount them like any other [`Api`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use restbind::{Registrar, Router, health::Health};
//!
//! let health = Arc::new(Health::new());
//! let mut router = Router::new();
//! Registrar::new("/").mount(&mut router, "", Arc::clone(&health));
//!
//! // Flip to 503 while warming up or draining.
//! health.set_ready(false);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::StatusCode;

use crate::metadata::{FieldSpec, HttpGet, Metadata};
use crate::registrar::{Api, ApiBuilder};
use crate::response::Response;

/// Liveness and readiness probes.
#[derive(Debug)]
pub struct Health {
    ready: AtomicBool,
}

impl Health {
    /// Starts out ready.
    pub fn new() -> Self {
        Self { ready: AtomicBool::new(true) }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Always `200 ok`. No dependencies.
    async fn liveness(self: Arc<Self>, _: Liveness) -> Response {
        Response::text("ok")
    }

    async fn readiness(self: Arc<Self>, _: Readiness) -> Response {
        if self.is_ready() {
            Response::text("ready")
        } else {
            Response::text("not ready").with_status(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

impl Api for Health {
    fn describe(api: &mut ApiBuilder<Self>) {
        api.endpoint("liveness", Self::liveness).endpoint("readiness", Self::readiness);
    }
}

#[derive(Default)]
struct Liveness {
    get: HttpGet,
}

impl Metadata for Liveness {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Path", "httppath:healthz"),
            FieldSpec::marker("Doc", "doc").description("Liveness probe"),
        ]
    }
}

#[derive(Default)]
struct Readiness {
    get: HttpGet,
}

impl Metadata for Readiness {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Path", "httppath:readyz"),
            FieldSpec::marker("Doc", "doc").description("Readiness probe"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::registrar::Registrar;
    use crate::router::Router;

    fn get(path: &str) -> http::Request<Bytes> {
        http::Request::get(path).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn probes_answer_and_follow_the_ready_flag() {
        let health = Arc::new(Health::new());
        let mut router = Router::new();
        Registrar::new("/").register(&mut router, "", Arc::clone(&health)).unwrap();

        let live = router.handle(get("/healthz")).await;
        assert_eq!((live.status_code(), live.body()), (StatusCode::OK, b"ok".as_slice()));

        health.set_ready(false);
        let ready = router.handle(get("/readyz")).await;
        assert_eq!(ready.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let docs: Vec<_> = router.routes().map(|r| r.doc.as_str()).collect();
        assert_eq!(docs, ["Liveness probe", "Readiness probe"]);
    }
}

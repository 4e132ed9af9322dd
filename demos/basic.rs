//! Minimal restbind example: a small JSON API with a nested group, a custom
//! error, and health checks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users?limit=2
//!   curl http://localhost:3000/api/users/1
//!   curl http://localhost:3000/api/users/bogus
//!   curl -X POST http://localhost:3000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"grace"}'
//!   curl http://localhost:3000/api/users/1/posts
//!   curl http://localhost:3000/healthz

use std::collections::BTreeMap;
use std::sync::Arc;

use http::StatusCode;
use parking_lot::RwLock;
use restbind::health::Health;
use restbind::{
    Api, ApiBuilder, ApiError, Context, FieldSpec, HttpGet, HttpPost, Json, Metadata, Registrar, RenderError,
    Response, ResponseWriter, Router, Server, register_error_renderer,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    id: u64,
    name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("user {0} not found")]
struct UserNotFound(u64);

impl RenderError for UserNotFound {
    fn render_error(&self, w: &mut ResponseWriter) {
        w.write_entity(StatusCode::NOT_FOUND, &serde_json::json!({ "missing": self.0 }));
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ListUsers {
    get: HttpGet,
    limit: usize,
}

impl Metadata for ListUsers {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Doc", "doc").description("List users"),
            FieldSpec::new("Limit", |m: &mut Self| &mut m.limit)
                .api("query:limit,max")
                .default_value("10")
                .description("Page size"),
        ]
    }
}

#[derive(Default)]
struct GetUser {
    get: HttpGet,
    id: u64,
}

impl Metadata for GetUser {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Path", "httppath:{id}"),
            FieldSpec::new("ID", |m: &mut Self| &mut m.id).api("path:id"),
        ]
    }
}

#[derive(Default)]
struct CreateUser {
    post: HttpPost,
    user: Json<User>,
}

impl Metadata for CreateUser {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpPost", |m: &mut Self| &mut m.post),
            FieldSpec::new("User", |m: &mut Self| &mut m.user).api("body:consumes:application/json"),
        ]
    }
}

#[derive(Default)]
struct ListPosts {
    get: HttpGet,
    user: u64,
}

impl Metadata for ListPosts {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::new("User", |m: &mut Self| &mut m.user).api("path:id"),
        ]
    }
}

// ── APIs ──────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Posts;

impl Posts {
    async fn list(self: Arc<Self>, m: ListPosts) -> Json<Vec<String>> {
        Json(vec![format!("hello from user {}", m.user)])
    }
}

impl Api for Posts {
    fn describe(api: &mut ApiBuilder<Self>) {
        api.endpoint("list", Self::list);
    }
}

#[derive(Default)]
struct Users {
    store: RwLock<BTreeMap<u64, User>>,
}

impl Users {
    async fn list(self: Arc<Self>, m: ListUsers) -> Json<Vec<User>> {
        Json(self.store.read().values().take(m.limit).cloned().collect())
    }

    async fn get(self: Arc<Self>, m: GetUser) -> Result<Json<User>, UserNotFound> {
        self.store.read().get(&m.id).cloned().map(Json).ok_or(UserNotFound(m.id))
    }

    async fn create(self: Arc<Self>, ctx: Context, m: CreateUser) -> Result<Response, ApiError> {
        let mut user = m.user.into_inner();
        if user.name.is_empty() {
            return Err(ApiError::response(StatusCode::UNPROCESSABLE_ENTITY, "name is required"));
        }
        let mut store = self.store.write();
        user.id = store.keys().next_back().map_or(1, |id| id + 1);
        store.insert(user.id, user.clone());
        tracing::info!(route = ctx.route(), id = user.id, "created user");

        let body = serde_json::to_vec(&user).map_err(|e| ApiError::response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        Ok(Response::json(body)
            .with_status(StatusCode::CREATED)
            .with_header("location", &format!("/api/users/{}", user.id)))
    }
}

impl Api for Users {
    fn describe(api: &mut ApiBuilder<Self>) {
        api.endpoint("list", Self::list)
            .endpoint("get", Self::get)
            .endpoint("create", Self::create)
            .group_default::<Posts>("Posts", "httppath:{id}/posts");
    }
}

#[tokio::main]
async fn main() -> Result<(), restbind::Error> {
    tracing_subscriber::fmt::init();
    register_error_renderer::<UserNotFound>();

    let users = Arc::new(Users::default());
    users.store.write().insert(1, User { id: 1, name: "ada".into() });

    let mut router = Router::new();
    Registrar::new("/api")
        .produces(["application/json"])
        .register(&mut router, "users", users)?;
    Registrar::new("/").register(&mut router, "", Arc::new(Health::new()))?;

    for route in router.routes() {
        tracing::info!(method = ?route.method, path = %route.path, doc = %route.doc, "route");
    }

    Server::bind("0.0.0.0:3000").serve(router).await
}

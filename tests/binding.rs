mod common;

use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use restbind::registry::{self, FieldTarget, Registry};
use restbind::{
    ApiError, Context, DirectiveError, FieldSpec, FormValues, HttpGet, HttpPatch, HttpPost, Json, Metadata,
    MultipartForm, Registrar, Request, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::{error_body, get, json, request};

fn router_with<H, Args>(handler: H) -> Router
where
    H: restbind::Handler<Args>,
    Args: 'static,
{
    common::init_tracing();
    let mut router = Router::new();
    Registrar::new("/").route(&mut router, "", handler).unwrap();
    router
}

// ── Query ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Search {
    get: HttpGet,
    term: String,
    limit: u32,
    tags: Vec<String>,
    page: Option<u32>,
}

impl Metadata for Search {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Path", "httppath:search"),
            FieldSpec::new("Term", |m: &mut Self| &mut m.term).api("query:q,query"),
            FieldSpec::new("Limit", |m: &mut Self| &mut m.limit).api("query:limit").default_value("10"),
            FieldSpec::new("Tags", |m: &mut Self| &mut m.tags).api("query:tag"),
            FieldSpec::new("Page", |m: &mut Self| &mut m.page).api("query:page"),
        ]
    }
}

async fn search(m: Search) -> serde_json::Value {
    json!({ "term": m.term, "limit": m.limit, "tags": m.tags, "page": m.page })
}

#[tokio::test]
async fn query_aliases_defaults_and_sequences() {
    let router = router_with(search);

    let res = router.handle(get("/search?query=old&limit=3&tag=a&tag=b")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(json(&res), json!({ "term": "old", "limit": 3, "tags": ["a", "b"], "page": null }));

    let res = router.handle(get("/search?q=new&query=old&page=2")).await;
    assert_eq!(json(&res), json!({ "term": "new", "limit": 10, "tags": [], "page": 2 }));

    let res = router.handle(get("/search?limit=-1")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let err = error_body(&res);
    assert_eq!(err.kind, "QueryParameterError");
    assert_eq!(err.parameter.as_deref(), Some("limit"));
}

#[tokio::test]
async fn query_parameters_are_documented() {
    let router = router_with(search);
    let info = router.routes().next().unwrap();
    let names: Vec<_> = info.query_parameters.iter().map(|p| (p.name.as_str(), p.allow_multiple)).collect();
    assert_eq!(names, [("q", false), ("query", false), ("limit", false), ("tag", true), ("page", false)]);
    assert_eq!(info.query_parameters[1].description, r#"Deprecated; use "q" instead."#);
    let codes: Vec<_> = info.responses.iter().map(|r| r.code).collect();
    assert_eq!(codes, [200, 400]);
}

// ── Path and header ───────────────────────────────────────────────────────────

#[derive(Default)]
struct GetItem {
    get: HttpGet,
    id: u64,
    tenant: String,
    retries: Option<u8>,
}

impl Metadata for GetItem {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Path", "httppath:items/{id}"),
            FieldSpec::new("ID", |m: &mut Self| &mut m.id).api("path:id").description("Item id"),
            FieldSpec::new("Tenant", |m: &mut Self| &mut m.tenant).api("header:X-Tenant"),
            FieldSpec::new("Retries", |m: &mut Self| &mut m.retries).api("header:X-Retries"),
        ]
    }
}

async fn get_item(m: GetItem) -> serde_json::Value {
    json!({ "id": m.id, "tenant": m.tenant, "retries": m.retries })
}

#[tokio::test]
async fn path_parameters_parse_into_typed_fields() {
    let router = router_with(get_item);

    let req = http::Request::get("/items/42")
        .header("x-tenant", "acme")
        .header("x-retries", "3")
        .body(Bytes::new())
        .unwrap();
    let res = router.handle(req).await;
    assert_eq!(json(&res), json!({ "id": 42, "tenant": "acme", "retries": 3 }));

    let res = router.handle(get("/items/bogus")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let err = error_body(&res);
    assert_eq!(err.kind, "PathParameterError");
    assert_eq!(err.parameter.as_deref(), Some("id"));
    assert!(err.message.contains("bogus"), "{}", err.message);
}

#[derive(Default)]
struct Label {
    get: HttpGet,
    name: String,
    id: u64,
}

impl Metadata for Label {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Path", "httppath:labels/{name}/{id}"),
            FieldSpec::new("Name", |m: &mut Self| &mut m.name).api("path:name"),
            FieldSpec::new("ID", |m: &mut Self| &mut m.id).api("path:id"),
        ]
    }
}

async fn label(m: Label) -> serde_json::Value {
    json!({ "name": m.name, "id": m.id })
}

#[tokio::test]
async fn path_parameters_are_percent_decoded() {
    let router = router_with(label);

    let res = router.handle(get("/labels/a%20b/%34%32")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json(&res), json!({ "name": "a b", "id": 42 }));

    let res = router.handle(get("/labels/%FF/1")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let err = error_body(&res);
    assert_eq!(err.kind, "PathParameterError");
    assert_eq!(err.parameter.as_deref(), Some("name"));
}

#[tokio::test]
async fn missing_headers_fail_unless_the_field_is_text() {
    let router = router_with(get_item);

    let res = router.handle(get("/items/7")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let err = error_body(&res);
    assert_eq!(err.kind, "HeaderParameterError");
    assert_eq!(err.parameter.as_deref(), Some("X-Retries"));

    let req = http::Request::get("/items/7").header("x-retries", "1").body(Bytes::new()).unwrap();
    let res = router.handle(req).await;
    assert_eq!(json(&res)["tenant"], "");
}

#[tokio::test]
async fn headers_that_are_not_utf8_are_rejected() {
    let router = router_with(get_item);
    let req = http::Request::get("/items/7")
        .header("x-tenant", HeaderValue::from_bytes(b"caf\xe9").unwrap())
        .header("x-retries", "1")
        .body(Bytes::new())
        .unwrap();
    let res = router.handle(req).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let err = error_body(&res);
    assert_eq!(err.kind, "HeaderParameterError");
    assert_eq!(err.parameter.as_deref(), Some("X-Tenant"));
}

#[tokio::test]
async fn unknown_paths_and_methods_are_not_found() {
    let router = router_with(get_item);
    assert_eq!(router.handle(get("/nope")).await.status_code(), StatusCode::NOT_FOUND);
    let post = request("POST", "/items/1", "application/json", "{}");
    assert_eq!(router.handle(post).await.status_code(), StatusCode::NOT_FOUND);
}

// ── Bodies ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Item {
    id: u64,
    name: String,
}

#[derive(Default)]
struct CreateItem {
    post: HttpPost,
    item: Json<Item>,
}

impl Metadata for CreateItem {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpPost", |m: &mut Self| &mut m.post),
            FieldSpec::marker("Path", "httppath:items"),
            FieldSpec::new("Item", |m: &mut Self| &mut m.item).api("body:consumes:application/json"),
        ]
    }
}

async fn create_item(m: CreateItem) -> Result<Json<Item>, ApiError> {
    if m.item.name.is_empty() {
        return Err(ApiError::response(StatusCode::UNPROCESSABLE_ENTITY, "name is required"));
    }
    Ok(Json(Item { id: 1, ..m.item.into_inner() }))
}

#[tokio::test]
async fn json_bodies_decode_into_the_field() {
    let router = router_with(create_item);

    let res = router.handle(request("POST", "/items", "application/json", r#"{"id":0,"name":"lamp"}"#)).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json(&res), json!({ "id": 1, "name": "lamp" }));

    let res = router.handle(request("POST", "/items", "application/json", "{not json")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_body(&res).kind, "BodyError");

    let res = router.handle(request("POST", "/items", "application/json", r#"{"id":0,"name":""}"#)).await;
    assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let err = error_body(&res);
    assert_eq!((err.kind.as_str(), err.message.as_str()), ("ResponseError", "name is required"));

    let info = router.routes().next().unwrap();
    assert_eq!(info.consumes, ["application/json"]);
    assert_eq!(info.body_example, Some(json!({ "id": 0, "name": "" })));
    assert_eq!(info.response_example, Some(json!({ "id": 0, "name": "" })));
}

#[derive(Default)]
struct PatchItem {
    patch: HttpPatch,
    changes: Option<Json<Item>>,
}

impl Metadata for PatchItem {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpPatch", |m: &mut Self| &mut m.patch),
            FieldSpec::marker("Path", "httppath:items"),
            FieldSpec::new("Changes", |m: &mut Self| &mut m.changes).api("body:empty"),
        ]
    }
}

async fn patch_item(m: PatchItem) -> String {
    match m.changes {
        Some(item) => item.0.name,
        None => "unchanged".to_owned(),
    }
}

#[tokio::test]
async fn empty_bodies_are_allowed_when_declared() {
    let router = router_with(patch_item);

    let res = router.handle(request("PATCH", "/items", "application/json", "")).await;
    assert_eq!(json(&res), json!("unchanged"));

    let res = router.handle(request("PATCH", "/items", "application/json", r#"{"id":2,"name":"desk"}"#)).await;
    assert_eq!(json(&res), json!("desk"));

    assert!(router.routes().next().unwrap().body_example.is_none());
}

#[derive(Default)]
struct Submit {
    post: HttpPost,
    form: FormValues,
}

impl Metadata for Submit {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpPost", |m: &mut Self| &mut m.post),
            FieldSpec::marker("Path", "httppath:submit"),
            FieldSpec::new("Form", |m: &mut Self| &mut m.form).api("body"),
        ]
    }
}

async fn submit(m: Submit) -> serde_json::Value {
    json!({ "colors": m.form.get_all("color"), "name": m.form.get("name") })
}

#[tokio::test]
async fn url_encoded_forms_bind_to_form_values() {
    let router = router_with(submit);
    let res = router
        .handle(request("POST", "/submit", restbind::FORM_URLENCODED, "name=a%20b&color=red&color=blue"))
        .await;
    assert_eq!(json(&res), json!({ "colors": ["red", "blue"], "name": "a b" }));
    assert_eq!(router.routes().next().unwrap().consumes, [restbind::FORM_URLENCODED]);
}

#[derive(Default)]
struct Upload {
    post: HttpPost,
    form: MultipartForm,
}

impl Metadata for Upload {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpPost", |m: &mut Self| &mut m.post),
            FieldSpec::marker("Path", "httppath:upload"),
            FieldSpec::new("Form", |m: &mut Self| &mut m.form).api("body"),
        ]
    }
}

async fn upload(m: Upload) -> serde_json::Value {
    let files: Vec<_> = m
        .form
        .files("doc")
        .iter()
        .map(|f| json!({ "name": f.file_name, "size": f.data.len() }))
        .collect();
    json!({ "title": m.form.values.get("title"), "files": files })
}

#[tokio::test]
async fn multipart_forms_split_fields_and_files() {
    let router = router_with(upload);
    let body = concat!(
        "--b0undary\r\n",
        "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
        "report\r\n",
        "--b0undary\r\n",
        "Content-Disposition: form-data; name=\"doc\"; filename=\"q3.csv\"\r\n",
        "Content-Type: text/csv\r\n\r\n",
        "a,b,c\r\n",
        "--b0undary--\r\n",
    );
    let res = router
        .handle(request("POST", "/upload", "multipart/form-data; boundary=b0undary", body))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json(&res), json!({ "title": "report", "files": [{ "name": "q3.csv", "size": 5 }] }));

    let res = router.handle(request("POST", "/upload", "multipart/form-data", body)).await;
    assert_eq!(error_body(&res).kind, "BodyError");
}

// ── Request handles and context ───────────────────────────────────────────────

#[derive(Default)]
struct Echo {
    post: HttpPost,
    req: Request,
    raw: http::Request<Bytes>,
    text: String,
}

impl Metadata for Echo {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpPost", |m: &mut Self| &mut m.post),
            FieldSpec::marker("Path", "httppath:echo/{word}"),
            FieldSpec::new("Req", |m: &mut Self| &mut m.req).api("request"),
            FieldSpec::new("Raw", |m: &mut Self| &mut m.raw).api("httprequest"),
            FieldSpec::new("Text", |m: &mut Self| &mut m.text).api("body:consumes:text/plain"),
        ]
    }
}

async fn echo(ctx: Context, m: Echo) -> serde_json::Value {
    json!({
        "route": ctx.route(),
        "word": m.req.param("word"),
        "raw_path": m.raw.uri().path(),
        "text": m.text,
    })
}

#[tokio::test]
async fn request_handles_and_context_reach_the_handler() {
    let router = router_with(echo);
    let res = router.handle(request("POST", "/echo/hi", "text/plain", "hello there")).await;
    assert_eq!(
        json(&res),
        json!({ "route": "POST /echo/{word}", "word": "hi", "raw_path": "/echo/hi", "text": "hello there" })
    );
}

// ── Custom directives ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Scaled {
    get: HttpGet,
    base: u32,
    scaled: Vec<u32>,
}

impl Metadata for Scaled {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Path", "httppath:scaled"),
            FieldSpec::new("Base", |m: &mut Self| &mut m.base).api("query:base"),
            FieldSpec::new("Scaled", |m: &mut Self| &mut m.scaled).api("scale:1,2"),
        ]
    }
}

async fn scaled(m: Scaled) -> Json<Vec<u32>> {
    Json(m.scaled)
}

/// Multiplies the already-bound `base` field by each factor in the argument.
fn scale_directive() -> Registry {
    let mut registry = Registry::with_builtins();
    registry.register("scale", |arg, field, _route| {
        if !field.shape.is_sequence() {
            return Err(DirectiveError::BadType { expected: "Vec<u32>", found: field.type_name });
        }
        let factors = arg
            .split(',')
            .map(|f| f.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DirectiveError::Other(e.to_string()))?;
        Ok(Some(registry::bind_fn(move |target: &mut FieldTarget<'_>, _| {
            let base = target
                .record()
                .downcast_ref::<Scaled>()
                .map(|record| record.base)
                .ok_or_else(|| ApiError::response(StatusCode::INTERNAL_SERVER_ERROR, "unexpected record"))?;
            *target.downcast_mut::<Vec<u32>>()? = factors.iter().map(|f| f * base).collect();
            Ok(())
        })))
    });
    registry
}

#[tokio::test]
async fn later_binders_read_fields_bound_earlier() {
    common::init_tracing();
    let mut router = Router::new();
    Registrar::new("/")
        .with_registry(scale_directive())
        .route(&mut router, "", scaled)
        .unwrap();

    let res = router.handle(get("/scaled?base=21")).await;
    assert_eq!(json(&res), json!([21, 42]));
    let res = router.handle(get("/scaled")).await;
    assert_eq!(json(&res), json!([0, 0]));
}

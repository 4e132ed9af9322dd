#![allow(dead_code)]

use bytes::Bytes;
use restbind::{ErrorBody, Response};

pub fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::get(uri).body(Bytes::new()).unwrap()
}

pub fn request(method: &str, uri: &str, content_type: &str, body: impl Into<Bytes>) -> http::Request<Bytes> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", content_type)
        .body(body.into())
        .unwrap()
}

pub fn json(res: &Response) -> serde_json::Value {
    serde_json::from_slice(res.body()).unwrap_or_else(|e| panic!("not json ({e}): {:?}", String::from_utf8_lossy(res.body())))
}

pub fn error_body(res: &Response) -> ErrorBody {
    serde_json::from_slice(res.body()).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

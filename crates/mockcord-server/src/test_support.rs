//! Shared plumbing for the route tests: an app wired to the in-memory store
//! and request helpers over `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::{build_app, config::ServerConfig, memstore::MemoryStore, AppState};

/// RFC 8032 test-vector seed; any fixed 32 bytes would do.
pub const TEST_PRIVATE_KEY_HEX: &str =
    "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

pub fn test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(Arc::new(ServerConfig::default()), store.clone(), "memory")
        .expect("state builds");
    (build_app(state), store)
}

pub fn tenant_fixture() -> Value {
    json!({
        "botToken": "bot-secret",
        "clientId": "client-123",
        "clientSecret": "shh",
        "publicKey": mockcord_crypto::public_key_hex(TEST_PRIVATE_KEY_HEX).expect("derives"),
        "privateKey": TEST_PRIVATE_KEY_HEX,
        "guilds": [
            {"id": "g", "name": "Guild", "channels": [{"id": "c", "name": "general"}]},
        ],
    })
}

pub fn bot_auth() -> (&'static str, &'static str) {
    ("authorization", "Bot bot-secret")
}

/// Create the standard fixture tenant through the API and return its id.
pub async fn create_tenant(app: &Router) -> String {
    let (status, body) = send(app, "POST", "/_test/tenants", &[], Some(tenant_fixture())).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().expect("tenant id").to_string()
}

pub async fn send_raw(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("request runs")
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .expect("request builds"),
        None => builder.body(Body::empty()).expect("request builds"),
    };
    into_parts(send_raw(app, request).await).await
}

/// Like [`send`] but with a caller-supplied raw body and no implied
/// content type.
pub async fn send_text(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Body::from(body.to_string()))
        .expect("request builds");
    into_parts(send_raw(app, request).await).await
}

pub async fn send_form(app: &Router, uri: &str, pairs: &[(&str, &str)]) -> (StatusCode, Value) {
    let body = serde_urlencoded::to_string(pairs).expect("form encodes");
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request builds");
    into_parts(send_raw(app, request).await).await
}

async fn into_parts(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

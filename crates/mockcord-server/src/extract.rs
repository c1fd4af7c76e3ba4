use axum::body::Bytes;
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// Media-type check that tolerates parameters (`application/json; charset=utf-8`).
fn content_type_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case(expected)
        })
        .unwrap_or(false)
}

/// Parse a JSON request body. Wrong or missing content type and malformed
/// JSON both collapse into the same `Invalid request body` response the real
/// API would give.
pub fn json_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, ApiError> {
    if !content_type_matches(headers, "application/json") {
        return Err(ApiError::InvalidBody);
    }
    serde_json::from_slice(body).map_err(|_| ApiError::InvalidBody)
}

/// Parse an `application/x-www-form-urlencoded` body (the token exchange).
pub fn form_body<T: DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Result<T, ApiError> {
    if !content_type_matches(headers, "application/x-www-form-urlencoded") {
        return Err(ApiError::InvalidBody);
    }
    serde_urlencoded::from_bytes(body).map_err(|_| ApiError::InvalidBody)
}

/// The only field the fake ever pulls out of a message payload; everything
/// else is stored verbatim.
pub fn content_field(payload: &Value) -> String {
    payload
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

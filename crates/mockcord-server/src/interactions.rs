use chrono::Utc;
use mockcord_storage::TenantRecord;
use serde_json::Value;

use crate::{error::ApiError, AppState};

#[derive(Debug)]
pub struct Delivery {
    pub status_code: u16,
    pub body: Value,
}

/// Push a signed interaction at the system under test. The interaction is
/// serialized exactly once; the same bytes are covered by the signature and
/// sent as the request body, so the receiver's verification sees what we
/// signed.
pub async fn deliver(
    state: &AppState,
    tenant: &TenantRecord,
    webhook_url: &str,
    interaction: &Value,
) -> Result<Delivery, ApiError> {
    let body = serde_json::to_vec(interaction).map_err(|err| ApiError::Internal(err.into()))?;
    let timestamp = Utc::now().timestamp().to_string();
    let signature = mockcord_crypto::sign_interaction(&tenant.private_key, &timestamp, &body)
        .map_err(ApiError::Internal)?;

    let response = state
        .http()
        .post(webhook_url)
        .header("X-Signature-Ed25519", signature)
        .header("X-Signature-Timestamp", timestamp)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|err| ApiError::WebhookFailed(err.to_string()))?;

    let status_code = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

    Ok(Delivery { status_code, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_tenant, send, test_app, TEST_PRIVATE_KEY_HEX};
    use axum::http::StatusCode;
    use axum::{extract::Request, routing::post, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Captured {
        signature: String,
        timestamp: String,
        body: Vec<u8>,
    }

    async fn spawn_receiver(captured: Arc<Mutex<Captured>>) -> String {
        let app = Router::new().route(
            "/webhook",
            post(move |request: Request| {
                let captured = captured.clone();
                async move {
                    let (parts, body) = request.into_parts();
                    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
                    let header = |name: &str| {
                        parts
                            .headers
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string()
                    };
                    let mut slot = captured.lock().unwrap();
                    slot.signature = header("x-signature-ed25519");
                    slot.timestamp = header("x-signature-timestamp");
                    slot.body = bytes.to_vec();
                    axum::Json(json!({"type": 1}))
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        format!("http://{addr}/webhook")
    }

    #[tokio::test]
    async fn delivered_signature_verifies_over_timestamp_and_body() {
        let (app, _store) = test_app();
        let tenant_id = create_tenant(&app).await;

        let captured = Arc::new(Mutex::new(Captured::default()));
        let url = spawn_receiver(captured.clone()).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/_test/{tenant_id}/send-interaction"),
            &[],
            Some(json!({
                "webhookUrl": url,
                "interaction": {"type": 2, "data": {"name": "ping"}},
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["statusCode"], 200);
        assert_eq!(body["body"], json!({"type": 1}));

        let slot = captured.lock().unwrap();
        assert!(!slot.signature.is_empty());
        assert_eq!(slot.signature, slot.signature.to_lowercase());

        let public_hex = mockcord_crypto::public_key_hex(TEST_PRIVATE_KEY_HEX).unwrap();
        let message = mockcord_crypto::interaction_message(&slot.timestamp, &slot.body);
        assert!(
            mockcord_crypto::verify_interaction(&slot.signature, &message, &public_hex).unwrap(),
            "signature covers timestamp || body"
        );

        let parsed: serde_json::Value = serde_json::from_slice(&slot.body).unwrap();
        assert_eq!(parsed["type"], 2);
        assert_eq!(parsed["data"]["name"], "ping");
    }

    #[tokio::test]
    async fn unreachable_webhook_is_502() {
        let (app, _store) = test_app();
        let tenant_id = create_tenant(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/_test/{tenant_id}/send-interaction"),
            &[],
            Some(json!({
                "webhookUrl": "http://127.0.0.1:9/webhook",
                "interaction": {"type": 1},
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let error = body["error"].as_str().expect("error string");
        assert!(error.starts_with("Webhook request failed: "));
    }
}

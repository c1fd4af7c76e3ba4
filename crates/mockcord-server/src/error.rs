use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Every error surface the impersonated and test-control endpoints can emit.
/// Discord-shaped routes use the `message` key; OAuth and test-control routes
/// use the `error` key, matching what real clients expect to parse.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("401: Unauthorized")]
    Unauthorized,
    #[error("invalid_client")]
    InvalidClient,
    #[error("invalid_grant")]
    InvalidGrant,
    #[error("redirect_uri mismatch")]
    RedirectUriMismatch,
    #[error("Unknown client_id")]
    UnknownClientId,
    #[error("Unknown {0}")]
    UnknownEntity(&'static str),
    #[error("Tenant not found")]
    TenantNotFound,
    #[error("Invalid request body")]
    InvalidBody,
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} already in use")]
    CredentialTaken(&'static str),
    #[error("client_id mismatch")]
    ClientIdMismatch,
    #[error("Webhook request failed: {0}")]
    WebhookFailed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BotTokenTaken => ApiError::CredentialTaken("botToken"),
            StoreError::ClientIdTaken => ApiError::CredentialTaken("clientId"),
            StoreError::Storage(inner) => ApiError::Internal(inner),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({"message": "401: Unauthorized"}),
            ),
            ApiError::InvalidClient => {
                (StatusCode::UNAUTHORIZED, json!({"error": "invalid_client"}))
            }
            ApiError::InvalidGrant => {
                (StatusCode::UNAUTHORIZED, json!({"error": "invalid_grant"}))
            }
            ApiError::RedirectUriMismatch => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "invalid_request",
                    "error_description": "redirect_uri mismatch",
                }),
            ),
            ApiError::UnknownClientId => (
                StatusCode::BAD_REQUEST,
                json!({"error": "Unknown client_id"}),
            ),
            ApiError::UnknownEntity(entity) => (
                StatusCode::NOT_FOUND,
                json!({"message": format!("Unknown {entity}")}),
            ),
            ApiError::TenantNotFound => {
                (StatusCode::NOT_FOUND, json!({"error": "Tenant not found"}))
            }
            ApiError::InvalidBody => (
                StatusCode::BAD_REQUEST,
                json!({"message": "Invalid request body"}),
            ),
            ApiError::MissingField(field) => (
                StatusCode::BAD_REQUEST,
                json!({"error": format!("Missing required field: {field}")}),
            ),
            ApiError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, json!({"error": reason}))
            }
            ApiError::CredentialTaken(field) => (
                StatusCode::CONFLICT,
                json!({"error": format!("{field} already in use")}),
            ),
            ApiError::ClientIdMismatch => (
                StatusCode::BAD_REQUEST,
                json!({"message": "client_id mismatch"}),
            ),
            ApiError::WebhookFailed(detail) => (
                StatusCode::BAD_GATEWAY,
                json!({"error": format!("Webhook request failed: {detail}")}),
            ),
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal server error"}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unauthorized_matches_discord_shape() {
        let (status, body) = render(ApiError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({"message": "401: Unauthorized"}));
    }

    #[tokio::test]
    async fn redirect_mismatch_carries_description() {
        let (status, body) = render(ApiError::RedirectUriMismatch).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["error_description"], "redirect_uri mismatch");
    }

    #[tokio::test]
    async fn conflict_names_the_credential() {
        let (status, body) = render(ApiError::CredentialTaken("botToken")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "botToken already in use");
    }

    #[tokio::test]
    async fn unknown_entity_renders_404() {
        let (status, body) = render(ApiError::UnknownEntity("Channel")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Unknown Channel");
    }
}

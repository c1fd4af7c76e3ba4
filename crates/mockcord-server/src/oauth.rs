use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use mockcord_storage::AuthCodeRecord;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{audit::TenantContext, error::ApiError, extract, resolve, AppState};

const ACCESS_TOKEN_TTL_SECS: u64 = 604_800;

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    client_id: Option<String>,
    redirect_uri: Option<String>,
    state: Option<String>,
}

/// `GET /oauth2/authorize`. Issues a single-use code against the tenant's
/// first guild and bounces the caller back to their redirect URI. Real Discord
/// would render a consent screen; the fake goes straight to the redirect.
pub async fn authorize(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response, ApiError> {
    let client_id = query.client_id.as_deref().unwrap_or_default();
    let tenant = resolve::by_client_id(&state, client_id, &ctx)
        .await?
        .ok_or(ApiError::UnknownClientId)?;
    let redirect_uri = query
        .redirect_uri
        .ok_or_else(|| ApiError::MissingField("redirect_uri".into()))?;

    let guild = state.store().first_guild(tenant.id).await?.ok_or_else(|| {
        ApiError::Internal(anyhow::anyhow!("tenant {} has no guilds", tenant.id))
    })?;

    let code = format!("code-{}", Uuid::new_v4().simple());
    state
        .store()
        .insert_auth_code(&AuthCodeRecord {
            code: code.clone(),
            tenant_id: tenant.id,
            guild_id: guild.id.clone(),
            redirect_uri: redirect_uri.clone(),
        })
        .await?;

    let query_string = serde_urlencoded::to_string([
        ("code", code.as_str()),
        ("state", query.state.as_deref().unwrap_or_default()),
        ("guild_id", guild.id.as_str()),
    ])
    .map_err(|err| ApiError::Internal(err.into()))?;

    let location = format!("{redirect_uri}?{query_string}");
    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    #[allow(dead_code)]
    grant_type: Option<String>,
    code: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
}

/// `POST /api/v10/oauth2/token`. Validates the client, consumes the code, and
/// mints a bearer token. The consume is a single atomic delete, so a replayed
/// code loses even against a concurrent exchange. Note the code is spent
/// before the redirect-uri comparison: a mismatched exchange still burns it.
pub async fn token(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let form: TokenForm = extract::form_body(&headers, &body)?;

    let client_id = form.client_id.as_deref().ok_or(ApiError::InvalidClient)?;
    let tenant = resolve::by_client_id(&state, client_id, &ctx)
        .await?
        .ok_or(ApiError::InvalidClient)?;
    if form.client_secret.as_deref() != Some(tenant.client_secret.as_str()) {
        return Err(ApiError::InvalidClient);
    }

    let code = form.code.as_deref().ok_or(ApiError::InvalidGrant)?;
    let stored = state
        .store()
        .consume_auth_code(code)
        .await?
        .ok_or(ApiError::InvalidGrant)?;
    if stored.tenant_id != tenant.id {
        return Err(ApiError::InvalidGrant);
    }
    if form.redirect_uri.as_deref() != Some(stored.redirect_uri.as_str()) {
        return Err(ApiError::RedirectUriMismatch);
    }

    let access_token = format!("tok-{}", Uuid::new_v4().simple());
    state
        .store()
        .insert_access_token(tenant.id, &access_token)
        .await?;

    Ok(Json(json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": ACCESS_TOKEN_TTL_SECS,
        "scope": "identify",
        "guild_id": stored.guild_id,
    })))
}

/// `GET /api/v10/users/@me`: the synthetic user for a bearer token.
pub async fn users_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let tenant = resolve::by_bearer(&state, &headers, &ctx).await?;
    Ok(Json(json!({
        "id": format!("fake-user-{}", tenant.id),
        "username": "fakeuser",
        "global_name": format!("Fake User ({})", tenant.id),
        "discriminator": "0",
    })))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{create_tenant, send, send_form, send_raw, test_app};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn authorize_redirects_with_code_state_and_guild() {
        let (app, _store) = test_app();
        create_tenant(&app).await;

        let request = Request::builder()
            .method("GET")
            .uri("/oauth2/authorize?client_id=client-123&redirect_uri=https://sut.test/cb&state=xyz")
            .body(Body::empty())
            .unwrap();
        let response = send_raw(&app, request).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .expect("location header present");
        assert!(location.starts_with("https://sut.test/cb?code=code-"));
        assert!(location.contains("state=xyz"));
        assert!(location.contains("guild_id=g"));
    }

    #[tokio::test]
    async fn authorize_with_unknown_client_is_400() {
        let (app, _store) = test_app();
        let (status, body) = send(
            &app,
            "GET",
            "/oauth2/authorize?client_id=nobody&redirect_uri=https://sut.test/cb",
            &[],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown client_id");
    }

    #[tokio::test]
    async fn code_exchanges_once_and_bearer_resolves() {
        let (app, _store) = test_app();
        let tenant_id = create_tenant(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/_test/{tenant_id}/auth-code"),
            &[],
            Some(serde_json::json!({
                "guildId": "g",
                "redirectUri": "https://sut.test/cb",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = body["code"].as_str().expect("code issued").to_string();

        let exchange = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", "client-123"),
            ("client_secret", "shh"),
            ("redirect_uri", "https://sut.test/cb"),
        ];
        let (status, body) = send_form(&app, "/api/v10/oauth2/token", &exchange).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 604_800);
        assert_eq!(body["guild_id"], "g");
        let access_token = body["access_token"].as_str().expect("token issued").to_string();

        let (status, body) = send_form(&app, "/api/v10/oauth2/token", &exchange).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "replayed code is rejected");
        assert_eq!(body["error"], "invalid_grant");

        let (status, body) = send(
            &app,
            "GET",
            "/api/v10/users/@me",
            &[("authorization", &format!("Bearer {access_token}"))],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], format!("fake-user-{tenant_id}"));
        assert_eq!(body["username"], "fakeuser");
        assert_eq!(body["discriminator"], "0");
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid_client() {
        let (app, _store) = test_app();
        let tenant_id = create_tenant(&app).await;

        let (_, body) = send(
            &app,
            "POST",
            &format!("/_test/{tenant_id}/auth-code"),
            &[],
            Some(serde_json::json!({
                "guildId": "g",
                "redirectUri": "https://sut.test/cb",
            })),
        )
        .await;
        let code = body["code"].as_str().unwrap().to_string();

        let (status, body) = send_form(
            &app,
            "/api/v10/oauth2/token",
            &[
                ("code", code.as_str()),
                ("client_id", "client-123"),
                ("client_secret", "wrong"),
                ("redirect_uri", "https://sut.test/cb"),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_client");
    }

    #[tokio::test]
    async fn redirect_mismatch_still_consumes_the_code() {
        let (app, _store) = test_app();
        let tenant_id = create_tenant(&app).await;

        let (_, body) = send(
            &app,
            "POST",
            &format!("/_test/{tenant_id}/auth-code"),
            &[],
            Some(serde_json::json!({
                "guildId": "g",
                "redirectUri": "https://sut.test/cb",
            })),
        )
        .await;
        let code = body["code"].as_str().unwrap().to_string();

        let (status, body) = send_form(
            &app,
            "/api/v10/oauth2/token",
            &[
                ("code", code.as_str()),
                ("client_id", "client-123"),
                ("client_secret", "shh"),
                ("redirect_uri", "https://elsewhere.test/cb"),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["error_description"], "redirect_uri mismatch");

        let (status, body) = send_form(
            &app,
            "/api/v10/oauth2/token",
            &[
                ("code", code.as_str()),
                ("client_id", "client-123"),
                ("client_secret", "shh"),
                ("redirect_uri", "https://sut.test/cb"),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "mismatch burned the code");
        assert_eq!(body["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn users_me_without_bearer_is_401() {
        let (app, _store) = test_app();
        let (status, body) = send(&app, "GET", "/api/v10/users/@me", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "401: Unauthorized");
    }

    #[tokio::test]
    async fn token_exchange_requires_form_encoding() {
        let (app, _store) = test_app();
        create_tenant(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v10/oauth2/token",
            &[],
            Some(serde_json::json!({"client_id": "client-123"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid request body");
    }
}

use axum::http::{header::AUTHORIZATION, HeaderMap};
use mockcord_storage::TenantRecord;

use crate::{audit::TenantContext, error::ApiError, AppState};

/// Pull the token out of an `Authorization: Bot <token>` header.
pub fn bot_token(headers: &HeaderMap) -> Option<&str> {
    scheme_token(headers, "Bot ", "bot ")
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    scheme_token(headers, "Bearer ", "bearer ")
}

fn scheme_token<'a>(headers: &'a HeaderMap, scheme: &str, scheme_lower: &str) -> Option<&'a str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    value
        .strip_prefix(scheme)
        .or_else(|| value.strip_prefix(scheme_lower))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the tenant behind a bot credential. A missing header and an
/// unknown token are indistinguishable to the caller: both are 401.
pub async fn by_bot(
    state: &AppState,
    headers: &HeaderMap,
    ctx: &TenantContext,
) -> Result<TenantRecord, ApiError> {
    let token = bot_token(headers).ok_or(ApiError::Unauthorized)?;
    let tenant = state
        .store()
        .tenant_by_bot_token(token)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    ctx.set(tenant.id);
    Ok(tenant)
}

/// Resolve the tenant behind a bearer access token.
pub async fn by_bearer(
    state: &AppState,
    headers: &HeaderMap,
    ctx: &TenantContext,
) -> Result<TenantRecord, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    let tenant = state
        .store()
        .tenant_by_access_token(token)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    ctx.set(tenant.id);
    Ok(tenant)
}

/// Resolve by OAuth client id. Callers map `None` to the error their surface
/// requires (400 on authorize, 401 on token exchange, 404 on webhooks).
pub async fn by_client_id(
    state: &AppState,
    client_id: &str,
    ctx: &TenantContext,
) -> Result<Option<TenantRecord>, ApiError> {
    let tenant = state.store().tenant_by_client_id(client_id).await?;
    if let Some(tenant) = &tenant {
        ctx.set(tenant.id);
    }
    Ok(tenant)
}

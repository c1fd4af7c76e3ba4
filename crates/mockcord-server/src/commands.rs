use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use mockcord_storage::CommandRecord;
use serde_json::{json, Value};

use crate::{
    audit::TenantContext,
    error::ApiError,
    extract, resolve,
    store::assign_id,
    AppState,
};

/// `PUT /api/v10/applications/{client_id}/guilds/{guild_id}/commands`.
/// Replaces the whole command set for the guild. The path client id is
/// cross-checked against the authenticated tenant; a mismatch is a 400, not
/// a 404, because the caller's credential already proved who they are.
pub async fn bulk_overwrite(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((client_id, guild_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let tenant = resolve::by_bot(&state, &headers, &ctx).await?;
    if tenant.client_id != client_id {
        return Err(ApiError::ClientIdMismatch);
    }
    if !state.store().guild_exists(tenant.id, &guild_id).await? {
        return Err(ApiError::UnknownEntity("Guild"));
    }

    let payload = extract::json_body(&headers, &body)?;
    let Value::Array(items) = payload else {
        return Err(ApiError::InvalidBody);
    };

    let registered_at = Utc::now();
    let mut records = Vec::with_capacity(items.len());
    let mut rendered = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(mut echo) = item.clone() else {
            return Err(ApiError::InvalidBody);
        };

        let id = assign_id(state.store(), tenant.id, "cmd").await?;
        echo.insert("id".into(), json!(id));
        echo.insert("application_id".into(), json!(tenant.client_id));
        echo.insert("guild_id".into(), json!(guild_id));

        records.push(CommandRecord {
            tenant_id: tenant.id,
            id,
            guild_id: guild_id.clone(),
            payload: item,
            registered_at,
        });
        rendered.push(Value::Object(echo));
    }

    state
        .store()
        .replace_commands(tenant.id, &guild_id, &records)
        .await?;

    Ok(Json(Value::Array(rendered)))
}

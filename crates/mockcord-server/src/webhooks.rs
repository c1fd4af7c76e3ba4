use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use mockcord_storage::{FollowupRecord, InteractionResponseRecord};
use serde_json::{json, Value};

use crate::{
    audit::TenantContext,
    error::ApiError,
    extract, resolve,
    store::assign_id,
    AppState,
};

/// `PATCH /api/v10/webhooks/{client_id}/{token}/messages/@original`.
/// One response row per interaction token, replaced on every PATCH. Webhook
/// routes authenticate by path, not by header.
pub async fn edit_original_response(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((client_id, interaction_token)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let tenant = resolve::by_client_id(&state, &client_id, &ctx)
        .await?
        .ok_or(ApiError::UnknownEntity("Application"))?;
    let payload = extract::json_body(&headers, &body)?;

    let response_id = assign_id(state.store(), tenant.id, "resp").await?;
    state
        .store()
        .upsert_interaction_response(&InteractionResponseRecord {
            tenant_id: tenant.id,
            interaction_token,
            response_id: response_id.clone(),
            payload: payload.clone(),
            responded_at: Utc::now(),
        })
        .await?;

    Ok(Json(json!({
        "id": response_id,
        "content": extract::content_field(&payload),
    })))
}

/// `POST /api/v10/webhooks/{client_id}/{token}`: append-only followups.
pub async fn create_followup(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((client_id, interaction_token)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let tenant = resolve::by_client_id(&state, &client_id, &ctx)
        .await?
        .ok_or(ApiError::UnknownEntity("Application"))?;
    let payload = extract::json_body(&headers, &body)?;

    let id = assign_id(state.store(), tenant.id, "followup").await?;
    state
        .store()
        .insert_followup(&FollowupRecord {
            tenant_id: tenant.id,
            id: id.clone(),
            interaction_token,
            payload: payload.clone(),
            created_at: Utc::now(),
        })
        .await?;

    Ok(Json(json!({
        "id": id,
        "channel_id": "chan-followup",
        "content": extract::content_field(&payload),
    })))
}

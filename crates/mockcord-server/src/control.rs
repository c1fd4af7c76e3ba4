use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use mockcord_storage::{AuthCodeRecord, NewChannel, NewGuild, NewTenant, TenantRecord};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    audit::TenantContext,
    error::ApiError,
    extract, interactions,
    sweeper,
    AppState,
};

const DEFAULT_AUDIT_PAGE: i64 = 100;
const MAX_AUDIT_PAGE: i64 = 1000;

/// `POST /_test/tenants`
pub async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload = extract::json_body(&headers, &body)?;
    let new_tenant = parse_new_tenant(&payload)?;
    let record = state.store().create_tenant(&new_tenant).await?;
    Ok((StatusCode::CREATED, Json(json!({"id": record.id}))))
}

/// `DELETE /_test/tenants/{id}`. Cascades every child table. The request's
/// own audit entry stays tenant-less so nothing references the dead tenant
/// afterwards.
pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = parse_tenant_id(&tenant_id)?;
    if !state.store().delete_tenant(tenant_id).await? {
        return Err(ApiError::TenantNotFound);
    }
    Ok(Json(json!({"deleted": true})))
}

/// `POST /_test/{id}/reset`. Wipes mutable state, rewinds the counter, keeps
/// topology and credentials. Tenant-less audit entry for the same reason as
/// delete: the reset must leave the audit table empty for this tenant.
pub async fn reset_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = parse_tenant_id(&tenant_id)?;
    if !state.store().reset_tenant(tenant_id).await? {
        return Err(ApiError::TenantNotFound);
    }
    Ok(Json(json!({"reset": true})))
}

/// `GET /_test/{id}/messages/{channel}`: messages with their edit history.
pub async fn channel_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((tenant_id, channel_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let messages = state
        .store()
        .messages_in_channel(tenant.id, &channel_id)
        .await?;

    let rendered: Vec<Value> = messages
        .iter()
        .map(|entry| {
            json!({
                "id": entry.message.id,
                "channelId": entry.message.channel_id,
                "payload": entry.message.payload,
                "createdAt": entry.message.created_at,
                "editHistory": entry
                    .edits
                    .iter()
                    .map(|edit| json!({"payload": edit.payload, "editedAt": edit.edited_at}))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    Ok(Json(Value::Array(rendered)))
}

/// `GET /_test/{id}/reactions`
pub async fn reactions(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let reactions = state.store().reactions(tenant.id).await?;

    let rendered: Vec<Value> = reactions
        .iter()
        .map(|reaction| {
            json!({
                "channelId": reaction.channel_id,
                "messageId": reaction.message_id,
                "emoji": reaction.emoji,
                "createdAt": reaction.created_at,
            })
        })
        .collect();
    Ok(Json(Value::Array(rendered)))
}

/// `GET /_test/{id}/interaction-responses/{token}`: zero or one row.
pub async fn interaction_responses(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((tenant_id, interaction_token)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let response = state
        .store()
        .interaction_response(tenant.id, &interaction_token)
        .await?;

    let rendered: Vec<Value> = response
        .iter()
        .map(|row| {
            json!({
                "responseId": row.response_id,
                "payload": row.payload,
                "respondedAt": row.responded_at,
            })
        })
        .collect();
    Ok(Json(Value::Array(rendered)))
}

/// `GET /_test/{id}/followups/{token}`
pub async fn followups(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((tenant_id, interaction_token)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let followups = state
        .store()
        .followups(tenant.id, &interaction_token)
        .await?;

    let rendered: Vec<Value> = followups
        .iter()
        .map(|followup| {
            json!({
                "id": followup.id,
                "payload": followup.payload,
                "createdAt": followup.created_at,
            })
        })
        .collect();
    Ok(Json(Value::Array(rendered)))
}

/// `GET /_test/{id}/commands/{guild}`
pub async fn guild_commands(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((tenant_id, guild_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let commands = state.store().commands(tenant.id, &guild_id).await?;

    let rendered: Vec<Value> = commands
        .iter()
        .map(|command| {
            json!({
                "id": command.id,
                "guildId": command.guild_id,
                "payload": command.payload,
                "registeredAt": command.registered_at,
            })
        })
        .collect();
    Ok(Json(Value::Array(rendered)))
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

/// `GET /_test/{id}/audit-logs?limit&offset`. This path is exempt from the
/// audit middleware; retrieving the log never grows it.
pub async fn audit_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(tenant_id): Path<String>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Value>, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_PAGE).clamp(0, MAX_AUDIT_PAGE);
    let offset = query.offset.unwrap_or(0).max(0);

    let page = state.store().audit_logs(tenant.id, limit, offset).await?;
    let entries: Vec<Value> = page
        .entries
        .iter()
        .map(|entry| {
            json!({
                "id": entry.id,
                "tenantId": entry.tenant_id,
                "method": entry.method,
                "url": entry.url,
                "requestBody": entry.request_body,
                "responseStatus": entry.response_status,
                "responseBody": entry.response_body,
                "createdAt": entry.created_at,
            })
        })
        .collect();

    Ok(Json(json!({"total": page.total, "entries": entries})))
}

/// `POST /_test/{id}/auth-code`: pre-issue a code for scripted OAuth.
pub async fn create_auth_code(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let payload = extract::json_body(&headers, &body)?;
    let guild_id = required_str(&payload, "guildId")?;
    let redirect_uri = required_str(&payload, "redirectUri")?;

    if !state.store().guild_exists(tenant.id, &guild_id).await? {
        return Err(ApiError::BadRequest(format!(
            "guild {guild_id} does not belong to tenant"
        )));
    }

    let code = format!("code-{}", Uuid::new_v4().simple());
    state
        .store()
        .insert_auth_code(&AuthCodeRecord {
            code: code.clone(),
            tenant_id: tenant.id,
            guild_id,
            redirect_uri,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({"code": code}))))
}

/// `POST /_test/{id}/send-interaction`. Signs and POSTs an interaction at the
/// system under test.
pub async fn send_interaction(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let payload = extract::json_body(&headers, &body)?;
    let webhook_url = required_str(&payload, "webhookUrl")?;
    let interaction = payload
        .get("interaction")
        .ok_or_else(|| ApiError::MissingField("interaction".into()))?;

    let delivery = interactions::deliver(&state, &tenant, &webhook_url, interaction).await?;
    Ok(Json(json!({
        "statusCode": delivery.status_code,
        "body": delivery.body,
    })))
}

/// `POST /_test/jobs/cleanup-old-tenants`: run the sweeper on demand.
pub async fn run_cleanup(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let ttl = chrono::Duration::hours(state.config().tenant_ttl_hours);
    let summary = sweeper::run_cleanup_job(state.store(), ttl).await?;
    Ok(Json(json!({
        "deleted": summary.deleted,
        "checked": summary.checked,
    })))
}

/// `GET /_test/browse/tenants`
pub async fn browse_tenants(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tenants = state.store().list_tenants().await?;
    let rendered: Vec<Value> = tenants
        .iter()
        .map(|tenant| {
            json!({
                "id": tenant.id,
                "clientId": tenant.client_id,
                "createdAt": tenant.created_at,
            })
        })
        .collect();
    Ok(Json(Value::Array(rendered)))
}

/// `GET /_test/browse/tenants/{id}`: topology plus per-table row counts.
pub async fn browse_tenant_detail(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tenant = require_tenant(&state, &ctx, &tenant_id).await?;
    let (guilds, channels) = state.store().topology(tenant.id).await?;
    let counts = state.store().counts(tenant.id).await?;

    let rendered_guilds: Vec<Value> = guilds
        .iter()
        .map(|guild| {
            let guild_channels: Vec<Value> = channels
                .iter()
                .filter(|channel| channel.guild_id == guild.id)
                .map(|channel| json!({"id": channel.id, "name": channel.name}))
                .collect();
            json!({"id": guild.id, "name": guild.name, "channels": guild_channels})
        })
        .collect();

    Ok(Json(json!({
        "id": tenant.id,
        "clientId": tenant.client_id,
        "createdAt": tenant.created_at,
        "guilds": rendered_guilds,
        "counts": {
            "messages": counts.messages,
            "messageEdits": counts.message_edits,
            "reactions": counts.reactions,
            "interactionResponses": counts.interaction_responses,
            "followups": counts.followups,
            "commands": counts.commands,
            "authCodes": counts.auth_codes,
            "accessTokens": counts.access_tokens,
            "auditLogs": counts.audit_logs,
        },
    })))
}

async fn require_tenant(
    state: &AppState,
    ctx: &TenantContext,
    raw_tenant_id: &str,
) -> Result<TenantRecord, ApiError> {
    let tenant_id = parse_tenant_id(raw_tenant_id)?;
    let tenant = state
        .store()
        .tenant_by_id(tenant_id)
        .await?
        .ok_or(ApiError::TenantNotFound)?;
    ctx.set(tenant.id);
    Ok(tenant)
}

fn parse_tenant_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::TenantNotFound)
}

fn required_str(payload: &Value, field: &str) -> Result<String, ApiError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::MissingField(field.to_string()))
}

fn parse_new_tenant(payload: &Value) -> Result<NewTenant, ApiError> {
    let bot_token = required_str(payload, "botToken")?;
    let client_id = required_str(payload, "clientId")?;
    let client_secret = required_str(payload, "clientSecret")?;
    let public_key = required_str(payload, "publicKey")?;
    let private_key = required_str(payload, "privateKey")?;

    let raw_guilds = payload
        .get("guilds")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::MissingField("guilds".into()))?;
    if raw_guilds.is_empty() {
        return Err(ApiError::BadRequest("guilds must not be empty".into()));
    }

    let mut guilds = Vec::with_capacity(raw_guilds.len());
    for raw_guild in raw_guilds {
        let id = raw_guild
            .get("id")
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::MissingField("guilds[].id".into()))?;
        let name = raw_guild
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&id)
            .to_string();

        let raw_channels = raw_guild
            .get("channels")
            .and_then(Value::as_array)
            .filter(|channels| !channels.is_empty())
            .ok_or_else(|| {
                ApiError::BadRequest(format!("guild {id} must have at least one channel"))
            })?;

        let mut channels = Vec::with_capacity(raw_channels.len());
        for raw_channel in raw_channels {
            let channel_id = raw_channel
                .get("id")
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ApiError::MissingField("guilds[].channels[].id".into()))?;
            let channel_name = raw_channel
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&channel_id)
                .to_string();
            channels.push(NewChannel {
                id: channel_id,
                name: channel_name,
            });
        }

        guilds.push(NewGuild { id, name, channels });
    }

    Ok(NewTenant {
        bot_token,
        client_id,
        client_secret,
        public_key,
        private_key,
        guilds,
    })
}

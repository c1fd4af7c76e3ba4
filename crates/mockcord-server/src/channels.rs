use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::Utc;
use mockcord_storage::{MessageRecord, NewReaction};
use serde_json::{json, Value};

use crate::{
    audit::TenantContext,
    error::ApiError,
    extract, resolve,
    store::assign_id,
    AppState,
};

/// `GET /api/v10/channels/{id}`
pub async fn get_channel(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let tenant = resolve::by_bot(&state, &headers, &ctx).await?;
    let channel = state
        .store()
        .channel(tenant.id, &channel_id)
        .await?
        .ok_or(ApiError::UnknownEntity("Channel"))?;

    Ok(Json(json!({
        "id": channel.id,
        "guild_id": channel.guild_id,
        "name": channel.name,
        "type": 0,
    })))
}

/// `POST /api/v10/channels/{id}/messages`. The whole request body becomes
/// the stored payload; only `content` is echoed back.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let tenant = resolve::by_bot(&state, &headers, &ctx).await?;
    if state.store().channel(tenant.id, &channel_id).await?.is_none() {
        return Err(ApiError::UnknownEntity("Channel"));
    }

    let payload = extract::json_body(&headers, &body)?;
    let id = assign_id(state.store(), tenant.id, "msg").await?;
    state
        .store()
        .insert_message(&MessageRecord {
            tenant_id: tenant.id,
            id: id.clone(),
            channel_id: channel_id.clone(),
            payload: payload.clone(),
            created_at: Utc::now(),
        })
        .await?;

    Ok(Json(json!({
        "id": id,
        "channel_id": channel_id,
        "content": extract::content_field(&payload),
    })))
}

/// `PATCH /api/v10/channels/{ch}/messages/{msg}`. Moves the current payload
/// into the edit history and swaps in the new one, atomically.
pub async fn edit_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((channel_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let tenant = resolve::by_bot(&state, &headers, &ctx).await?;
    let payload = extract::json_body(&headers, &body)?;

    let updated = state
        .store()
        .edit_message(tenant.id, &channel_id, &message_id, &payload, Utc::now())
        .await?;
    if !updated {
        return Err(ApiError::UnknownEntity("Message"));
    }

    Ok(Json(json!({
        "id": message_id,
        "content": extract::content_field(&payload),
    })))
}

/// `PUT /api/v10/channels/{ch}/messages/{msg}/reactions/{emoji}/@me`, 204 on
/// success. The emoji arrives percent-encoded and is decoded by the router.
pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((channel_id, message_id, emoji)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let tenant = resolve::by_bot(&state, &headers, &ctx).await?;
    if state.store().channel(tenant.id, &channel_id).await?.is_none() {
        return Err(ApiError::UnknownEntity("Channel"));
    }
    if !state
        .store()
        .message_exists(tenant.id, &channel_id, &message_id)
        .await?
    {
        return Err(ApiError::UnknownEntity("Message"));
    }

    state
        .store()
        .insert_reaction(&NewReaction {
            tenant_id: tenant.id,
            channel_id,
            message_id,
            emoji,
            created_at: Utc::now(),
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{bot_auth, create_tenant, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn send_then_fetch_round_trips() {
        let (app, _store) = test_app();
        let tenant_id = create_tenant(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v10/channels/c/messages",
            &[bot_auth()],
            Some(json!({"content": "Hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "msg-1");
        assert_eq!(body["channel_id"], "c");
        assert_eq!(body["content"], "Hi");

        let (status, body) = send(
            &app,
            "GET",
            &format!("/_test/{tenant_id}/messages/c"),
            &[],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let messages = body.as_array().expect("array of messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["payload"]["content"], "Hi");
        assert_eq!(messages[0]["editHistory"], json!([]));
    }

    #[tokio::test]
    async fn edit_captures_the_pre_image() {
        let (app, _store) = test_app();
        let tenant_id = create_tenant(&app).await;

        send(
            &app,
            "POST",
            "/api/v10/channels/c/messages",
            &[bot_auth()],
            Some(json!({"content": "Hi"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/v10/channels/c/messages/msg-1",
            &[bot_auth()],
            Some(json!({"content": "Hi!"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "msg-1");
        assert_eq!(body["content"], "Hi!");

        let (_, body) = send(
            &app,
            "GET",
            &format!("/_test/{tenant_id}/messages/c"),
            &[],
            None,
        )
        .await;
        let message = &body.as_array().expect("messages")[0];
        assert_eq!(message["payload"]["content"], "Hi!");
        let history = message["editHistory"].as_array().expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["payload"]["content"], "Hi");
        assert!(history[0]["editedAt"].is_string());
    }

    #[tokio::test]
    async fn edit_of_missing_message_is_404() {
        let (app, _store) = test_app();
        create_tenant(&app).await;

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/v10/channels/c/messages/msg-9",
            &[bot_auth()],
            Some(json!({"content": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Unknown Message");
    }

    #[tokio::test]
    async fn get_channel_requires_bot_auth() {
        let (app, _store) = test_app();
        create_tenant(&app).await;

        let (status, body) = send(&app, "GET", "/api/v10/channels/c", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "401: Unauthorized");

        let (status, body) = send(
            &app,
            "GET",
            "/api/v10/channels/c",
            &[("authorization", "Bot wrong-token")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "401: Unauthorized");

        let (status, body) = send(&app, "GET", "/api/v10/channels/c", &[bot_auth()], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["guild_id"], "g");
        assert_eq!(body["type"], 0);
    }

    #[tokio::test]
    async fn send_to_unknown_channel_is_404() {
        let (app, _store) = test_app();
        create_tenant(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v10/channels/nope/messages",
            &[bot_auth()],
            Some(json!({"content": "Hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Unknown Channel");
    }

    #[tokio::test]
    async fn send_with_bad_body_is_400() {
        let (app, _store) = test_app();
        create_tenant(&app).await;

        let (status, body) = crate::test_support::send_text(
            &app,
            "POST",
            "/api/v10/channels/c/messages",
            &[bot_auth(), ("content-type", "text/plain")],
            "hello",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid request body");
    }

    #[tokio::test]
    async fn reaction_decodes_emoji_and_returns_204() {
        let (app, _store) = test_app();
        let tenant_id = create_tenant(&app).await;

        send(
            &app,
            "POST",
            "/api/v10/channels/c/messages",
            &[bot_auth()],
            Some(json!({"content": "Hi"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/v10/channels/c/messages/msg-1/reactions/%F0%9F%91%8D/@me",
            &[bot_auth()],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null(), "204 carries no body");

        let (_, body) = send(&app, "GET", &format!("/_test/{tenant_id}/reactions"), &[], None).await;
        let reactions = body.as_array().expect("reactions");
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0]["emoji"], "👍");
        assert_eq!(reactions[0]["messageId"], "msg-1");
    }

    #[tokio::test]
    async fn reaction_on_missing_message_names_the_entity() {
        let (app, _store) = test_app();
        create_tenant(&app).await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/v10/channels/c/messages/msg-1/reactions/%F0%9F%91%8D/@me",
            &[bot_auth()],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Unknown Message");

        let (status, body) = send(
            &app,
            "PUT",
            "/api/v10/channels/ghost/messages/msg-1/reactions/%F0%9F%91%8D/@me",
            &[bot_auth()],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Unknown Channel");
    }
}

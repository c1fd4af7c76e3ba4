use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockcord_storage::{
    AuditLogPage, AuditLogRecord, AuthCodeRecord, ChannelRecord, CommandRecord, FollowupRecord,
    GuildRecord, InteractionResponseRecord, MessageEditRecord, MessageRecord, MessageWithEdits,
    NewAuditLog, NewReaction, NewTenant, ReactionRecord, TenantCounts, TenantRecord,
    TenantSummary,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{StoreError, TenantStore};

/// In-memory stand-in for the Postgres store, used when no `database_url` is
/// configured and by the route tests. The whole table set lives behind one
/// lock, so every multi-table batch is atomic with respect to readers.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    tenants: HashMap<Uuid, TenantRecord>,
    guilds: Vec<GuildRecord>,
    channels: Vec<ChannelRecord>,
    auth_codes: HashMap<String, AuthCodeRecord>,
    access_tokens: HashMap<String, Uuid>,
    messages: Vec<MessageRecord>,
    message_edits: Vec<MessageEditRecord>,
    next_edit_id: i64,
    reactions: Vec<ReactionRecord>,
    next_reaction_id: i64,
    responses: HashMap<(Uuid, String), InteractionResponseRecord>,
    followups: Vec<FollowupRecord>,
    commands: Vec<CommandRecord>,
    audit_logs: Vec<AuditLogRecord>,
    next_audit_id: i64,
}

impl MemoryState {
    fn clear_mutable(&mut self, tenant_id: Uuid) {
        self.auth_codes.retain(|_, code| code.tenant_id != tenant_id);
        self.access_tokens.retain(|_, owner| *owner != tenant_id);
        self.messages.retain(|m| m.tenant_id != tenant_id);
        self.message_edits.retain(|e| e.tenant_id != tenant_id);
        self.reactions.retain(|r| r.tenant_id != tenant_id);
        self.responses.retain(|(owner, _), _| *owner != tenant_id);
        self.followups.retain(|f| f.tenant_id != tenant_id);
        self.commands.retain(|c| c.tenant_id != tenant_id);
        self.audit_logs
            .retain(|entry| entry.tenant_id != Some(tenant_id));
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook mirroring `TenantRepository::backdate`: rewrite a tenant's
    /// creation timestamp so expiry scenarios can age it.
    pub async fn backdate(&self, tenant_id: Uuid, created_at: DateTime<Utc>) {
        let mut state = self.inner.write().await;
        if let Some(tenant) = state.tenants.get_mut(&tenant_id) {
            tenant.created_at = created_at;
        }
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn create_tenant(&self, tenant: &NewTenant) -> Result<TenantRecord, StoreError> {
        let mut state = self.inner.write().await;

        if state
            .tenants
            .values()
            .any(|existing| existing.bot_token == tenant.bot_token)
        {
            return Err(StoreError::BotTokenTaken);
        }
        if state
            .tenants
            .values()
            .any(|existing| existing.client_id == tenant.client_id)
        {
            return Err(StoreError::ClientIdTaken);
        }

        let record = TenantRecord {
            id: Uuid::new_v4(),
            bot_token: tenant.bot_token.clone(),
            client_id: tenant.client_id.clone(),
            client_secret: tenant.client_secret.clone(),
            public_key: tenant.public_key.clone(),
            private_key: tenant.private_key.clone(),
            next_id: 1,
            created_at: Utc::now(),
        };

        for guild in &tenant.guilds {
            state.guilds.push(GuildRecord {
                tenant_id: record.id,
                id: guild.id.clone(),
                name: guild.name.clone(),
            });
            for channel in &guild.channels {
                state.channels.push(ChannelRecord {
                    tenant_id: record.id,
                    id: channel.id.clone(),
                    guild_id: guild.id.clone(),
                    name: channel.name.clone(),
                });
            }
        }

        state.tenants.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.inner.write().await;
        if state.tenants.remove(&tenant_id).is_none() {
            return Ok(false);
        }
        state.clear_mutable(tenant_id);
        state.guilds.retain(|g| g.tenant_id != tenant_id);
        state.channels.retain(|c| c.tenant_id != tenant_id);
        Ok(true)
    }

    async fn reset_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.inner.write().await;
        match state.tenants.get_mut(&tenant_id) {
            Some(tenant) => tenant.next_id = 1,
            None => return Ok(false),
        }
        state.clear_mutable(tenant_id);
        Ok(true)
    }

    async fn tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state.tenants.get(&tenant_id).cloned())
    }

    async fn tenant_by_bot_token(
        &self,
        bot_token: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .tenants
            .values()
            .find(|tenant| tenant.bot_token == bot_token)
            .cloned())
    }

    async fn tenant_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .tenants
            .values()
            .find(|tenant| tenant.client_id == client_id)
            .cloned())
    }

    async fn tenant_by_access_token(
        &self,
        token: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .access_tokens
            .get(token)
            .and_then(|tenant_id| state.tenants.get(tenant_id))
            .cloned())
    }

    async fn tenants_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let state = self.inner.read().await;
        let mut expired: Vec<_> = state
            .tenants
            .values()
            .filter(|tenant| tenant.created_at < cutoff)
            .map(|tenant| (tenant.created_at, tenant.id))
            .collect();
        expired.sort();
        Ok(expired.into_iter().map(|(_, id)| id).collect())
    }

    async fn list_tenants(&self) -> Result<Vec<TenantSummary>, StoreError> {
        let state = self.inner.read().await;
        let mut summaries: Vec<_> = state
            .tenants
            .values()
            .map(|tenant| TenantSummary {
                id: tenant.id,
                client_id: tenant.client_id.clone(),
                created_at: tenant.created_at,
            })
            .collect();
        summaries.sort_by_key(|summary| (summary.created_at, summary.id));
        Ok(summaries)
    }

    async fn topology(
        &self,
        tenant_id: Uuid,
    ) -> Result<(Vec<GuildRecord>, Vec<ChannelRecord>), StoreError> {
        let state = self.inner.read().await;
        let mut guilds: Vec<_> = state
            .guilds
            .iter()
            .filter(|g| g.tenant_id == tenant_id)
            .cloned()
            .collect();
        guilds.sort_by(|a, b| a.id.cmp(&b.id));
        let mut channels: Vec<_> = state
            .channels
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        channels.sort_by(|a, b| (a.guild_id.as_str(), a.id.as_str()).cmp(&(b.guild_id.as_str(), b.id.as_str())));
        Ok((guilds, channels))
    }

    async fn counts(&self, tenant_id: Uuid) -> Result<TenantCounts, StoreError> {
        let state = self.inner.read().await;
        Ok(TenantCounts {
            messages: state.messages.iter().filter(|m| m.tenant_id == tenant_id).count() as i64,
            message_edits: state
                .message_edits
                .iter()
                .filter(|e| e.tenant_id == tenant_id)
                .count() as i64,
            reactions: state.reactions.iter().filter(|r| r.tenant_id == tenant_id).count() as i64,
            interaction_responses: state
                .responses
                .keys()
                .filter(|(owner, _)| *owner == tenant_id)
                .count() as i64,
            followups: state.followups.iter().filter(|f| f.tenant_id == tenant_id).count() as i64,
            commands: state.commands.iter().filter(|c| c.tenant_id == tenant_id).count() as i64,
            auth_codes: state
                .auth_codes
                .values()
                .filter(|code| code.tenant_id == tenant_id)
                .count() as i64,
            access_tokens: state
                .access_tokens
                .values()
                .filter(|owner| **owner == tenant_id)
                .count() as i64,
            audit_logs: state
                .audit_logs
                .iter()
                .filter(|entry| entry.tenant_id == Some(tenant_id))
                .count() as i64,
        })
    }

    async fn generate_id(
        &self,
        tenant_id: Uuid,
        prefix: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.inner.write().await;
        Ok(state.tenants.get_mut(&tenant_id).map(|tenant| {
            let assigned = tenant.next_id;
            tenant.next_id += 1;
            format!("{prefix}-{assigned}")
        }))
    }

    async fn first_guild(&self, tenant_id: Uuid) -> Result<Option<GuildRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .guilds
            .iter()
            .filter(|g| g.tenant_id == tenant_id)
            .min_by(|a, b| a.id.cmp(&b.id))
            .cloned())
    }

    async fn guild_exists(&self, tenant_id: Uuid, guild_id: &str) -> Result<bool, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .guilds
            .iter()
            .any(|g| g.tenant_id == tenant_id && g.id == guild_id))
    }

    async fn channel(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .channels
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.id == channel_id)
            .cloned())
    }

    async fn insert_auth_code(&self, code: &AuthCodeRecord) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.auth_codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn consume_auth_code(&self, code: &str) -> Result<Option<AuthCodeRecord>, StoreError> {
        let mut state = self.inner.write().await;
        Ok(state.auth_codes.remove(code))
    }

    async fn insert_access_token(&self, tenant_id: Uuid, token: &str) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.access_tokens.insert(token.to_string(), tenant_id);
        Ok(())
    }

    async fn insert_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.messages.push(message.clone());
        Ok(())
    }

    async fn edit_message(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
        message_id: &str,
        payload: &serde_json::Value,
        edited_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.inner.write().await;
        let Some(index) = state.messages.iter().position(|m| {
            m.tenant_id == tenant_id && m.channel_id == channel_id && m.id == message_id
        }) else {
            return Ok(false);
        };

        state.next_edit_id += 1;
        let pre_image = MessageEditRecord {
            id: state.next_edit_id,
            tenant_id,
            message_id: state.messages[index].id.clone(),
            payload: state.messages[index].payload.clone(),
            edited_at,
        };
        state.messages[index].payload = payload.clone();
        state.message_edits.push(pre_image);
        Ok(true)
    }

    async fn message_exists(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
        message_id: &str,
    ) -> Result<bool, StoreError> {
        let state = self.inner.read().await;
        Ok(state.messages.iter().any(|m| {
            m.tenant_id == tenant_id && m.channel_id == channel_id && m.id == message_id
        }))
    }

    async fn messages_in_channel(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
    ) -> Result<Vec<MessageWithEdits>, StoreError> {
        let state = self.inner.read().await;
        let mut messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.channel_id == channel_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);

        Ok(messages
            .into_iter()
            .map(|message| {
                let mut edits: Vec<_> = state
                    .message_edits
                    .iter()
                    .filter(|e| e.tenant_id == tenant_id && e.message_id == message.id)
                    .cloned()
                    .collect();
                edits.sort_by_key(|e| (e.edited_at, e.id));
                MessageWithEdits { message, edits }
            })
            .collect())
    }

    async fn insert_reaction(&self, reaction: &NewReaction) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.next_reaction_id += 1;
        let record = ReactionRecord {
            id: state.next_reaction_id,
            tenant_id: reaction.tenant_id,
            channel_id: reaction.channel_id.clone(),
            message_id: reaction.message_id.clone(),
            emoji: reaction.emoji.clone(),
            created_at: reaction.created_at,
        };
        state.reactions.push(record);
        Ok(())
    }

    async fn reactions(&self, tenant_id: Uuid) -> Result<Vec<ReactionRecord>, StoreError> {
        let state = self.inner.read().await;
        let mut reactions: Vec<_> = state
            .reactions
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        reactions.sort_by_key(|r| (r.created_at, r.id));
        Ok(reactions)
    }

    async fn upsert_interaction_response(
        &self,
        response: &InteractionResponseRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.responses.insert(
            (response.tenant_id, response.interaction_token.clone()),
            response.clone(),
        );
        Ok(())
    }

    async fn interaction_response(
        &self,
        tenant_id: Uuid,
        interaction_token: &str,
    ) -> Result<Option<InteractionResponseRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .responses
            .get(&(tenant_id, interaction_token.to_string()))
            .cloned())
    }

    async fn insert_followup(&self, followup: &FollowupRecord) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.followups.push(followup.clone());
        Ok(())
    }

    async fn followups(
        &self,
        tenant_id: Uuid,
        interaction_token: &str,
    ) -> Result<Vec<FollowupRecord>, StoreError> {
        let state = self.inner.read().await;
        let mut followups: Vec<_> = state
            .followups
            .iter()
            .filter(|f| f.tenant_id == tenant_id && f.interaction_token == interaction_token)
            .cloned()
            .collect();
        followups.sort_by_key(|f| f.created_at);
        Ok(followups)
    }

    async fn replace_commands(
        &self,
        tenant_id: Uuid,
        guild_id: &str,
        commands: &[CommandRecord],
    ) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state
            .commands
            .retain(|c| !(c.tenant_id == tenant_id && c.guild_id == guild_id));
        state.commands.extend_from_slice(commands);
        Ok(())
    }

    async fn commands(
        &self,
        tenant_id: Uuid,
        guild_id: &str,
    ) -> Result<Vec<CommandRecord>, StoreError> {
        let state = self.inner.read().await;
        let mut commands: Vec<_> = state
            .commands
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.guild_id == guild_id)
            .cloned()
            .collect();
        commands.sort_by_key(|c| c.registered_at);
        Ok(commands)
    }

    async fn insert_audit_log(&self, entry: &NewAuditLog) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.next_audit_id += 1;
        let record = AuditLogRecord {
            id: state.next_audit_id,
            tenant_id: entry.tenant_id,
            method: entry.method.clone(),
            url: entry.url.clone(),
            request_body: entry.request_body.clone(),
            response_status: entry.response_status,
            response_body: entry.response_body.clone(),
            created_at: entry.created_at,
        };
        state.audit_logs.push(record);
        Ok(())
    }

    async fn audit_logs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<AuditLogPage, StoreError> {
        let state = self.inner.read().await;
        let matching: Vec<_> = state
            .audit_logs
            .iter()
            .filter(|entry| entry.tenant_id == Some(tenant_id))
            .cloned()
            .collect();
        let total = matching.len() as i64;
        let entries = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok(AuditLogPage { total, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockcord_storage::{NewChannel, NewGuild};
    use serde_json::json;

    fn sample_tenant(tag: &str) -> NewTenant {
        NewTenant {
            bot_token: format!("bot-{tag}"),
            client_id: format!("client-{tag}"),
            client_secret: "secret".into(),
            public_key: "00".repeat(32),
            private_key: "11".repeat(32),
            guilds: vec![NewGuild {
                id: "g1".into(),
                name: "Guild".into(),
                channels: vec![NewChannel {
                    id: "c1".into(),
                    name: "general".into(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn duplicate_credentials_are_rejected() {
        let store = MemoryStore::new();
        store.create_tenant(&sample_tenant("a")).await.expect("first create");

        let err = store
            .create_tenant(&sample_tenant("a"))
            .await
            .expect_err("duplicate bot token");
        assert!(matches!(err, StoreError::BotTokenTaken));

        let mut other = sample_tenant("b");
        other.client_id = "client-a".into();
        let err = store
            .create_tenant(&other)
            .await
            .expect_err("duplicate client id");
        assert!(matches!(err, StoreError::ClientIdTaken));
    }

    #[tokio::test]
    async fn reset_clears_state_but_keeps_topology() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&sample_tenant("r")).await.expect("creates");

        let id = store
            .generate_id(tenant.id, "msg")
            .await
            .expect("generates")
            .expect("tenant exists");
        store
            .insert_message(&MessageRecord {
                tenant_id: tenant.id,
                id,
                channel_id: "c1".into(),
                payload: json!({"content": "hi"}),
                created_at: Utc::now(),
            })
            .await
            .expect("inserts");

        assert!(store.reset_tenant(tenant.id).await.expect("resets"));

        let messages = store
            .messages_in_channel(tenant.id, "c1")
            .await
            .expect("lists");
        assert!(messages.is_empty());

        let refreshed = store
            .tenant_by_id(tenant.id)
            .await
            .expect("reads")
            .expect("still present");
        assert_eq!(refreshed.next_id, 1);
        assert!(store.guild_exists(tenant.id, "g1").await.expect("reads"));
        assert!(store.channel(tenant.id, "c1").await.expect("reads").is_some());
        assert!(store.reset_tenant(tenant.id).await.expect("reset is idempotent"));
    }

    #[tokio::test]
    async fn auth_codes_consume_exactly_once() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&sample_tenant("o")).await.expect("creates");

        store
            .insert_auth_code(&AuthCodeRecord {
                code: "code-1".into(),
                tenant_id: tenant.id,
                guild_id: "g1".into(),
                redirect_uri: "https://example.test/cb".into(),
            })
            .await
            .expect("inserts");

        assert!(store.consume_auth_code("code-1").await.expect("first").is_some());
        assert!(store.consume_auth_code("code-1").await.expect("second").is_none());
    }

    #[tokio::test]
    async fn delete_removes_every_child_row() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&sample_tenant("d")).await.expect("creates");

        store
            .insert_access_token(tenant.id, "tok-1")
            .await
            .expect("token inserts");
        store
            .insert_audit_log(&NewAuditLog {
                tenant_id: Some(tenant.id),
                method: "GET".into(),
                url: "/api/v10/users/@me".into(),
                request_body: None,
                response_status: 200,
                response_body: None,
                created_at: Utc::now(),
            })
            .await
            .expect("audit inserts");

        assert!(store.delete_tenant(tenant.id).await.expect("deletes"));
        assert!(!store.delete_tenant(tenant.id).await.expect("second delete"));
        assert!(store
            .tenant_by_access_token("tok-1")
            .await
            .expect("reads")
            .is_none());
        let counts = store.counts(tenant.id).await.expect("counts");
        assert_eq!(counts.audit_logs, 0);
        assert_eq!(counts.access_tokens, 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn generated_ids_are_distinct_and_increasing(
                prefix in "[a-z]{1,8}",
                count in 1usize..32,
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .expect("runtime builds");
                let ids = runtime.block_on(async {
                    let store = MemoryStore::new();
                    let tenant = store
                        .create_tenant(&sample_tenant("p"))
                        .await
                        .expect("creates");
                    let mut ids = Vec::with_capacity(count);
                    for _ in 0..count {
                        ids.push(
                            store
                                .generate_id(tenant.id, &prefix)
                                .await
                                .expect("generates")
                                .expect("tenant exists"),
                        );
                    }
                    ids
                });

                let mut last = 0u64;
                for (index, id) in ids.iter().enumerate() {
                    let suffix = id
                        .strip_prefix(&format!("{prefix}-"))
                        .expect("prefix matches")
                        .parse::<u64>()
                        .expect("numeric suffix");
                    prop_assert_eq!(suffix, index as u64 + 1);
                    prop_assert!(suffix > last || index == 0);
                    last = suffix;
                }
            }
        }
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockcord_storage::{
    AuditLogPage, AuditLogRepository, AuthCodeRecord, ChannelRecord, CommandRecord,
    CreateTenantError, Database, FollowupRecord, GuildRecord, InteractionRepository,
    InteractionResponseRecord, MessageRecord, MessageRepository, MessageWithEdits, NewAuditLog,
    NewReaction, NewTenant, OAuthRepository, ReactionRecord, TenantCounts, TenantRecord,
    TenantRepository, TenantSummary,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("botToken already in use")]
    BotTokenTaken,
    #[error("clientId already in use")]
    ClientIdTaken,
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<CreateTenantError> for StoreError {
    fn from(err: CreateTenantError) -> Self {
        match err {
            CreateTenantError::BotTokenTaken => StoreError::BotTokenTaken,
            CreateTenantError::ClientIdTaken => StoreError::ClientIdTaken,
            CreateTenantError::Other(inner) => StoreError::Storage(inner),
        }
    }
}

/// The whole tenant state engine behind one seam: tenancy and credentials,
/// guild/channel topology, OAuth artifacts, recorded traffic, and audit logs.
/// Backed by Postgres in deployment and by [`crate::memstore::MemoryStore`]
/// when no database is configured.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn create_tenant(&self, tenant: &NewTenant) -> Result<TenantRecord, StoreError>;
    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError>;
    async fn reset_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError>;
    async fn tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError>;
    async fn tenant_by_bot_token(&self, bot_token: &str)
        -> Result<Option<TenantRecord>, StoreError>;
    async fn tenant_by_client_id(&self, client_id: &str)
        -> Result<Option<TenantRecord>, StoreError>;
    async fn tenant_by_access_token(
        &self,
        token: &str,
    ) -> Result<Option<TenantRecord>, StoreError>;
    async fn tenants_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError>;
    async fn list_tenants(&self) -> Result<Vec<TenantSummary>, StoreError>;
    async fn topology(
        &self,
        tenant_id: Uuid,
    ) -> Result<(Vec<GuildRecord>, Vec<ChannelRecord>), StoreError>;
    async fn counts(&self, tenant_id: Uuid) -> Result<TenantCounts, StoreError>;

    /// Atomically post-increment the tenant counter; `None` when the tenant
    /// no longer exists.
    async fn generate_id(
        &self,
        tenant_id: Uuid,
        prefix: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn first_guild(&self, tenant_id: Uuid) -> Result<Option<GuildRecord>, StoreError>;
    async fn guild_exists(&self, tenant_id: Uuid, guild_id: &str) -> Result<bool, StoreError>;
    async fn channel(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
    ) -> Result<Option<ChannelRecord>, StoreError>;

    async fn insert_auth_code(&self, code: &AuthCodeRecord) -> Result<(), StoreError>;
    async fn consume_auth_code(&self, code: &str) -> Result<Option<AuthCodeRecord>, StoreError>;
    async fn insert_access_token(&self, tenant_id: Uuid, token: &str) -> Result<(), StoreError>;

    async fn insert_message(&self, message: &MessageRecord) -> Result<(), StoreError>;
    async fn edit_message(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
        message_id: &str,
        payload: &serde_json::Value,
        edited_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    async fn message_exists(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
        message_id: &str,
    ) -> Result<bool, StoreError>;
    async fn messages_in_channel(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
    ) -> Result<Vec<MessageWithEdits>, StoreError>;
    async fn insert_reaction(&self, reaction: &NewReaction) -> Result<(), StoreError>;
    async fn reactions(&self, tenant_id: Uuid) -> Result<Vec<ReactionRecord>, StoreError>;

    async fn upsert_interaction_response(
        &self,
        response: &InteractionResponseRecord,
    ) -> Result<(), StoreError>;
    async fn interaction_response(
        &self,
        tenant_id: Uuid,
        interaction_token: &str,
    ) -> Result<Option<InteractionResponseRecord>, StoreError>;
    async fn insert_followup(&self, followup: &FollowupRecord) -> Result<(), StoreError>;
    async fn followups(
        &self,
        tenant_id: Uuid,
        interaction_token: &str,
    ) -> Result<Vec<FollowupRecord>, StoreError>;

    async fn replace_commands(
        &self,
        tenant_id: Uuid,
        guild_id: &str,
        commands: &[CommandRecord],
    ) -> Result<(), StoreError>;
    async fn commands(
        &self,
        tenant_id: Uuid,
        guild_id: &str,
    ) -> Result<Vec<CommandRecord>, StoreError>;

    async fn insert_audit_log(&self, entry: &NewAuditLog) -> Result<(), StoreError>;
    async fn audit_logs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<AuditLogPage, StoreError>;
}

/// Counter-assigned ID for a tenant known to exist. The tenant disappearing
/// between resolution and assignment is a torn request, not a client error.
pub async fn assign_id(
    store: &dyn TenantStore,
    tenant_id: Uuid,
    prefix: &str,
) -> Result<String, crate::error::ApiError> {
    store
        .generate_id(tenant_id, prefix)
        .await?
        .ok_or_else(|| {
            crate::error::ApiError::Internal(anyhow::anyhow!(
                "tenant {tenant_id} vanished while assigning an id"
            ))
        })
}

/// Postgres-backed store: the per-table repositories handed out by
/// [`Database`], composed behind the one seam the handlers see.
pub struct PgStore {
    tenants: TenantRepository,
    oauth: OAuthRepository,
    messages: MessageRepository,
    interactions: InteractionRepository,
    audit: AuditLogRepository,
}

impl PgStore {
    pub fn new(db: &Database) -> Self {
        Self {
            tenants: db.tenants(),
            oauth: db.oauth(),
            messages: db.messages(),
            interactions: db.interactions(),
            audit: db.audit_logs(),
        }
    }
}

#[async_trait]
impl TenantStore for PgStore {
    async fn create_tenant(&self, tenant: &NewTenant) -> Result<TenantRecord, StoreError> {
        self.tenants.create(tenant).await.map_err(StoreError::from)
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tenants.delete(tenant_id).await?)
    }

    async fn reset_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tenants.reset(tenant_id).await?)
    }

    async fn tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self.tenants.find(tenant_id).await?)
    }

    async fn tenant_by_bot_token(
        &self,
        bot_token: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self.tenants.find_by_bot_token(bot_token).await?)
    }

    async fn tenant_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self.tenants.find_by_client_id(client_id).await?)
    }

    async fn tenant_by_access_token(
        &self,
        token: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self.tenants.find_by_access_token(token).await?)
    }

    async fn tenants_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.tenants.created_before(cutoff).await?)
    }

    async fn list_tenants(&self) -> Result<Vec<TenantSummary>, StoreError> {
        Ok(self.tenants.list_summaries().await?)
    }

    async fn topology(
        &self,
        tenant_id: Uuid,
    ) -> Result<(Vec<GuildRecord>, Vec<ChannelRecord>), StoreError> {
        Ok(self.tenants.topology(tenant_id).await?)
    }

    async fn counts(&self, tenant_id: Uuid) -> Result<TenantCounts, StoreError> {
        Ok(self.tenants.counts(tenant_id).await?)
    }

    async fn generate_id(
        &self,
        tenant_id: Uuid,
        prefix: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.tenants.generate_id(tenant_id, prefix).await?)
    }

    async fn first_guild(&self, tenant_id: Uuid) -> Result<Option<GuildRecord>, StoreError> {
        Ok(self.tenants.first_guild(tenant_id).await?)
    }

    async fn guild_exists(&self, tenant_id: Uuid, guild_id: &str) -> Result<bool, StoreError> {
        Ok(self.tenants.guild_exists(tenant_id, guild_id).await?)
    }

    async fn channel(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        Ok(self.tenants.channel(tenant_id, channel_id).await?)
    }

    async fn insert_auth_code(&self, code: &AuthCodeRecord) -> Result<(), StoreError> {
        Ok(self.oauth.insert_code(code).await?)
    }

    async fn consume_auth_code(&self, code: &str) -> Result<Option<AuthCodeRecord>, StoreError> {
        Ok(self.oauth.consume_code(code).await?)
    }

    async fn insert_access_token(&self, tenant_id: Uuid, token: &str) -> Result<(), StoreError> {
        Ok(self.oauth.insert_access_token(tenant_id, token).await?)
    }

    async fn insert_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        Ok(self.messages.insert(message).await?)
    }

    async fn edit_message(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
        message_id: &str,
        payload: &serde_json::Value,
        edited_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .messages
            .edit(tenant_id, channel_id, message_id, payload, edited_at)
            .await?)
    }

    async fn message_exists(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
        message_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.messages.exists(tenant_id, channel_id, message_id).await?)
    }

    async fn messages_in_channel(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
    ) -> Result<Vec<MessageWithEdits>, StoreError> {
        Ok(self.messages.list_for_channel(tenant_id, channel_id).await?)
    }

    async fn insert_reaction(&self, reaction: &NewReaction) -> Result<(), StoreError> {
        Ok(self.messages.insert_reaction(reaction).await?)
    }

    async fn reactions(&self, tenant_id: Uuid) -> Result<Vec<ReactionRecord>, StoreError> {
        Ok(self.messages.reactions_for_tenant(tenant_id).await?)
    }

    async fn upsert_interaction_response(
        &self,
        response: &InteractionResponseRecord,
    ) -> Result<(), StoreError> {
        Ok(self.interactions.upsert_response(response).await?)
    }

    async fn interaction_response(
        &self,
        tenant_id: Uuid,
        interaction_token: &str,
    ) -> Result<Option<InteractionResponseRecord>, StoreError> {
        Ok(self.interactions.response(tenant_id, interaction_token).await?)
    }

    async fn insert_followup(&self, followup: &FollowupRecord) -> Result<(), StoreError> {
        Ok(self.interactions.insert_followup(followup).await?)
    }

    async fn followups(
        &self,
        tenant_id: Uuid,
        interaction_token: &str,
    ) -> Result<Vec<FollowupRecord>, StoreError> {
        Ok(self.interactions.followups(tenant_id, interaction_token).await?)
    }

    async fn replace_commands(
        &self,
        tenant_id: Uuid,
        guild_id: &str,
        commands: &[CommandRecord],
    ) -> Result<(), StoreError> {
        Ok(self
            .interactions
            .replace_commands(tenant_id, guild_id, commands)
            .await?)
    }

    async fn commands(
        &self,
        tenant_id: Uuid,
        guild_id: &str,
    ) -> Result<Vec<CommandRecord>, StoreError> {
        Ok(self.interactions.commands(tenant_id, guild_id).await?)
    }

    async fn insert_audit_log(&self, entry: &NewAuditLog) -> Result<(), StoreError> {
        Ok(self.audit.insert(entry).await?)
    }

    async fn audit_logs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<AuditLogPage, StoreError> {
        Ok(self.audit.page_for_tenant(tenant_id, limit, offset).await?)
    }
}

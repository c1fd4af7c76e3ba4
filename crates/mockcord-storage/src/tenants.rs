use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct TenantRecord {
    pub id: Uuid,
    pub bot_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub public_key: String,
    pub private_key: String,
    pub next_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct GuildRecord {
    pub tenant_id: Uuid,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChannelRecord {
    pub tenant_id: Uuid,
    pub id: String,
    pub guild_id: String,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct TenantSummary {
    pub id: Uuid,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
}

/// Row counts across a tenant's mutable tables, for the browse surface.
#[derive(Debug, Clone, FromRow)]
pub struct TenantCounts {
    pub messages: i64,
    pub message_edits: i64,
    pub reactions: i64,
    pub interaction_responses: i64,
    pub followups: i64,
    pub commands: i64,
    pub auth_codes: i64,
    pub access_tokens: i64,
    pub audit_logs: i64,
}

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewGuild {
    pub id: String,
    pub name: String,
    pub channels: Vec<NewChannel>,
}

#[derive(Debug, Clone)]
pub struct NewTenant {
    pub bot_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub public_key: String,
    pub private_key: String,
    pub guilds: Vec<NewGuild>,
}

#[derive(Debug, Error)]
pub enum CreateTenantError {
    #[error("botToken already in use")]
    BotTokenTaken,
    #[error("clientId already in use")]
    ClientIdTaken,
    #[error("failed to create tenant: {0}")]
    Other(#[from] anyhow::Error),
}

/// Every mutable table, in an order that respects foreign keys.
const MUTABLE_TABLES: &[&str] = &[
    "followups",
    "interaction_responses",
    "registered_commands",
    "reactions",
    "message_edits",
    "messages",
    "access_tokens",
    "auth_codes",
    "audit_logs",
];

#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the tenant together with its guild/channel topology in one
    /// transaction. The unique constraints on `bot_token` and `client_id`
    /// decide races between concurrent creators.
    pub async fn create(&self, tenant: &NewTenant) -> Result<TenantRecord, CreateTenantError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| anyhow!(err).context("starting tenant creation transaction"))?;

        let record = sqlx::query_as::<_, TenantRecord>(
            r#"
            INSERT INTO tenants (id, bot_token, client_id, client_secret, public_key, private_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, bot_token, client_id, client_secret, public_key, private_key, next_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&tenant.bot_token)
        .bind(&tenant.client_id)
        .bind(&tenant.client_secret)
        .bind(&tenant.public_key)
        .bind(&tenant.private_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify_unique_violation)?;

        for guild in &tenant.guilds {
            sqlx::query("INSERT INTO guilds (tenant_id, id, name) VALUES ($1, $2, $3)")
                .bind(record.id)
                .bind(&guild.id)
                .bind(&guild.name)
                .execute(&mut *tx)
                .await
                .map_err(|err| anyhow!(err).context("inserting guild"))?;

            for channel in &guild.channels {
                sqlx::query(
                    "INSERT INTO channels (tenant_id, id, guild_id, name) VALUES ($1, $2, $3, $4)",
                )
                .bind(record.id)
                .bind(&channel.id)
                .bind(&guild.id)
                .bind(&channel.name)
                .execute(&mut *tx)
                .await
                .map_err(|err| anyhow!(err).context("inserting channel"))?;
            }
        }

        tx.commit()
            .await
            .map_err(|err| anyhow!(err).context("committing tenant creation"))?;
        Ok(record)
    }

    /// Delete the tenant and every child row in one transaction. Returns
    /// whether the tenant existed.
    pub async fn delete(&self, tenant_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        for table in MUTABLE_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = $1"))
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM channels WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM guilds WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear every mutable table for the tenant and rewind the ID counter.
    /// Guild/channel topology and credentials survive.
    pub async fn reset(&self, tenant_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE tenants SET next_id = 1 WHERE id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for table in MUTABLE_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = $1"))
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn find(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>> {
        let record = sqlx::query_as::<_, TenantRecord>(
            r#"
            SELECT id, bot_token, client_id, client_secret, public_key, private_key, next_id, created_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn find_by_bot_token(&self, bot_token: &str) -> Result<Option<TenantRecord>> {
        let record = sqlx::query_as::<_, TenantRecord>(
            r#"
            SELECT id, bot_token, client_id, client_secret, public_key, private_key, next_id, created_at
            FROM tenants
            WHERE bot_token = $1
            "#,
        )
        .bind(bot_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn find_by_client_id(&self, client_id: &str) -> Result<Option<TenantRecord>> {
        let record = sqlx::query_as::<_, TenantRecord>(
            r#"
            SELECT id, bot_token, client_id, client_secret, public_key, private_key, next_id, created_at
            FROM tenants
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn find_by_access_token(&self, token: &str) -> Result<Option<TenantRecord>> {
        let record = sqlx::query_as::<_, TenantRecord>(
            r#"
            SELECT t.id, t.bot_token, t.client_id, t.client_secret, t.public_key, t.private_key,
                   t.next_id, t.created_at
            FROM tenants t
            JOIN access_tokens a ON a.tenant_id = t.id
            WHERE a.token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Post-increment the tenant's counter in a single statement and format
    /// the assigned ID. Concurrent callers always observe distinct values.
    pub async fn generate_id(&self, tenant_id: Uuid, prefix: &str) -> Result<Option<String>> {
        let next = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE tenants
            SET next_id = next_id + 1
            WHERE id = $1
            RETURNING next_id
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(next.map(|n| format!("{prefix}-{}", n - 1)))
    }

    pub async fn created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM tenants
            WHERE created_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn list_summaries(&self) -> Result<Vec<TenantSummary>> {
        let summaries = sqlx::query_as::<_, TenantSummary>(
            r#"
            SELECT id, client_id, created_at
            FROM tenants
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    pub async fn first_guild(&self, tenant_id: Uuid) -> Result<Option<GuildRecord>> {
        let guild = sqlx::query_as::<_, GuildRecord>(
            r#"
            SELECT tenant_id, id, name
            FROM guilds
            WHERE tenant_id = $1
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(guild)
    }

    pub async fn guild_exists(&self, tenant_id: Uuid, guild_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM guilds WHERE tenant_id = $1 AND id = $2
            )
            "#,
        )
        .bind(tenant_id)
        .bind(guild_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn channel(&self, tenant_id: Uuid, channel_id: &str) -> Result<Option<ChannelRecord>> {
        let channel = sqlx::query_as::<_, ChannelRecord>(
            r#"
            SELECT tenant_id, id, guild_id, name
            FROM channels
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(channel)
    }

    pub async fn topology(&self, tenant_id: Uuid) -> Result<(Vec<GuildRecord>, Vec<ChannelRecord>)> {
        let guilds = sqlx::query_as::<_, GuildRecord>(
            r#"
            SELECT tenant_id, id, name
            FROM guilds
            WHERE tenant_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let channels = sqlx::query_as::<_, ChannelRecord>(
            r#"
            SELECT tenant_id, id, guild_id, name
            FROM channels
            WHERE tenant_id = $1
            ORDER BY guild_id ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok((guilds, channels))
    }

    pub async fn counts(&self, tenant_id: Uuid) -> Result<TenantCounts> {
        let counts = sqlx::query_as::<_, TenantCounts>(
            r#"
            SELECT
                (SELECT count(*) FROM messages WHERE tenant_id = $1) AS messages,
                (SELECT count(*) FROM message_edits WHERE tenant_id = $1) AS message_edits,
                (SELECT count(*) FROM reactions WHERE tenant_id = $1) AS reactions,
                (SELECT count(*) FROM interaction_responses WHERE tenant_id = $1) AS interaction_responses,
                (SELECT count(*) FROM followups WHERE tenant_id = $1) AS followups,
                (SELECT count(*) FROM registered_commands WHERE tenant_id = $1) AS commands,
                (SELECT count(*) FROM auth_codes WHERE tenant_id = $1) AS auth_codes,
                (SELECT count(*) FROM access_tokens WHERE tenant_id = $1) AS access_tokens,
                (SELECT count(*) FROM audit_logs WHERE tenant_id = $1) AS audit_logs
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    /// Test hook used by the expiry scenarios: rewrite a tenant's creation
    /// timestamp directly in the store.
    pub async fn backdate(&self, tenant_id: Uuid, created_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE tenants SET created_at = $2 WHERE id = $1")
            .bind(tenant_id)
            .bind(created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn classify_unique_violation(err: sqlx::Error) -> CreateTenantError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.code(), Some(code) if code.as_ref() == "23505") {
            let constraint = db_err.constraint().unwrap_or_default();
            if constraint.contains("bot_token") {
                return CreateTenantError::BotTokenTaken;
            }
            if constraint.contains("client_id") {
                return CreateTenantError::ClientIdTaken;
            }
        }
    }
    CreateTenantError::Other(anyhow!(err).context("inserting tenant"))
}

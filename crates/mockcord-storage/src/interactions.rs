use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct InteractionResponseRecord {
    pub tenant_id: Uuid,
    pub interaction_token: String,
    pub response_id: String,
    pub payload: serde_json::Value,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FollowupRecord {
    pub tenant_id: Uuid,
    pub id: String,
    pub interaction_token: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CommandRecord {
    pub tenant_id: Uuid,
    pub id: String,
    pub guild_id: String,
    pub payload: serde_json::Value,
    pub registered_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InteractionRepository {
    pool: PgPool,
}

impl InteractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// One response row per `(tenant, interaction_token)`; repeated edits
    /// replace the payload in place.
    pub async fn upsert_response(&self, record: &InteractionResponseRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interaction_responses (tenant_id, interaction_token, response_id, payload, responded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, interaction_token) DO UPDATE
            SET response_id = EXCLUDED.response_id,
                payload = EXCLUDED.payload,
                responded_at = EXCLUDED.responded_at
            "#,
        )
        .bind(record.tenant_id)
        .bind(&record.interaction_token)
        .bind(&record.response_id)
        .bind(&record.payload)
        .bind(record.responded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn response(
        &self,
        tenant_id: Uuid,
        interaction_token: &str,
    ) -> Result<Option<InteractionResponseRecord>> {
        let record = sqlx::query_as::<_, InteractionResponseRecord>(
            r#"
            SELECT tenant_id, interaction_token, response_id, payload, responded_at
            FROM interaction_responses
            WHERE tenant_id = $1 AND interaction_token = $2
            "#,
        )
        .bind(tenant_id)
        .bind(interaction_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn insert_followup(&self, record: &FollowupRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO followups (tenant_id, id, interaction_token, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.tenant_id)
        .bind(&record.id)
        .bind(&record.interaction_token)
        .bind(&record.payload)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn followups(
        &self,
        tenant_id: Uuid,
        interaction_token: &str,
    ) -> Result<Vec<FollowupRecord>> {
        let records = sqlx::query_as::<_, FollowupRecord>(
            r#"
            SELECT tenant_id, id, interaction_token, payload, created_at
            FROM followups
            WHERE tenant_id = $1 AND interaction_token = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(interaction_token)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Swap the whole command set for `(tenant, guild)` in one transaction.
    /// Readers see either the old set or the new set, never a mix.
    pub async fn replace_commands(
        &self,
        tenant_id: Uuid,
        guild_id: &str,
        commands: &[CommandRecord],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM registered_commands WHERE tenant_id = $1 AND guild_id = $2")
            .bind(tenant_id)
            .bind(guild_id)
            .execute(&mut *tx)
            .await?;

        for command in commands {
            sqlx::query(
                r#"
                INSERT INTO registered_commands (tenant_id, id, guild_id, payload, registered_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(command.tenant_id)
            .bind(&command.id)
            .bind(&command.guild_id)
            .bind(&command.payload)
            .bind(command.registered_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn commands(&self, tenant_id: Uuid, guild_id: &str) -> Result<Vec<CommandRecord>> {
        let records = sqlx::query_as::<_, CommandRecord>(
            r#"
            SELECT tenant_id, id, guild_id, payload, registered_at
            FROM registered_commands
            WHERE tenant_id = $1 AND guild_id = $2
            ORDER BY registered_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

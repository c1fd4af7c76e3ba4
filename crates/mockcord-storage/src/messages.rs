use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct MessageRecord {
    pub tenant_id: Uuid,
    pub id: String,
    pub channel_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageEditRecord {
    pub id: i64,
    pub tenant_id: Uuid,
    pub message_id: String,
    pub payload: serde_json::Value,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReactionRecord {
    pub id: i64,
    pub tenant_id: Uuid,
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReaction {
    pub tenant_id: Uuid,
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// A message with its edit history, oldest pre-image first.
#[derive(Debug, Clone)]
pub struct MessageWithEdits {
    pub message: MessageRecord,
    pub edits: Vec<MessageEditRecord>,
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, message: &MessageRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (tenant_id, id, channel_id, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.tenant_id)
        .bind(&message.id)
        .bind(&message.channel_id)
        .bind(&message.payload)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Capture the pre-image and replace the payload in one transaction. The
    /// pre-image never touches application memory; it moves straight from
    /// `messages` into `message_edits`. Returns whether the message existed.
    pub async fn edit(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
        message_id: &str,
        payload: &serde_json::Value,
        edited_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO message_edits (tenant_id, message_id, payload, edited_at)
            SELECT tenant_id, id, payload, $4
            FROM messages
            WHERE tenant_id = $1 AND channel_id = $2 AND id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(message_id)
        .bind(edited_at)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE messages
            SET payload = $4
            WHERE tenant_id = $1 AND channel_id = $2 AND id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(message_id)
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn exists(&self, tenant_id: Uuid, channel_id: &str, message_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM messages WHERE tenant_id = $1 AND channel_id = $2 AND id = $3
            )
            "#,
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn list_for_channel(
        &self,
        tenant_id: Uuid,
        channel_id: &str,
    ) -> Result<Vec<MessageWithEdits>> {
        let messages = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT tenant_id, id, channel_id, payload, created_at
            FROM messages
            WHERE tenant_id = $1 AND channel_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        let edits = sqlx::query_as::<_, MessageEditRecord>(
            r#"
            SELECT e.id, e.tenant_id, e.message_id, e.payload, e.edited_at
            FROM message_edits e
            JOIN messages m ON m.tenant_id = e.tenant_id AND m.id = e.message_id
            WHERE e.tenant_id = $1 AND m.channel_id = $2
            ORDER BY e.edited_at ASC, e.id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_message: HashMap<String, Vec<MessageEditRecord>> = HashMap::new();
        for edit in edits {
            by_message.entry(edit.message_id.clone()).or_default().push(edit);
        }

        Ok(messages
            .into_iter()
            .map(|message| {
                let edits = by_message.remove(&message.id).unwrap_or_default();
                MessageWithEdits { message, edits }
            })
            .collect())
    }

    pub async fn insert_reaction(&self, reaction: &NewReaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reactions (tenant_id, channel_id, message_id, emoji, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reaction.tenant_id)
        .bind(&reaction.channel_id)
        .bind(&reaction.message_id)
        .bind(&reaction.emoji)
        .bind(reaction.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn reactions_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<ReactionRecord>> {
        let reactions = sqlx::query_as::<_, ReactionRecord>(
            r#"
            SELECT id, tenant_id, channel_id, message_id, emoji, created_at
            FROM reactions
            WHERE tenant_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reactions)
    }
}

use anyhow::Result;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct AuthCodeRecord {
    pub code: String,
    pub tenant_id: Uuid,
    pub guild_id: String,
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct OAuthRepository {
    pool: PgPool,
}

impl OAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_code(&self, record: &AuthCodeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_codes (code, tenant_id, guild_id, redirect_uri)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.code)
        .bind(record.tenant_id)
        .bind(&record.guild_id)
        .bind(&record.redirect_uri)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Consume a code in a single statement. Of two racing exchanges, exactly
    /// one gets the row back; the other sees `None`.
    pub async fn consume_code(&self, code: &str) -> Result<Option<AuthCodeRecord>> {
        let record = sqlx::query_as::<_, AuthCodeRecord>(
            r#"
            DELETE FROM auth_codes
            WHERE code = $1
            RETURNING code, tenant_id, guild_id, redirect_uri
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn insert_access_token(&self, tenant_id: Uuid, token: &str) -> Result<()> {
        sqlx::query("INSERT INTO access_tokens (token, tenant_id) VALUES ($1, $2)")
            .bind(token)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

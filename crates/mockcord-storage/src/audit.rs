use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRecord {
    pub id: i64,
    pub tenant_id: Option<Uuid>,
    pub method: String,
    pub url: String,
    pub request_body: Option<String>,
    pub response_status: i32,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub tenant_id: Option<Uuid>,
    pub method: String,
    pub url: String,
    pub request_body: Option<String>,
    pub response_status: i32,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuditLogPage {
    pub total: i64,
    pub entries: Vec<AuditLogRecord>,
}

#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &NewAuditLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (tenant_id, method, url, request_body, response_status, response_body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.tenant_id)
        .bind(&entry.method)
        .bind(&entry.url)
        .bind(entry.request_body.as_deref())
        .bind(entry.response_status)
        .bind(entry.response_body.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entries in insertion order (the serial id is the total order), plus
    /// the tenant's overall count for pagination.
    pub async fn page_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<AuditLogPage> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM audit_logs WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        let entries = sqlx::query_as::<_, AuditLogRecord>(
            r#"
            SELECT id, tenant_id, method, url, request_body, response_status, response_body, created_at
            FROM audit_logs
            WHERE tenant_id = $1
            ORDER BY id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(AuditLogPage { total, entries })
    }
}

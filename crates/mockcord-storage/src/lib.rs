//! Postgres persistence for the impersonator, one repository per table
//! family.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub mod audit;
pub mod interactions;
pub mod messages;
pub mod oauth;
pub mod tenants;

pub use audit::{AuditLogPage, AuditLogRecord, AuditLogRepository, NewAuditLog};
pub use interactions::{
    CommandRecord, FollowupRecord, InteractionRepository, InteractionResponseRecord,
};
pub use messages::{
    MessageEditRecord, MessageRecord, MessageRepository, MessageWithEdits, NewReaction,
    ReactionRecord,
};
pub use oauth::{AuthCodeRecord, OAuthRepository};
pub use tenants::{
    ChannelRecord, CreateTenantError, GuildRecord, NewChannel, NewGuild, NewTenant, TenantCounts,
    TenantRecord, TenantRepository, TenantSummary,
};

/// The fake serves test drivers, not production traffic. A small pool is
/// plenty and still surfaces contention bugs in the batched statements.
const POOL_SIZE: u32 = 5;

/// Entry point to the tenant store: owns the connection pool, applies the
/// schema shipped in `migrations/`, and hands out the per-table repositories.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect(database_url)
            .await
            .context("connecting to the tenant store")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("running tenant store migrations")
    }

    pub fn tenants(&self) -> TenantRepository {
        TenantRepository::new(self.pool.clone())
    }

    pub fn oauth(&self) -> OAuthRepository {
        OAuthRepository::new(self.pool.clone())
    }

    pub fn messages(&self) -> MessageRepository {
        MessageRepository::new(self.pool.clone())
    }

    pub fn interactions(&self) -> InteractionRepository {
        InteractionRepository::new(self.pool.clone())
    }

    pub fn audit_logs(&self) -> AuditLogRepository {
        AuditLogRepository::new(self.pool.clone())
    }
}

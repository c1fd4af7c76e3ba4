use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::{StoreError, TenantStore};

/// What a `cleanup-old-tenants` run reports back.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SweepSummary {
    pub deleted: usize,
    pub checked: bool,
}

/// Delete every tenant whose `created_at` is older than the TTL, using the
/// same cascade as an explicit tenant delete. Safe to run concurrently with
/// traffic and with another sweep: a tenant already gone counts for whoever
/// deleted it first.
pub async fn run_cleanup_job(
    store: &dyn TenantStore,
    ttl: Duration,
) -> Result<SweepSummary, StoreError> {
    let cutoff = Utc::now() - ttl;
    let expired = store.tenants_created_before(cutoff).await?;

    let mut deleted = 0;
    for tenant_id in expired {
        if store.delete_tenant(tenant_id).await? {
            info!(%tenant_id, "cleanup-old-tenants reclaimed expired tenant");
            deleted += 1;
        }
    }

    Ok(SweepSummary {
        deleted,
        checked: true,
    })
}

/// Fire the cleanup at the top of every hour (`0 * * * *`).
pub fn spawn(store: Arc<dyn TenantStore>, ttl_hours: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(until_next_hour()).await;
            match run_cleanup_job(store.as_ref(), Duration::hours(ttl_hours)).await {
                Ok(summary) if summary.deleted > 0 => {
                    info!(deleted = summary.deleted, "cleanup-old-tenants finished");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "cleanup-old-tenants failed"),
            }
        }
    })
}

fn until_next_hour() -> std::time::Duration {
    let seconds_into_hour = Utc::now().timestamp().rem_euclid(3600);
    std::time::Duration::from_secs((3600 - seconds_into_hour) as u64)
}

mod audit;
mod channels;
mod commands;
mod config;
mod control;
mod error;
mod extract;
mod interactions;
mod memstore;
mod oauth;
mod resolve;
mod store;
mod sweeper;
#[cfg(test)]
mod test_support;
mod webhooks;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, ServerConfig};
use crate::memstore::MemoryStore;
use crate::store::{PgStore, TenantStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(ServerConfig::load()?);
    run(config).await
}

async fn run(config: Arc<ServerConfig>) -> Result<()> {
    init_tracing(&config);

    let (store, backend): (Arc<dyn TenantStore>, &'static str) =
        match config.database_url.as_deref() {
            Some(url) => {
                let db = mockcord_storage::Database::connect(url).await?;
                db.migrate().await?;
                (Arc::new(PgStore::new(&db)), "postgres")
            }
            None => {
                info!("no database_url configured; tenant state will not survive restarts");
                (Arc::new(MemoryStore::new()), "memory")
            }
        };

    let state = AppState::new(config.clone(), store, backend)?;
    sweeper::spawn(state.store_arc(), config.tenant_ttl_hours);

    let app = build_app(state);
    let addr: SocketAddr = config.listener_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    store: Arc<dyn TenantStore>,
    http: reqwest::Client,
    backend: &'static str,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        store: Arc<dyn TenantStore>,
        backend: &'static str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.webhook_timeout_secs))
            .build()?;
        Ok(Self {
            config,
            store,
            http,
            backend,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn TenantStore {
        self.store.as_ref()
    }

    pub fn store_arc(&self) -> Arc<dyn TenantStore> {
        self.store.clone()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

fn build_app(state: AppState) -> Router {
    let discord = Router::new()
        .route("/oauth2/authorize", get(oauth::authorize))
        .route("/api/v10/oauth2/token", post(oauth::token))
        .route("/api/v10/users/@me", get(oauth::users_me))
        .route("/api/v10/channels/{channel_id}", get(channels::get_channel))
        .route(
            "/api/v10/channels/{channel_id}/messages",
            post(channels::send_message),
        )
        .route(
            "/api/v10/channels/{channel_id}/messages/{message_id}",
            patch(channels::edit_message),
        )
        .route(
            "/api/v10/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me",
            put(channels::add_reaction),
        )
        .route(
            "/api/v10/webhooks/{client_id}/{token}/messages/@original",
            patch(webhooks::edit_original_response),
        )
        .route(
            "/api/v10/webhooks/{client_id}/{token}",
            post(webhooks::create_followup),
        )
        .route(
            "/api/v10/applications/{client_id}/guilds/{guild_id}/commands",
            put(commands::bulk_overwrite),
        );

    let test_control = Router::new()
        .route("/_test/tenants", post(control::create_tenant))
        .route("/_test/tenants/{tenant_id}", delete(control::delete_tenant))
        .route("/_test/{tenant_id}/reset", post(control::reset_tenant))
        .route(
            "/_test/{tenant_id}/messages/{channel_id}",
            get(control::channel_messages),
        )
        .route("/_test/{tenant_id}/reactions", get(control::reactions))
        .route(
            "/_test/{tenant_id}/interaction-responses/{token}",
            get(control::interaction_responses),
        )
        .route("/_test/{tenant_id}/followups/{token}", get(control::followups))
        .route(
            "/_test/{tenant_id}/commands/{guild_id}",
            get(control::guild_commands),
        )
        .route("/_test/{tenant_id}/audit-logs", get(control::audit_logs))
        .route("/_test/{tenant_id}/auth-code", post(control::create_auth_code))
        .route(
            "/_test/{tenant_id}/send-interaction",
            post(control::send_interaction),
        )
        .route("/_test/browse/tenants", get(control::browse_tenants))
        .route(
            "/_test/browse/tenants/{tenant_id}",
            get(control::browse_tenant_detail),
        )
        .route(
            "/_test/jobs/cleanup-old-tenants",
            post(control::run_cleanup),
        );

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(readiness))
        .route("/version", get(version))
        .merge(discord)
        .merge(test_control)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), audit::record))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ReadinessResponse {
    status: &'static str,
    backend: &'static str,
}

async fn readiness(State(state): State<AppState>) -> Json<ReadinessResponse> {
    Json(ReadinessResponse {
        status: "ok",
        backend: state.backend,
    })
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"message": "404: Not Found"})),
    )
}

/// Install the global subscriber. `RUST_LOG` wins over the built-in filter,
/// and a second call (tests re-entering `run`) leaves the first install in
/// place.
fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mockcord_server=info"));
    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = match config.log_format() {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(err) = installed {
        eprintln!("tracing subscriber already installed: {err}");
    }
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(?err, "failed to install Ctrl+C handler");
    }
    info!("shutdown signal received");
}

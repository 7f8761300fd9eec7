//! actionbot-gateway: HTTP entry points.
//!
//! Provides:
//! - `GET /api/cron` runs one scheduler tick, guarded by a bearer secret
//! - `GET /health` reports liveness and version

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use actionbot_config::ServerConfig;
use actionbot_cron::ActionScheduler;

/// Shared gateway state.
pub struct GatewayState {
    pub scheduler: Arc<ActionScheduler>,
    /// Secret the cron caller must present. `None` disables the check.
    pub cron_secret: Option<String>,
    /// Wall-clock ceiling for one cron request.
    pub handler_timeout: Duration,
}

impl GatewayState {
    pub fn new(config: &ServerConfig, scheduler: Arc<ActionScheduler>) -> Self {
        Self {
            scheduler,
            cron_secret: config.cron_secret.clone(),
            handler_timeout: Duration::from_secs(config.handler_timeout_secs),
        }
    }
}

/// Build the router with all routes attached.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/cron", get(handlers::cron_handler))
        .with_state(state)
}

/// Bind and serve until `shutdown` is cancelled.
pub async fn start_server(
    config: &ServerConfig,
    scheduler: Arc<ActionScheduler>,
    port_override: Option<u16>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let port = port_override.unwrap_or(config.port);
    let state = Arc::new(GatewayState::new(config, scheduler));
    if state.cron_secret.is_none() {
        warn!("No cron secret configured, /api/cron is unauthenticated");
    }

    let app = router(state);
    let addr: SocketAddr = format!("{}:{port}", config.host).parse()?;
    info!("Gateway listening on {addr}");
    info!("  Cron:   http://{addr}/api/cron");
    info!("  Health: http://{addr}/health");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Gateway stopped");
    Ok(())
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

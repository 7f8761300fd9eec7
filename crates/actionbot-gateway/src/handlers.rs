//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::{GatewayState, extract_bearer_token};

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
}

/// GET /health: simple HTTP health check.
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/cron: run one tick over every due action.
pub async fn cron_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    if let Some(expected) = &state.cron_secret {
        match extract_bearer_token(&headers) {
            Some(token) if token == expected => {}
            _ => {
                warn!("Cron authentication failed");
                return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
            }
        }
    }

    info!("Cron tick requested");
    match tokio::time::timeout(state.handler_timeout, state.scheduler.run_tick()).await {
        Ok(Ok(report)) => Ok(Json(json!({ "success": true, "report": report }))),
        Ok(Err(e)) => {
            error!("Cron tick failed: {e:#}");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
        }
        Err(_) => {
            error!(
                timeout_secs = state.handler_timeout.as_secs(),
                "Cron tick exceeded handler timeout"
            );
            Err(api_error(StatusCode::GATEWAY_TIMEOUT, "Cron tick timed out"))
        }
    }
}

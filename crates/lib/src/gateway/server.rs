//! Gateway HTTP server: health check and the LINE webhook route.

use crate::channels::line::{LineReplyClient, LineWebhook, RawRequest};
use crate::config::{self, Config};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Path the platform delivers webhook POSTs to.
pub const LINE_WEBHOOK_PATH: &str = "/line/webhook";

/// Shared state for the gateway. Immutable after startup; requests share nothing mutable.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// None when channel credentials are not configured; the webhook route then answers 500.
    pub line: Option<Arc<LineWebhook>>,
}

impl GatewayState {
    /// Build the LINE webhook from the credentials and reply policy in `config` alone; env
    /// overrides are applied earlier by `config::load_config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let policy = config
            .channels
            .line
            .reply_policy()
            .context("invalid channels.line reply policy")?;
        let line = match config::resolve_line_credentials(&config) {
            Some(credentials) => {
                let client = LineReplyClient::new(
                    credentials.channel_token.clone(),
                    config.channels.line.api_base_url.clone(),
                );
                log::info!(
                    "line channel configured (api {}, {} message(s) per reply, {} reply call(s) per event)",
                    client.base_url(),
                    policy.echo_count(),
                    policy.reply_calls()
                );
                Some(Arc::new(LineWebhook::new(
                    &credentials,
                    policy,
                    Arc::new(client),
                )))
            }
            None => {
                log::warn!(
                    "line channel not configured (set {} and {} or channels.line in config); webhook requests will fail",
                    config::CHANNEL_TOKEN_ENV,
                    config::CHANNEL_SECRET_ENV
                );
                None
            }
        };
        Ok(Self {
            config: Arc::new(config),
            line,
        })
    }
}

/// Routes: `GET /` health, `POST /line/webhook`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(LINE_WEBHOOK_PATH, post(line_webhook))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = GatewayState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST /line/webhook: verifies x-line-signature, decodes events, replies. Bare status, no body.
async fn line_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(line) = state.line.as_ref() else {
        log::warn!("line webhook: channel not configured");
        return StatusCode::INTERNAL_SERVER_ERROR;
    };
    let request = RawRequest::from_http(&headers, body);
    line.handle(&request).await.status_code()
}

/// GET / returns a simple health JSON (for liveness checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let line = if state.line.is_some() {
        "configured"
    } else {
        "unconfigured"
    };
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "line": line,
    }))
}

//! # Server Module
//!
//! HTTP server setup and route configuration for the control API.

use anyhow::Context;
use axum::{middleware, routing::{get, post}, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::agent::executor::TradeExecutor;
use crate::agent::TradingAgent;
use crate::auth::ControlToken;
use crate::config::ServerConfig;
use crate::routes::{agent, health::ping, wallet};

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<TradeExecutor>,
    pub agent: Arc<TradingAgent>,
    /// Used when a request does not name its own slippage.
    pub default_slippage: f64,
}

/// Build the router: `/ping` is open, everything under `/api` needs the
/// control token.
pub fn router(state: AppState, token: ControlToken) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/wallet/balance", get(wallet::get_wallet_balance))
        .route("/api/v1/wallet/holdings", get(wallet::get_holdings))
        .route("/api/v1/wallet/buy", post(wallet::buy))
        .route("/api/v1/wallet/sell", post(wallet::sell))
        .route("/api/v1/wallet/sell-all", post(wallet::sell_all))
        .route("/api/v1/wallet/withdraw", post(wallet::withdraw))
        .route("/api/v1/agent/status", get(agent::get_agent_status))
        .layer(middleware::from_fn_with_state(token, ControlToken::validate));

    Router::new()
        .route("/ping", get(ping))
        .merge(api_routes)
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_methods([
                        axum::http::Method::GET,
                        axum::http::Method::POST,
                        axum::http::Method::OPTIONS,
                    ])
                    .allow_headers([
                        axum::http::header::ORIGIN,
                        axum::http::header::CONTENT_TYPE,
                        axum::http::header::ACCEPT,
                        axum::http::header::AUTHORIZATION,
                    ]),
            ),
        )
        .with_state(state)
}

/// Serve the control API until ctrl-c.
pub async fn serve(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid server address {}:{}", config.host, config.port))?;
    let app = router(state, ControlToken::new(config.control_token.clone()));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}, port may already be in use"))?;

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Health check available at http://{}/ping", addr);
    tracing::info!("Wallet endpoints available at http://{}/api/v1/wallet/*", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("server error")
}

//! # Wallet Routes
//!
//! Manual control of the trading wallet:
//! - SOL balance and tracked holdings
//! - buy, sell, sell-all and withdraw through the execution engine
//!
//! All endpoints sit behind the control-token middleware.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};

use crate::agent::{Coin, TradeReceipt};
use crate::routes::{api_error, bad_request, ApiError};
use crate::server::AppState;
use crate::services::Holding;

#[derive(Debug, Serialize)]
pub struct WalletBalanceResponse {
    pub wallet: String,
    /// SOL, not lamports
    pub sol_balance: f64,
}

#[derive(Debug, Serialize)]
pub struct HoldingsResponse {
    pub wallet: String,
    pub holdings: BTreeMap<String, Holding>,
}

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub mint: String,
    pub bonding_curve: String,
    pub sol_amount: f64,
    pub slippage: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SellRequest {
    pub mint: String,
    /// Defaults to the whole position.
    pub percentage: Option<f64>,
    pub slippage: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SellAllQuery {
    pub slippage: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SellAllResponse {
    pub sold: usize,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub to: String,
    pub sol_amount: f64,
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub signature: String,
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey, ApiError> {
    Pubkey::from_str(value).map_err(|e| {
        warn!("Invalid {} provided: {} - Error: {}", field, value, e);
        bad_request(format!("Invalid {}: {}", field, e))
    })
}

/// GET /api/v1/wallet/balance
pub async fn get_wallet_balance(State(state): State<AppState>) -> Result<Json<WalletBalanceResponse>, ApiError> {
    let sol_balance = state.executor.balance().await.map_err(api_error)?;
    Ok(Json(WalletBalanceResponse {
        wallet: state.executor.wallet().to_string(),
        sol_balance,
    }))
}

/// GET /api/v1/wallet/holdings
pub async fn get_holdings(State(state): State<AppState>) -> Json<HoldingsResponse> {
    Json(HoldingsResponse {
        wallet: state.executor.wallet().to_string(),
        holdings: state.executor.holdings().await,
    })
}

/// POST /api/v1/wallet/buy
pub async fn buy(
    State(state): State<AppState>,
    Json(request): Json<BuyRequest>,
) -> Result<Json<TradeReceipt>, ApiError> {
    let mint = parse_pubkey("mint", &request.mint)?;
    let bonding_curve = parse_pubkey("bonding_curve", &request.bonding_curve)?;
    let slippage = request.slippage.unwrap_or(state.default_slippage);
    info!("Manual buy of {} for {} SOL", mint, request.sol_amount);

    let mut coin = Coin::new(mint, bonding_curve, 0.0);
    let receipt = state
        .executor
        .buy(&mut coin, request.sol_amount, slippage)
        .await
        .map_err(api_error)?;
    Ok(Json(receipt))
}

/// POST /api/v1/wallet/sell
pub async fn sell(
    State(state): State<AppState>,
    Json(request): Json<SellRequest>,
) -> Result<Json<TradeReceipt>, ApiError> {
    let mint = parse_pubkey("mint", &request.mint)?;
    let percentage = request.percentage.unwrap_or(100.0);
    let slippage = request.slippage.unwrap_or(state.default_slippage);
    info!("Manual sell of {}% of {}", percentage, mint);

    let receipt = state
        .executor
        .sell(&mint, percentage, slippage)
        .await
        .map_err(api_error)?;
    Ok(Json(receipt))
}

/// POST /api/v1/wallet/sell-all
pub async fn sell_all(
    State(state): State<AppState>,
    Query(query): Query<SellAllQuery>,
) -> Result<Json<SellAllResponse>, ApiError> {
    let slippage = query.slippage.unwrap_or(state.default_slippage);
    let sold = state.executor.sell_all(slippage).await.map_err(api_error)?;
    Ok(Json(SellAllResponse { sold }))
}

/// POST /api/v1/wallet/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Json(request): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let to = parse_pubkey("to", &request.to)?;
    let signature = state
        .executor
        .withdraw(&to, request.sol_amount)
        .await
        .map_err(api_error)?;
    Ok(Json(WithdrawResponse {
        signature: signature.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use solana_sdk::native_token::LAMPORTS_PER_SOL;
    use tower::ServiceExt;

    use super::*;
    use crate::agent::classifier::RejectAll;
    use crate::agent::executor::tests::{executor_with, listed_coin};
    use crate::agent::features::tests::SilentSource;
    use crate::agent::planner::TradingSession;
    use crate::agent::TradingAgent;
    use crate::auth::ControlToken;
    use crate::config::TradingConfig;
    use crate::onchain_instance::rpc::fake::FakeRpc;
    use crate::server::router;

    const TOKEN: &str = "test-token";

    fn app(rpc: Arc<FakeRpc>) -> Router {
        let executor = Arc::new(executor_with(rpc, None));
        let agent = Arc::new(TradingAgent::new(
            TradingConfig::default(),
            Duration::from_secs(60),
            Arc::new(TradingSession::new()),
            Arc::new(SilentSource),
            Arc::new(RejectAll),
            executor.clone(),
        ));
        let state = AppState {
            executor,
            agent,
            default_slippage: 0.04,
        };
        router(state, ControlToken::new(TOKEN))
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN));
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn balance_reports_sol() {
        let rpc = Arc::new(FakeRpc::default());
        *rpc.lamports.lock() = 2 * LAMPORTS_PER_SOL;
        let (status, body) = call(app(rpc), Method::GET, "/api/v1/wallet/balance", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sol_balance"], 2.0);
    }

    #[tokio::test]
    async fn api_requires_control_token() {
        let response = app(Arc::new(FakeRpc::default()))
            .oneshot(Request::builder().uri("/api/v1/wallet/holdings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ping_is_open() {
        let response = app(Arc::new(FakeRpc::default()))
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn buy_then_holdings_then_sell() {
        let rpc = Arc::new(FakeRpc::default());
        let coin = listed_coin(&rpc);
        let app = app(rpc.clone());

        let (status, receipt) = call(
            app.clone(),
            Method::POST,
            "/api/v1/wallet/buy",
            Some(json!({
                "mint": coin.mint.to_string(),
                "bonding_curve": coin.bonding_curve.to_string(),
                "sol_amount": 0.3,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt["lamport_bound"], 312_000_000u64);

        let (_, holdings) = call(app.clone(), Method::GET, "/api/v1/wallet/holdings", None).await;
        assert!(holdings["holdings"].get(coin.mint.to_string()).is_some());

        let (status, _) = call(
            app.clone(),
            Method::POST,
            "/api/v1/wallet/sell",
            Some(json!({ "mint": coin.mint.to_string() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rpc.sent_count(), 2);

        let (_, holdings) = call(app, Method::GET, "/api/v1/wallet/holdings", None).await;
        assert!(holdings["holdings"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_inputs_map_to_client_errors() {
        let rpc = Arc::new(FakeRpc::default());
        let app = app(rpc.clone());

        let (status, body) = call(
            app.clone(),
            Method::POST,
            "/api/v1/wallet/buy",
            Some(json!({ "mint": "not-a-key", "bonding_curve": "x", "sol_amount": 0.1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("mint"));

        let (status, _) = call(
            app.clone(),
            Method::POST,
            "/api/v1/wallet/sell",
            Some(json!({ "mint": Pubkey::new_unique().to_string() })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        *rpc.lamports.lock() = LAMPORTS_PER_SOL;
        let (status, _) = call(
            app,
            Method::POST,
            "/api/v1/wallet/withdraw",
            Some(json!({ "to": Pubkey::new_unique().to_string(), "sol_amount": 1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(rpc.sent_count(), 0);
    }

    #[tokio::test]
    async fn sell_all_with_empty_ledger_sells_nothing() {
        let (status, body) = call(
            app(Arc::new(FakeRpc::default())),
            Method::POST,
            "/api/v1/wallet/sell-all?slippage=0.1",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sold"], 0);
    }
}

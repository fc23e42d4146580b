// # Routes Module
//
// - HTTP handlers for the control API, grouped by functionality.
//
//  ## Available Route Modules
// - `health`: liveness probe
// - `wallet`: balance, holdings and manual trades on the trading wallet
// - `agent`: trading agent status

use axum::{http::StatusCode, response::Json};
use serde::Serialize;

use crate::agent::AgentError;

/// Health check and monitoring endpoints
pub mod health;

/// Trading wallet endpoints
pub mod wallet;

/// Trading agent endpoints
pub mod agent;

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Per-mint failures of a partial sell-all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<MintFailure>,
}

#[derive(Debug, Serialize)]
pub struct MintFailure {
    pub mint: String,
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            failures: Vec::new(),
        }),
    )
}

/// Map an engine error onto an HTTP status.
pub fn api_error(err: AgentError) -> ApiError {
    let status = match &err {
        AgentError::Validation(_) | AgentError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
        AgentError::NotHolding(_) => StatusCode::NOT_FOUND,
        AgentError::Rpc(_) | AgentError::Http(_) | AgentError::Decode(_) => StatusCode::BAD_GATEWAY,
        AgentError::SellAllIncomplete { .. } => StatusCode::MULTI_STATUS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let failures = match &err {
        AgentError::SellAllIncomplete { failures, .. } => failures
            .iter()
            .map(|(mint, error)| MintFailure {
                mint: mint.clone(),
                error: error.clone(),
            })
            .collect(),
        _ => Vec::new(),
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            failures,
        }),
    )
}

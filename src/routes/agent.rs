use axum::{extract::State, response::Json};

use crate::agent::trading_agent::AgentStatus;
use crate::server::AppState;

/// GET /api/v1/agent/status
///
/// Session flags, balances and pipeline counters of the running agent.
pub async fn get_agent_status(State(state): State<AppState>) -> Json<AgentStatus> {
    Json(state.agent.status())
}

use axum::response::Json;
use serde_json::{json, Value};

/// Health check endpoint handler.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ping`
///
/// Unauthenticated; answers `{"status":"pong"}` while the process is up.
///
/// # Examples
/// ```bash
/// curl http://localhost:3000/ping
/// # Response: {"status":"pong"}
/// ```
pub async fn ping() -> Json<Value> {
    Json(json!({ "status": "pong" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_pongs() {
        let Json(body) = ping().await;
        assert_eq!(body["status"], "pong");
    }
}

//! Authentication Middleware
//!
//! Axum middleware that compares the bearer token of every `/api` request
//! against the configured control token.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Shared secret for the control API.
#[derive(Clone)]
pub struct ControlToken(Arc<String>);

impl ControlToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(token.into()))
    }

    fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.is_empty() || expected.len() != candidate.len() {
            return false;
        }
        // constant time over equal-length inputs
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Middleware function for validating the bearer token
    pub async fn validate(
        State(token): State<ControlToken>,
        req: Request,
        next: Next,
    ) -> Result<Response, StatusCode> {
        let verdict = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|auth_header| auth_header.strip_prefix("Bearer "))
            .map(|candidate| token.matches(candidate.trim()));

        match verdict {
            Some(true) => Ok(next.run(req).await),
            Some(false) => {
                tracing::warn!("[ControlToken] Rejected token for {} {}", req.method(), req.uri());
                Err(StatusCode::UNAUTHORIZED)
            }
            None => {
                tracing::warn!("[ControlToken] Missing Authorization header for {} {}", req.method(), req.uri());
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

impl std::fmt::Debug for ControlToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ControlToken(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn guarded() -> Router {
        let token = ControlToken::new("s3cret");
        Router::new()
            .route("/api/v1/probe", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(token, ControlToken::validate))
    }

    async fn status_for(auth: Option<&str>) -> StatusCode {
        let mut request = axum::http::Request::builder().uri("/api/v1/probe");
        if let Some(value) = auth {
            request = request.header(header::AUTHORIZATION, value);
        }
        guarded()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn accepts_matching_bearer() {
        assert_eq!(status_for(Some("Bearer s3cret")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_token() {
        assert_eq!(status_for(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(Some("Bearer nope")).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(Some("s3cret")).await, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn empty_token_never_matches() {
        assert!(!ControlToken::new("").matches(""));
    }
}

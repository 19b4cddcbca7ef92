//! Bearer-token gate applied to every authenticated endpoint. A single
//! shared secret is compared in constant time to avoid leaking match
//! length through response timing.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::HttpConfig;
use crate::OpsCoreError;

#[derive(Clone)]
pub struct AuthState {
    config: HttpConfig,
}

pub fn create_auth_state(config: HttpConfig) -> Arc<AuthState> {
    Arc::new(AuthState { config })
}

pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    // CORS preflight carries no Authorization header; let it through so
    // the browser's actual request can proceed to the real auth check.
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let provided = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let provided = match provided {
        Some(token) => token,
        None => {
            tracing::warn!(path = %request.uri().path(), "missing or malformed bearer token");
            return Err(axum::response::IntoResponse::into_response(OpsCoreError::Unauthorized));
        }
    };

    if provided.as_bytes().ct_eq(auth_state.config.api_key.as_bytes()).into() {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(path = %request.uri().path(), "bearer token mismatch");
        Err(axum::response::IntoResponse::into_response(OpsCoreError::Unauthorized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn router() -> Router {
        let auth_state = create_auth_state(HttpConfig {
            listen_addr: "0.0.0.0:0".to_string(),
            api_key: "secret-token".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
        });
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(auth_state, auth_middleware))
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let response = router()
            .oneshot(Request::builder().uri("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn correct_token_is_accepted() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header("authorization", "Bearer secret-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

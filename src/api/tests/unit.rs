use super::*;
use crate::config::HttpConfig;
use crate::routing_client::RoutingClient;
use crate::store::memory::InMemoryStateStore;
use crate::store::StateStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

pub(crate) fn test_server() -> (ApiServer, Arc<dyn StateStore>) {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let lifecycle = Arc::new(LifecycleManager::new(store.clone()));
    let routing_client = Arc::new(RoutingClient::new("http://127.0.0.1:1", 1).unwrap());
    let workflow = Arc::new(WorkflowEngine::new(store.clone(), lifecycle.clone(), routing_client));
    let config = Arc::new(HttpConfig {
        listen_addr: "0.0.0.0:0".to_string(),
        api_key: "test-secret-key".to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
    });
    (ApiServer::new(config, lifecycle, workflow), store)
}

#[tokio::test]
async fn health_check_requires_no_auth() {
    let (server, _store) = test_server();
    let response = server
        .build_router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn state_read_without_bearer_token_is_unauthorized() {
    let (server, _store) = test_server();
    let response = server
        .build_router()
        .oneshot(
            Request::builder()
                .uri("/v1/opscore/agent/a1/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn state_read_for_unknown_agent_is_not_found() {
    let (server, _store) = test_server();
    let response = server
        .build_router()
        .oneshot(
            Request::builder()
                .uri("/v1/opscore/agent/ghost/state")
                .header("authorization", "Bearer test-secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

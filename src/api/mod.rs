//! HTTP ingress: state callbacks, state reads, workflow triggers,
//! registration webhooks, and a liveness probe. Composes the bearer-auth,
//! request-tracing, and CORS middleware layers around a fixed route set.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{auth_middleware, create_auth_state};
use crate::config::HttpConfig;
use crate::lifecycle::LifecycleManager;
use crate::models::{AgentLifecycleState, AgentRegistration, WorkflowDefinition};
use crate::workflow::WorkflowEngine;
use crate::{OpsCoreError, Result};

const SERVICE_NAME: &str = "ops-core";
const SERVICE_VERSION: &str = "0.1.0";

const ROUTE_HEALTH: &str = "/health";
const ROUTE_AGENT_STATE: &str = "/v1/opscore/agent/{agent_id}/state";
const ROUTE_AGENT_WORKFLOW: &str = "/v1/opscore/agent/{agent_id}/workflow";
const ROUTE_AGENT_NOTIFY: &str = "/v1/opscore/internal/agent/notify";

#[derive(Clone)]
pub struct ApiServer {
    config: Arc<HttpConfig>,
    lifecycle: Arc<LifecycleManager>,
    workflow: Arc<WorkflowEngine>,
}

impl ApiServer {
    pub fn new(config: Arc<HttpConfig>, lifecycle: Arc<LifecycleManager>, workflow: Arc<WorkflowEngine>) -> Self {
        Self {
            config,
            lifecycle,
            workflow,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let app = self.build_router();

        let listener = tokio::net::TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|e| OpsCoreError::ConfigurationError(e.to_string()))?;

        tracing::info!(addr = %self.config.listen_addr, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(crate::shutdown_signal())
            .await
            .map_err(|e| OpsCoreError::ConfigurationError(e.to_string()))?;

        Ok(())
    }

    pub fn build_router(&self) -> Router {
        let auth_state = create_auth_state((*self.config).clone());

        // Restrictive by construction: only the configured origins are
        // ever allowed, never `*`. An unparseable origin is dropped
        // rather than widening the allow list.
        let cors_layer = CorsLayer::new()
            .allow_origin(
                self.config
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION])
            .max_age(Duration::from_secs(3600));

        let protected = Router::new()
            .route(ROUTE_AGENT_STATE, get(get_agent_state).post(post_agent_state))
            .route(ROUTE_AGENT_WORKFLOW, post(trigger_workflow))
            .layer(axum::middleware::from_fn_with_state(auth_state, auth_middleware));

        let public = Router::new()
            .route(ROUTE_HEALTH, get(health_check))
            .route(ROUTE_AGENT_NOTIFY, post(agent_notify));

        public
            .merge(protected)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer)
                    .layer(axum::middleware::from_fn(timeout_middleware)),
            )
            .with_state(self.clone())
    }
}

async fn timeout_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(
        Duration::from_secs(crate::constants::HTTP_HANDLER_TIMEOUT_SECONDS),
        next.run(request),
    )
    .await
    {
        Ok(response) => response,
        Err(_elapsed) => {
            tracing::warn!(%path, "request exceeded handler timeout");
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(serde_json::json!({ "detail": "request timed out" })),
            )
                .into_response()
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok", "service": SERVICE_NAME, "version": SERVICE_VERSION }))
}

#[derive(Debug, Deserialize)]
struct StateCallbackRequest {
    #[serde(rename = "agentId")]
    agent_id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    /// Deserialized as a raw string rather than `AgentLifecycleState`
    /// directly: an out-of-enum value must fail as `InvalidState` from
    /// inside the handler (a `400 {"detail": ...}` body), not as axum's
    /// own JSON-rejection response for a failed field deserialize.
    state: String,
    #[serde(default)]
    details: Option<std::collections::HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

fn parse_lifecycle_state(raw: &str) -> Result<AgentLifecycleState> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| OpsCoreError::InvalidState(format!("unknown agent state: {raw}")))
}

async fn post_agent_state(
    State(api): State<ApiServer>,
    Path(agent_id): Path<String>,
    Json(body): Json<StateCallbackRequest>,
) -> Result<Json<StatusResponse>> {
    if body.agent_id != agent_id {
        return Err(OpsCoreError::InvalidRequest(
            "agentId in body must equal path parameter".to_string(),
        ));
    }

    let state = parse_lifecycle_state(&body.state)?;
    api.lifecycle
        .set_state(&agent_id, state, body.timestamp, body.details)
        .await?;

    Ok(Json(StatusResponse { status: "success" }))
}

#[derive(Debug, Serialize)]
struct AgentStateResponse {
    #[serde(rename = "agentId")]
    agent_id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    state: AgentLifecycleState,
    details: Option<std::collections::HashMap<String, String>>,
}

async fn get_agent_state(
    State(api): State<ApiServer>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentStateResponse>> {
    let state = api
        .lifecycle
        .get_state(&agent_id)
        .await?
        .ok_or_else(|| OpsCoreError::AgentNotFound(agent_id.clone()))?;

    Ok(Json(AgentStateResponse {
        agent_id: state.agent_id,
        timestamp: state.timestamp,
        state: state.state,
        details: state.details,
    }))
}

#[derive(Debug, Deserialize)]
struct TriggerWorkflowRequest {
    #[serde(rename = "workflowDefinitionId")]
    workflow_definition_id: Option<String>,
    #[serde(rename = "workflowDefinition")]
    workflow_definition: Option<WorkflowDefinition>,
    #[serde(rename = "initialPayload")]
    initial_payload: Option<Value>,
}

#[derive(Debug, Serialize)]
struct TriggerWorkflowResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "workflowId")]
    workflow_id: String,
}

async fn trigger_workflow(
    State(api): State<ApiServer>,
    Path(agent_id): Path<String>,
    Json(body): Json<TriggerWorkflowRequest>,
) -> Result<Json<TriggerWorkflowResponse>> {
    let outcome = api
        .workflow
        .trigger(
            &agent_id,
            body.workflow_definition_id,
            body.workflow_definition,
            body.initial_payload,
        )
        .await?;

    Ok(Json(TriggerWorkflowResponse {
        session_id: outcome.session_id,
        workflow_id: outcome.workflow_id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event_type", rename_all = "UPPERCASE")]
enum NotifyRequest {
    Register { agent_details: AgentRegistration },
    Deregister { agent_details: AgentRegistration },
}

async fn agent_notify(State(api): State<ApiServer>, Json(body): Json<NotifyRequest>) -> Result<Json<StatusResponse>> {
    match body {
        NotifyRequest::Register { agent_details } => {
            api.lifecycle.register_agent(agent_details).await?;
        }
        NotifyRequest::Deregister { agent_details } => {
            api.lifecycle.deregister_agent(&agent_details.agent_id).await?;
        }
    }
    Ok(Json(StatusResponse { status: "success" }))
}

#[cfg(test)]
mod tests;

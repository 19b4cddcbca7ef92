use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Convenience type alias for Results with OpsCoreError
pub type Result<T> = std::result::Result<T, OpsCoreError>;

/// Error taxonomy for Ops-Core.
///
/// Every variant maps to a stable HTTP status via `IntoResponse`;
/// `TaskDispatchError` never reaches a handler — it is consumed
/// entirely within the workflow engine's dispatch loop.
#[derive(Error, Debug)]
pub enum OpsCoreError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("agent already exists: {0}")]
    AgentAlreadyExists(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("workflow definition not found: {0}")]
    WorkflowDefinitionNotFound(String),

    #[error("workflow definition conflict: {0}")]
    WorkflowDefinitionConflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("task dispatch error (status {status:?}): {message}")]
    TaskDispatchError {
        status: Option<u16>,
        message: String,
    },

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for OpsCoreError {
    fn from(err: redis::RedisError) -> Self {
        OpsCoreError::StorageError(err.to_string())
    }
}

impl From<reqwest::Error> for OpsCoreError {
    fn from(err: reqwest::Error) -> Self {
        OpsCoreError::TaskDispatchError {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl OpsCoreError {
    /// Safe, stack-trace-free summary returned to HTTP clients.
    fn detail(&self) -> String {
        match self {
            OpsCoreError::AgentNotFound(_) => "AgentNotFound".to_string(),
            OpsCoreError::AgentAlreadyExists(_) => "AgentAlreadyExists".to_string(),
            OpsCoreError::SessionNotFound(_) => "SessionNotFound".to_string(),
            OpsCoreError::WorkflowDefinitionNotFound(_) => {
                "WorkflowDefinitionNotFound".to_string()
            }
            OpsCoreError::WorkflowDefinitionConflict(_) => {
                "WorkflowDefinitionConflict".to_string()
            }
            OpsCoreError::InvalidState(msg) => msg.clone(),
            OpsCoreError::InvalidRequest(msg) => msg.clone(),
            OpsCoreError::Unauthorized => "Unauthorized".to_string(),
            OpsCoreError::StorageError(_) => "Internal Server Error".to_string(),
            OpsCoreError::TaskDispatchError { .. } => "Internal Server Error".to_string(),
            OpsCoreError::ConfigurationError(_) => "Internal Server Error".to_string(),
            OpsCoreError::Serialization(_) => "Internal Server Error".to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            OpsCoreError::AgentNotFound(_) => StatusCode::NOT_FOUND,
            OpsCoreError::AgentAlreadyExists(_) => StatusCode::CONFLICT,
            OpsCoreError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            OpsCoreError::WorkflowDefinitionNotFound(_) => StatusCode::NOT_FOUND,
            OpsCoreError::WorkflowDefinitionConflict(_) => StatusCode::CONFLICT,
            OpsCoreError::InvalidState(_) => StatusCode::BAD_REQUEST,
            OpsCoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OpsCoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            OpsCoreError::StorageError(_) => StatusCode::SERVICE_UNAVAILABLE,
            OpsCoreError::TaskDispatchError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            OpsCoreError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OpsCoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OpsCoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Full detail goes to the log; only a safe summary crosses the wire.
        tracing::error!(error = %self, status = %status, "request failed");
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

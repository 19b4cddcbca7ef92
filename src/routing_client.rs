//! Outbound HTTP client for the external agent-routing service. Ops-Core
//! never talks to an agent directly; every dispatch goes through the
//! routing service's `run` endpoint, which is treated as a black box that
//! eventually triggers a state callback.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::{OpsCoreError, Result};

#[derive(Debug, Serialize)]
struct DispatchRequest {
    #[serde(rename = "senderId")]
    sender_id: &'static str,
    #[serde(rename = "messageType")]
    message_type: &'static str,
    payload: Value,
    opscore_session_id: String,
    opscore_task_id: String,
}

pub struct RoutingClient {
    http: reqwest::Client,
    base_url: String,
}

impl RoutingClient {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(OpsCoreError::from)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Posts a task to `{base_url}/v1/agents/{agent_id}/run`. A `2xx`
    /// response means the task was accepted for asynchronous dispatch;
    /// anything else (including connection/timeout errors) raises
    /// `TaskDispatchError` for the workflow engine to act on.
    pub async fn dispatch(
        &self,
        agent_id: &str,
        session_id: &str,
        task_id: &str,
        payload: Value,
    ) -> Result<()> {
        let url = format!("{}/v1/agents/{}/run", self.base_url.trim_end_matches('/'), agent_id);
        let body = DispatchRequest {
            sender_id: "opscore",
            message_type: "workflow_task",
            payload,
            opscore_session_id: session_id.to_string(),
            opscore_task_id: task_id.to_string(),
        };

        let response = self.http.post(&url).json(&body).send().await.map_err(|err| {
            OpsCoreError::TaskDispatchError {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(OpsCoreError::TaskDispatchError {
            status: Some(status.as_u16()),
            message: format!("routing service returned {status}"),
        })
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A registered agent. Created once by the registration webhook and
/// never mutated afterward — re-registration of the same `agent_id`
/// fails with `AgentAlreadyExists`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRegistration {
    pub agent_id: String,
    pub agent_name: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub contact_endpoint: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub registration_time: chrono::DateTime<chrono::Utc>,
}

/// Lifecycle state reported by an agent, either synthesized at
/// registration (`UNKNOWN`) or pushed by a state callback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgentLifecycleState {
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "initializing")]
    Initializing,
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "finished")]
    Finished,
    #[serde(rename = "error")]
    Error,
}

impl AgentLifecycleState {
    pub fn is_ready(self) -> bool {
        matches!(self, AgentLifecycleState::Idle)
    }

    pub fn is_contention(self) -> bool {
        matches!(
            self,
            AgentLifecycleState::Initializing
                | AgentLifecycleState::Active
                | AgentLifecycleState::Unknown
        )
    }

    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            AgentLifecycleState::Error | AgentLifecycleState::Finished
        )
    }
}

/// One recorded state transition for an agent. Stores keep one `latest`
/// record per agent plus an append-only history of every transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentState {
    pub agent_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub state: AgentLifecycleState,
    #[serde(default)]
    pub details: Option<HashMap<String, String>>,
}

impl AgentState {
    pub fn unknown(agent_id: impl Into<String>, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp: now,
            state: AgentLifecycleState::Unknown,
            details: None,
        }
    }
}

/// A single task descriptor inside a workflow definition. Only
/// `task_name` presence is validated — the parameter schema is
/// deliberately open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDescriptor {
    pub task_name: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub overrides: HashMap<String, serde_json::Value>,
}

/// A declarative, named, versioned, ordered list of task descriptors.
/// Immutable once saved under an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub version: String,
    pub tasks: Vec<TaskDescriptor>,
}

impl WorkflowDefinition {
    /// Assigns an id if the caller didn't supply one.
    pub fn with_generated_id(mut self) -> Self {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::OpsCoreError::InvalidRequest(
                "workflow definition name must not be empty".to_string(),
            ));
        }
        if self.version.trim().is_empty() {
            return Err(crate::OpsCoreError::InvalidRequest(
                "workflow definition version must not be empty".to_string(),
            ));
        }
        if self.tasks.is_empty() {
            return Err(crate::OpsCoreError::InvalidRequest(
                "workflow definition must declare at least one task".to_string(),
            ));
        }
        for task in &self.tasks {
            if task.task_name.trim().is_empty() {
                return Err(crate::OpsCoreError::InvalidRequest(
                    "every task descriptor requires a non-empty task_name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Runtime instance of a workflow for a specific agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSession {
    pub session_id: String,
    pub agent_id: String,
    pub workflow_id: String,
    pub status: SessionStatus,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub last_updated_time: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Started,
    Running,
    Completed,
    Failed,
}

/// A patch applied to a session's mutable fields via `updateSession`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub metadata: Option<HashMap<String, String>>,
}

/// A unit of work emitted from a workflow. Transient: lives in the
/// queue and in-flight dispatch state only, never persisted after a
/// successful dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub session_id: String,
    pub agent_id: String,
    pub workflow_id: String,
    pub task_name: String,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    /// Earliest time this task may be dispatched, set by `scheduleTask`.
    pub earliest_dispatch: chrono::DateTime<chrono::Utc>,
}

impl Task {
    pub fn new(
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        workflow_id: impl Into<String>,
        descriptor: &TaskDescriptor,
        max_retries: u32,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            workflow_id: workflow_id.into(),
            task_name: descriptor.task_name.clone(),
            payload: descriptor.parameters.clone(),
            retry_count: 0,
            max_retries,
            enqueued_at: now,
            earliest_dispatch: now,
        }
    }

    pub fn is_due(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.earliest_dispatch <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_definition_rejects_empty_tasks() {
        let def = WorkflowDefinition {
            id: "w1".to_string(),
            name: "deploy".to_string(),
            version: "1".to_string(),
            tasks: vec![],
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn workflow_definition_rejects_blank_task_name() {
        let def = WorkflowDefinition {
            id: "w1".to_string(),
            name: "deploy".to_string(),
            version: "1".to_string(),
            tasks: vec![TaskDescriptor {
                task_name: "   ".to_string(),
                parameters: HashMap::new(),
                overrides: HashMap::new(),
            }],
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn generated_id_is_filled_only_when_absent() {
        let def = WorkflowDefinition {
            id: String::new(),
            name: "deploy".to_string(),
            version: "1".to_string(),
            tasks: vec![TaskDescriptor {
                task_name: "build".to_string(),
                parameters: HashMap::new(),
                overrides: HashMap::new(),
            }],
        }
        .with_generated_id();
        assert!(!def.id.is_empty());
    }
}

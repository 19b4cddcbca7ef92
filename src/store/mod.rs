//! Pluggable persistence for agent registrations, agent states, workflow
//! sessions, and workflow definitions.
//!
//! `StateStore` is the single shared mutable resource in the process: the
//! lifecycle manager and workflow engine both depend on it as an injected
//! dependency rather than reaching for a global. Two backends are provided,
//! [`memory::InMemoryStateStore`] for tests and small deployments, and
//! [`redis::RedisStateStore`] for production, chosen once at startup by
//! [`crate::config::StorageBackend`].

pub mod memory;
pub mod redis;

use crate::models::{AgentRegistration, AgentState, SessionPatch, WorkflowDefinition, WorkflowSession};
use crate::Result;
use async_trait::async_trait;

/// Operation set shared by every storage backend (registration CRUD, state
/// append + latest/history read, session CRUD, workflow-definition CRUD,
/// cleanup). All operations are asynchronous-capable: a backend is free to
/// perform network I/O, and every caller awaits.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_agent_registration(&self, reg: AgentRegistration) -> Result<()>;
    async fn read_agent_registration(&self, agent_id: &str) -> Result<Option<AgentRegistration>>;
    async fn agent_exists(&self, agent_id: &str) -> Result<bool>;

    /// Unconditional append to history; updates `latest` iff
    /// `state.timestamp >= stored latest.timestamp`.
    async fn save_agent_state(&self, state: AgentState) -> Result<()>;
    async fn read_latest_agent_state(&self, agent_id: &str) -> Result<Option<AgentState>>;
    /// Newest-first, optionally bounded.
    async fn read_agent_state_history(
        &self,
        agent_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AgentState>>;

    async fn create_session(&self, session: WorkflowSession) -> Result<()>;
    async fn read_session(&self, session_id: &str) -> Result<Option<WorkflowSession>>;
    async fn update_session_data(&self, session_id: &str, patch: SessionPatch) -> Result<WorkflowSession>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    async fn save_workflow_definition(&self, def: WorkflowDefinition) -> Result<()>;
    async fn read_workflow_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>>;

    /// Test/setup only — wipes every collection.
    async fn clear_all(&self) -> Result<()>;
}

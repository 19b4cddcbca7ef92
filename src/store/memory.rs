use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{AgentRegistration, AgentState, SessionPatch, WorkflowDefinition, WorkflowSession};
use crate::{OpsCoreError, Result};

use super::StateStore;

/// Process-local backend. Each collection is guarded by its own `RwLock`
/// so unrelated collections never contend with each other.
#[derive(Default)]
pub struct InMemoryStateStore {
    registrations: RwLock<HashMap<String, AgentRegistration>>,
    latest_states: RwLock<HashMap<String, AgentState>>,
    state_history: RwLock<HashMap<String, Vec<AgentState>>>,
    sessions: RwLock<HashMap<String, WorkflowSession>>,
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_agent_registration(&self, reg: AgentRegistration) -> Result<()> {
        let mut registrations = self.registrations.write().await;
        if registrations.contains_key(&reg.agent_id) {
            return Err(OpsCoreError::AgentAlreadyExists(reg.agent_id));
        }
        registrations.insert(reg.agent_id.clone(), reg);
        Ok(())
    }

    async fn read_agent_registration(&self, agent_id: &str) -> Result<Option<AgentRegistration>> {
        Ok(self.registrations.read().await.get(agent_id).cloned())
    }

    async fn agent_exists(&self, agent_id: &str) -> Result<bool> {
        Ok(self.registrations.read().await.contains_key(agent_id))
    }

    async fn save_agent_state(&self, state: AgentState) -> Result<()> {
        let mut latest = self.latest_states.write().await;
        let should_replace = match latest.get(&state.agent_id) {
            Some(current) => state.timestamp >= current.timestamp,
            None => true,
        };
        if should_replace {
            latest.insert(state.agent_id.clone(), state.clone());
        }
        drop(latest);

        self.state_history
            .write()
            .await
            .entry(state.agent_id.clone())
            .or_default()
            .push(state);
        Ok(())
    }

    async fn read_latest_agent_state(&self, agent_id: &str) -> Result<Option<AgentState>> {
        Ok(self.latest_states.read().await.get(agent_id).cloned())
    }

    async fn read_agent_state_history(
        &self,
        agent_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AgentState>> {
        let history = self.state_history.read().await;
        let mut records = history.get(agent_id).cloned().unwrap_or_default();
        records.reverse(); // newest-first
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn create_session(&self, session: WorkflowSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            return Err(OpsCoreError::InvalidRequest(format!(
                "session already exists: {}",
                session.session_id
            )));
        }
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn read_session(&self, session_id: &str) -> Result<Option<WorkflowSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn update_session_data(&self, session_id: &str, patch: SessionPatch) -> Result<WorkflowSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| OpsCoreError::SessionNotFound(session_id.to_string()))?;

        if let Some(status) = patch.status {
            session.status = status;
        }
        if let Some(metadata) = patch.metadata {
            session.metadata.extend(metadata);
        }
        session.last_updated_time = chrono::Utc::now();
        Ok(session.clone())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_none() {
            return Err(OpsCoreError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn save_workflow_definition(&self, def: WorkflowDefinition) -> Result<()> {
        let mut definitions = self.definitions.write().await;
        if let Some(existing) = definitions.get(&def.id) {
            if existing != &def {
                return Err(OpsCoreError::WorkflowDefinitionConflict(def.id));
            }
            return Ok(());
        }
        definitions.insert(def.id.clone(), def);
        Ok(())
    }

    async fn read_workflow_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        Ok(self.definitions.read().await.get(id).cloned())
    }

    async fn clear_all(&self) -> Result<()> {
        self.registrations.write().await.clear();
        self.latest_states.write().await.clear();
        self.state_history.write().await.clear();
        self.sessions.write().await.clear();
        self.definitions.write().await.clear();
        Ok(())
    }
}

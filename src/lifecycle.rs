//! Registers agents, transitions their lifecycle state, and opens/updates
//! sessions. Operates exclusively through a [`StateStore`]; every
//! existence invariant named in the data model is enforced here rather
//! than at the storage layer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{AgentRegistration, AgentState, AgentLifecycleState, SessionPatch, WorkflowSession, SessionStatus};
use crate::store::StateStore;
use crate::{OpsCoreError, Result};

pub struct LifecycleManager {
    store: Arc<dyn StateStore>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Stores the registration (fails on duplicate), then appends an
    /// initial `UNKNOWN` state. The two writes are not transactional: if
    /// the second fails, the registration is logged as orphaned rather
    /// than rolled back.
    pub async fn register_agent(&self, reg: AgentRegistration) -> Result<AgentRegistration> {
        self.store.save_agent_registration(reg.clone()).await?;

        let initial = AgentState::unknown(reg.agent_id.clone(), Utc::now());
        if let Err(err) = self.store.save_agent_state(initial).await {
            tracing::error!(agent_id = %reg.agent_id, error = %err, "orphaned registration: initial state write failed");
        }

        Ok(reg)
    }

    pub async fn deregister_agent(&self, agent_id: &str) -> Result<()> {
        // No dedicated deletion operation exists in the store contract;
        // deregistration is recorded as a terminal state transition so
        // the dispatch loop stops treating the agent as dispatchable.
        self.set_state(agent_id, AgentLifecycleState::Finished, Utc::now(), None)
            .await
    }

    pub async fn set_state(
        &self,
        agent_id: &str,
        new_state: AgentLifecycleState,
        timestamp: DateTime<Utc>,
        details: Option<HashMap<String, String>>,
    ) -> Result<()> {
        if !self.store.agent_exists(agent_id).await? {
            return Err(OpsCoreError::AgentNotFound(agent_id.to_string()));
        }

        let state = AgentState {
            agent_id: agent_id.to_string(),
            timestamp,
            state: new_state,
            details,
        };
        self.store.save_agent_state(state).await
    }

    pub async fn get_state(&self, agent_id: &str) -> Result<Option<AgentState>> {
        self.store.read_latest_agent_state(agent_id).await
    }

    pub async fn start_session(
        &self,
        agent_id: &str,
        workflow_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<WorkflowSession> {
        if !self.store.agent_exists(agent_id).await? {
            return Err(OpsCoreError::AgentNotFound(agent_id.to_string()));
        }
        if self.store.read_workflow_definition(workflow_id).await?.is_none() {
            return Err(OpsCoreError::WorkflowDefinitionNotFound(workflow_id.to_string()));
        }

        let now = Utc::now();
        let session = WorkflowSession {
            session_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            workflow_id: workflow_id.to_string(),
            status: SessionStatus::Started,
            start_time: now,
            last_updated_time: now,
            metadata,
        };
        self.store.create_session(session.clone()).await?;
        Ok(session)
    }

    pub async fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<WorkflowSession> {
        self.store.update_session_data(session_id, patch).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<WorkflowSession>> {
        self.store.read_session(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskDescriptor, WorkflowDefinition};
    use crate::store::memory::InMemoryStateStore;
    use std::collections::HashMap as Map;

    fn registration(agent_id: &str) -> AgentRegistration {
        AgentRegistration {
            agent_id: agent_id.to_string(),
            agent_name: "A".to_string(),
            version: "1".to_string(),
            capabilities: vec![],
            contact_endpoint: "http://h/run".to_string(),
            metadata: Map::new(),
            registration_time: Utc::now(),
        }
    }

    async fn manager_with_registered_agent(agent_id: &str) -> LifecycleManager {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let manager = LifecycleManager::new(store);
        manager.register_agent(registration(agent_id)).await.unwrap();
        manager
    }

    #[tokio::test]
    async fn registering_an_agent_seeds_unknown_state() {
        let manager = manager_with_registered_agent("a1").await;
        let state = manager.get_state("a1").await.unwrap().unwrap();
        assert_eq!(state.state, AgentLifecycleState::Unknown);
    }

    #[tokio::test]
    async fn set_state_on_unknown_agent_fails() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let manager = LifecycleManager::new(store);
        let result = manager
            .set_state("ghost", AgentLifecycleState::Idle, Utc::now(), None)
            .await;
        assert!(matches!(result, Err(OpsCoreError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn start_session_requires_existing_workflow() {
        let manager = manager_with_registered_agent("a1").await;
        let result = manager.start_session("a1", "missing-workflow", Map::new()).await;
        assert!(matches!(result, Err(OpsCoreError::WorkflowDefinitionNotFound(_))));
    }

    #[tokio::test]
    async fn start_session_succeeds_once_workflow_is_saved() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let manager = LifecycleManager::new(store.clone());
        manager.register_agent(registration("a1")).await.unwrap();

        let def = WorkflowDefinition {
            id: "w1".to_string(),
            name: "deploy".to_string(),
            version: "1".to_string(),
            tasks: vec![TaskDescriptor {
                task_name: "build".to_string(),
                parameters: Map::new(),
                overrides: Map::new(),
            }],
        };
        store.save_workflow_definition(def).await.unwrap();

        let session = manager.start_session("a1", "w1", Map::new()).await.unwrap();
        assert_eq!(session.status, SessionStatus::Started);
    }

    #[tokio::test]
    async fn update_session_on_missing_session_fails() {
        let manager = manager_with_registered_agent("a1").await;
        let result = manager.update_session("missing", SessionPatch::default()).await;
        assert!(matches!(result, Err(OpsCoreError::SessionNotFound(_))));
    }
}

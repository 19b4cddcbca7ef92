//! Loads workflow templates, persists definitions, enqueues tasks, and
//! runs the dispatch loop that gates task delivery on agent readiness.

pub mod queue;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::LifecycleManager;
use crate::models::{AgentLifecycleState, SessionPatch, SessionStatus, Task, WorkflowDefinition};
use crate::routing_client::RoutingClient;
use crate::store::StateStore;
use crate::{OpsCoreError, Result};

use self::queue::TaskQueue;

pub struct TriggerOutcome {
    pub session_id: String,
    pub workflow_id: String,
    pub enqueued_task_count: usize,
}

pub struct WorkflowEngine {
    store: Arc<dyn StateStore>,
    lifecycle: Arc<LifecycleManager>,
    routing_client: Arc<RoutingClient>,
    queue: TaskQueue,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        lifecycle: Arc<LifecycleManager>,
        routing_client: Arc<RoutingClient>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            routing_client,
            queue: TaskQueue::new(),
        }
    }

    /// Parses a template as JSON first, falling back to YAML. Validates
    /// `name`, `version`, and a non-empty `tasks` list, then persists
    /// through the state store. Returns the assigned id.
    pub async fn create_workflow_from_text(&self, raw: &str) -> Result<String> {
        let parsed: WorkflowDefinition = match serde_json::from_str(raw) {
            Ok(def) => def,
            Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
                OpsCoreError::InvalidRequest(format!(
                    "template is neither valid JSON ({json_err}) nor valid YAML ({yaml_err})"
                ))
            })?,
        };
        self.create_workflow(parsed).await
    }

    pub async fn create_workflow(&self, template: WorkflowDefinition) -> Result<String> {
        let def = template.with_generated_id();
        def.validate()?;
        let id = def.id.clone();
        self.store.save_workflow_definition(def).await?;
        Ok(id)
    }

    /// Either resolves a previously saved definition by id, or accepts an
    /// inline one (saving it if new, rejecting `WorkflowDefinitionConflict`
    /// if it collides with a different stored definition under the same
    /// id). Verifies the agent exists, opens a session, and enqueues one
    /// task per declared task descriptor.
    pub async fn trigger(
        &self,
        agent_id: &str,
        workflow_definition_id: Option<String>,
        inline_definition: Option<WorkflowDefinition>,
        _initial_payload: Option<Value>,
    ) -> Result<TriggerOutcome> {
        let definition = match (workflow_definition_id, inline_definition) {
            (Some(id), None) => self
                .store
                .read_workflow_definition(&id)
                .await?
                .ok_or_else(|| OpsCoreError::WorkflowDefinitionNotFound(id))?,
            (None, Some(inline)) => {
                let inline = inline.with_generated_id();
                inline.validate()?;
                match self.store.read_workflow_definition(&inline.id).await? {
                    Some(existing) if existing != inline => {
                        return Err(OpsCoreError::WorkflowDefinitionConflict(inline.id))
                    }
                    Some(existing) => existing,
                    None => {
                        self.store.save_workflow_definition(inline.clone()).await?;
                        inline
                    }
                }
            }
            (Some(_), Some(_)) | (None, None) => {
                return Err(OpsCoreError::InvalidRequest(
                    "exactly one of workflowDefinitionId or workflowDefinition is required"
                        .to_string(),
                ))
            }
        };

        if !self.store.agent_exists(agent_id).await? {
            return Err(OpsCoreError::AgentNotFound(agent_id.to_string()));
        }

        let session = self
            .lifecycle
            .start_session(agent_id, &definition.id, HashMap::new())
            .await?;

        for descriptor in &definition.tasks {
            let task = Task::new(
                &session.session_id,
                agent_id,
                &definition.id,
                descriptor,
                crate::constants::DEFAULT_TASK_MAX_RETRIES,
            );
            self.queue.enqueue(task).await;
        }

        Ok(TriggerOutcome {
            session_id: session.session_id,
            workflow_id: definition.id,
            enqueued_task_count: definition.tasks.len(),
        })
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// The cooperative dispatch worker. Blocks on the queue when empty
    /// instead of busy-polling, and exits once `shutdown` is cancelled
    /// and no due task remains.
    pub async fn run_dispatch_loop(&self, shutdown: CancellationToken) {
        loop {
            let now = Utc::now();
            match self.queue.try_dequeue_due(now).await {
                Some(task) => self.dispatch_one(task).await,
                None => {
                    if shutdown.is_cancelled() {
                        tracing::info!("dispatch loop: shutdown signal observed, queue drained");
                        return;
                    }
                    tokio::select! {
                        _ = self.queue.notified() => {}
                        _ = shutdown.cancelled() => {
                            // Finish this iteration; loop back to drain any
                            // remaining due tasks before exiting.
                        }
                        _ = tokio::time::sleep(tokio::time::Duration::from_millis(crate::constants::DISPATCH_LOOP_POLL_INTERVAL_MS)) => {
                            // Scheduled tasks become due without a fresh
                            // enqueue; wake periodically to notice them.
                        }
                    }
                }
            }
        }
    }

    pub(crate) async fn dispatch_one(&self, task: Task) {
        let lookup = tokio::time::timeout(
            std::time::Duration::from_secs(crate::constants::STATE_STORE_TIMEOUT_SECONDS),
            self.lifecycle.get_state(&task.agent_id),
        )
        .await;

        let state = match lookup {
            Ok(Ok(state)) => state,
            Ok(Err(err)) => {
                tracing::warn!(agent_id = %task.agent_id, error = %err, "state lookup failed, re-queueing as contention");
                self.queue.requeue(task).await;
                return;
            }
            Err(_elapsed) => {
                tracing::warn!(agent_id = %task.agent_id, task_id = %task.task_id, "state lookup timed out, re-queueing as contention");
                self.queue.requeue(task).await;
                return;
            }
        };

        match state {
            None => {
                self.handle_task_failure(task, "agent no longer available".to_string()).await;
            }
            Some(state) if state.state.is_ready() => {
                self.attempt_dispatch(task).await;
            }
            Some(state) if state.state.is_contention() => {
                tracing::debug!(agent_id = %task.agent_id, task_id = %task.task_id, "agent busy, re-queueing");
                self.queue.requeue(task).await;
            }
            Some(state) if state.state == AgentLifecycleState::Finished => {
                self.handle_task_failure(task, "agent no longer available".to_string()).await;
            }
            Some(_) => {
                // error
                self.handle_task_failure(task, "agent reported an error state".to_string()).await;
            }
        }
    }

    async fn attempt_dispatch(&self, task: Task) {
        let payload = Value::Object(
            task.payload
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        match self
            .routing_client
            .dispatch(&task.agent_id, &task.session_id, &task.task_id, payload)
            .await
        {
            Ok(()) => {
                tracing::info!(task_id = %task.task_id, agent_id = %task.agent_id, "task dispatched");
            }
            Err(OpsCoreError::TaskDispatchError { status: Some(status), message }) if (400..500).contains(&status) => {
                self.handle_task_failure(task, format!("routing service rejected task: {message}")).await;
            }
            Err(err) => {
                tracing::warn!(task_id = %task.task_id, error = %err, "retryable dispatch failure, re-queueing");
                self.queue.requeue(task).await;
            }
        }
    }

    async fn handle_task_failure(&self, mut task: Task, reason: String) {
        if task.retry_count < task.max_retries {
            task.retry_count += 1;
            tracing::warn!(task_id = %task.task_id, retry_count = task.retry_count, reason = %reason, "task failed, retrying");
            self.queue.requeue(task).await;
            return;
        }
        self.fallback(task, reason).await;
    }

    async fn fallback(&self, task: Task, reason: String) {
        tracing::error!(task_id = %task.task_id, session_id = %task.session_id, reason = %reason, "task permanently failed");

        let mut metadata = HashMap::new();
        metadata.insert("lastError".to_string(), reason);
        let patch = SessionPatch {
            status: Some(SessionStatus::Failed),
            metadata: Some(metadata),
        };
        if let Err(err) = self.lifecycle.update_session(&task.session_id, patch).await {
            tracing::error!(session_id = %task.session_id, error = %err, "failed to mark session failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentRegistration, TaskDescriptor};
    use crate::store::memory::InMemoryStateStore;
    use std::collections::HashMap as Map;

    async fn engine_with_registered_agent(agent_id: &str) -> (WorkflowEngine, Arc<dyn StateStore>) {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let lifecycle = Arc::new(LifecycleManager::new(store.clone()));
        lifecycle
            .register_agent(AgentRegistration {
                agent_id: agent_id.to_string(),
                agent_name: "A".to_string(),
                version: "1".to_string(),
                capabilities: vec![],
                contact_endpoint: "http://h/run".to_string(),
                metadata: Map::new(),
                registration_time: Utc::now(),
            })
            .await
            .unwrap();
        let routing_client = Arc::new(RoutingClient::new("http://127.0.0.1:9", 1).unwrap());
        let engine = WorkflowEngine::new(store.clone(), lifecycle, routing_client);
        (engine, store)
    }

    #[tokio::test]
    async fn trigger_reports_enqueued_task_count() {
        let (engine, _store) = engine_with_registered_agent("a1").await;
        let def = WorkflowDefinition {
            id: String::new(),
            name: "deploy".to_string(),
            version: "1".to_string(),
            tasks: vec![
                TaskDescriptor {
                    task_name: "build".to_string(),
                    parameters: Map::new(),
                    overrides: Map::new(),
                },
                TaskDescriptor {
                    task_name: "ship".to_string(),
                    parameters: Map::new(),
                    overrides: Map::new(),
                },
            ],
        };

        let outcome = engine.trigger("a1", None, Some(def), None).await.unwrap();
        assert_eq!(outcome.enqueued_task_count, 2);
        assert_eq!(engine.queue().total_len().await, 2);
    }

    #[tokio::test]
    async fn trigger_fails_for_unknown_agent() {
        let (engine, _store) = engine_with_registered_agent("a1").await;
        let def = WorkflowDefinition {
            id: String::new(),
            name: "deploy".to_string(),
            version: "1".to_string(),
            tasks: vec![TaskDescriptor {
                task_name: "build".to_string(),
                parameters: Map::new(),
                overrides: Map::new(),
            }],
        };

        let result = engine.trigger("ghost", None, Some(def), None).await;
        assert!(matches!(result, Err(OpsCoreError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn trigger_rejects_both_id_and_inline() {
        let (engine, _store) = engine_with_registered_agent("a1").await;
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

        let result = engine
            .trigger("a1", Some("w1".to_string()), Some(def), None)
            .await;
        assert!(matches!(result, Err(OpsCoreError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn create_workflow_autodetects_yaml() {
        let (engine, _store) = engine_with_registered_agent("a1").await;
        let yaml = "name: deploy\nversion: \"1\"\ntasks:\n  - task_name: build\n";
        let id = engine.create_workflow_from_text(yaml).await.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn create_workflow_rejects_empty_tasks() {
        let (engine, _store) = engine_with_registered_agent("a1").await;
        let json = r#"{"name": "deploy", "version": "1", "tasks": []}"#;
        let result = engine.create_workflow_from_text(json).await;
        assert!(matches!(result, Err(OpsCoreError::InvalidRequest(_))));
    }
}

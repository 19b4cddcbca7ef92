use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::config::RedisConfig;
use crate::models::{AgentRegistration, AgentState, SessionPatch, WorkflowDefinition, WorkflowSession};
use crate::{OpsCoreError, Result};

use super::StateStore;

/// Compare-and-set of the `latest` state record plus an unconditional
/// history append, as one atomic server-side script. `ConnectionManager`
/// multiplexes every caller's commands over a shared connection, so a
/// client-side `WATCH`/`MULTI`/`EXEC` can be interleaved with commands
/// from unrelated callers on the same connection; `EVAL` runs as a single
/// command with no such window.
const SAVE_LATEST_STATE_SCRIPT: &str = r"
local latest_key = KEYS[1]
local latest_ts_key = KEYS[2]
local history_key = KEYS[3]
local new_ts = tonumber(ARGV[1])
local payload = ARGV[2]

local current_ts = tonumber(redis.call('GET', latest_ts_key))
if current_ts == nil or new_ts >= current_ts then
    redis.call('SET', latest_key, payload)
    redis.call('SET', latest_ts_key, new_ts)
end
redis.call('LPUSH', history_key, payload)
return 1
";

/// Redis-backed store. Keys follow a fixed namespace:
/// `agent:{id}:registration`, `agent:{id}:state:latest`,
/// `agent:{id}:state:latest_ts` (integer nanos, compared by the CAS
/// script), `agent:{id}:state:history` (list, newest pushed to the
/// head), `session:{id}`, `workflow:{id}`.
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_url())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn registration_key(agent_id: &str) -> String {
        format!("agent:{agent_id}:registration")
    }

    fn latest_state_key(agent_id: &str) -> String {
        format!("agent:{agent_id}:state:latest")
    }

    fn latest_state_ts_key(agent_id: &str) -> String {
        format!("agent:{agent_id}:state:latest_ts")
    }

    fn history_key(agent_id: &str) -> String {
        format!("agent:{agent_id}:state:history")
    }

    fn session_key(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    fn definition_key(id: &str) -> String {
        format!("workflow:{id}")
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn save_agent_registration(&self, reg: AgentRegistration) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::registration_key(&reg.agent_id);
        let exists: bool = conn.exists(&key).await?;
        if exists {
            return Err(OpsCoreError::AgentAlreadyExists(reg.agent_id));
        }
        let payload = serde_json::to_string(&reg)?;
        let _: () = conn.set(&key, payload).await?;
        Ok(())
    }

    async fn read_agent_registration(&self, agent_id: &str) -> Result<Option<AgentRegistration>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::registration_key(agent_id)).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    async fn agent_exists(&self, agent_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(Self::registration_key(agent_id)).await?)
    }

    async fn save_agent_state(&self, state: AgentState) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&state)?;
        let new_ts = state.timestamp.timestamp_nanos_opt().ok_or_else(|| {
            OpsCoreError::StorageError(format!(
                "agent state timestamp out of range for agent {}",
                state.agent_id
            ))
        })?;

        let _: () = Script::new(SAVE_LATEST_STATE_SCRIPT)
            .key(Self::latest_state_key(&state.agent_id))
            .key(Self::latest_state_ts_key(&state.agent_id))
            .key(Self::history_key(&state.agent_id))
            .arg(new_ts)
            .arg(&payload)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn read_latest_agent_state(&self, agent_id: &str) -> Result<Option<AgentState>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::latest_state_key(agent_id)).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    async fn read_agent_state_history(
        &self,
        agent_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AgentState>> {
        let mut conn = self.conn.clone();
        let stop = match limit {
            Some(n) if n > 0 => (n - 1) as isize,
            Some(_) => return Ok(Vec::new()),
            None => -1,
        };
        let raw: Vec<String> = conn.lrange(Self::history_key(agent_id), 0, stop).await?;
        raw.into_iter()
            .map(|json| serde_json::from_str(&json).map_err(OpsCoreError::from))
            .collect()
    }

    async fn create_session(&self, session: WorkflowSession) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::session_key(&session.session_id);
        let exists: bool = conn.exists(&key).await?;
        if exists {
            return Err(OpsCoreError::InvalidRequest(format!(
                "session already exists: {}",
                session.session_id
            )));
        }
        let payload = serde_json::to_string(&session)?;
        let _: () = conn.set(&key, payload).await?;
        Ok(())
    }

    async fn read_session(&self, session_id: &str) -> Result<Option<WorkflowSession>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::session_key(session_id)).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    async fn update_session_data(&self, session_id: &str, patch: SessionPatch) -> Result<WorkflowSession> {
        let mut conn = self.conn.clone();
        let key = Self::session_key(session_id);
        let raw: Option<String> = conn.get(&key).await?;
        let mut session: WorkflowSession = match raw {
            Some(json) => serde_json::from_str(&json)?,
            None => return Err(OpsCoreError::SessionNotFound(session_id.to_string())),
        };

        if let Some(status) = patch.status {
            session.status = status;
        }
        if let Some(metadata) = patch.metadata {
            session.metadata.extend(metadata);
        }
        session.last_updated_time = chrono::Utc::now();

        let payload = serde_json::to_string(&session)?;
        let _: () = conn.set(&key, payload).await?;
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let deleted: u64 = conn.del(Self::session_key(session_id)).await?;
        if deleted == 0 {
            return Err(OpsCoreError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn save_workflow_definition(&self, def: WorkflowDefinition) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::definition_key(&def.id);
        let existing: Option<String> = conn.get(&key).await?;
        if let Some(raw) = existing {
            let existing: WorkflowDefinition = serde_json::from_str(&raw)?;
            if existing != def {
                return Err(OpsCoreError::WorkflowDefinitionConflict(def.id));
            }
            return Ok(());
        }
        let payload = serde_json::to_string(&def)?;
        let _: () = conn.set(&key, payload).await?;
        Ok(())
    }

    async fn read_workflow_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::definition_key(id)).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}

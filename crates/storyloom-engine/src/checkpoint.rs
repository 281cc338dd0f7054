//! Durable checkpointing of in-flight workflow state.
//!
//! After every phase transition the orchestrator persists the current
//! [`OrchestrationState`] under `orchestration:workflow:{workflow_id}` and
//! points `orchestration:session:{session_id}:latest` at that workflow, both
//! with a TTL. The session pointer is overwrite, last-writer-wins; concurrent
//! workflows for one session race on it by design.
//!
//! Reads of absent or expired keys return `None`. Store failures surface as
//! errors here and are downgraded to logged warnings by the orchestrator, so
//! persistence is best-effort and never blocks a workflow.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use storyloom_types::{OrchestrationState, OrchestratorError, Result};

/// Default TTL for both key families.
pub const DEFAULT_CHECKPOINT_TTL: Duration = Duration::from_secs(3600);

fn workflow_key(workflow_id: &Uuid) -> String {
    format!("orchestration:workflow:{workflow_id}")
}

fn session_key(session_id: &str) -> String {
    format!("orchestration:session:{session_id}:latest")
}

// ---------------------------------------------------------------------------
// CheckpointStore trait
// ---------------------------------------------------------------------------

/// Key/value persistence of workflow state, addressable by workflow id and by
/// the "latest workflow for a session" pointer.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Serialize and write the state under its workflow key, and point the
    /// session's `latest` key at this workflow. Both writes share one TTL.
    async fn save(&self, state: &OrchestrationState) -> Result<()>;

    /// Read-through lookup by workflow id. Absent or expired keys are `None`.
    async fn load(&self, workflow_id: &Uuid) -> Result<Option<OrchestrationState>>;

    /// The workflow id the session's `latest` pointer currently names.
    async fn latest_for_session(&self, session_id: &str) -> Result<Option<Uuid>>;

    /// Follow the session pointer to its state.
    async fn load_latest(&self, session_id: &str) -> Result<Option<OrchestrationState>> {
        match self.latest_for_session(session_id).await? {
            Some(id) => self.load(&id).await,
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory store with per-entry deadlines, evicted lazily on access. The
/// primary store for tests and single-process deployments.
pub struct MemoryCheckpointStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCheckpointStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn put(&self, key: String, value: String) {
        let entry = MemoryEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut guard = self.entries.write().await;
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_TTL)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, state: &OrchestrationState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.put(workflow_key(&state.workflow_id), json).await;
        self.put(
            session_key(&state.session_id),
            state.workflow_id.to_string(),
        )
        .await;
        tracing::debug!(workflow_id = %state.workflow_id, phase = %state.phase, "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, workflow_id: &Uuid) -> Result<Option<OrchestrationState>> {
        match self.get(&workflow_key(workflow_id)).await {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn latest_for_session(&self, session_id: &str) -> Result<Option<Uuid>> {
        match self.get(&session_key(session_id)).await {
            Some(raw) => Ok(Some(Uuid::parse_str(&raw).map_err(|e| {
                OrchestratorError::Persistence(format!("corrupt session pointer: {e}"))
            })?)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// FileCheckpointStore
// ---------------------------------------------------------------------------

/// One durable record: the value plus its own expiry timestamp.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    expires_at: DateTime<Utc>,
    value: serde_json::Value,
}

/// File-backed store writing one JSON record per key under a root directory.
pub struct FileCheckpointStore {
    root: PathBuf,
    ttl: Duration,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys contain ':' which is not portable in file names.
        self.root.join(format!("{}.json", key.replace(':', "__")))
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let record = StoredRecord {
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.ttl)
                    .map_err(|e| OrchestratorError::Persistence(e.to_string()))?,
            value,
        };
        let json = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(self.path_for(key), json).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        let record: StoredRecord = serde_json::from_str(&json)?;
        if record.expires_at <= Utc::now() {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(record.value))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &OrchestrationState) -> Result<()> {
        self.put(
            &workflow_key(&state.workflow_id),
            serde_json::to_value(state)?,
        )
        .await?;
        self.put(
            &session_key(&state.session_id),
            serde_json::Value::String(state.workflow_id.to_string()),
        )
        .await?;
        tracing::debug!(workflow_id = %state.workflow_id, phase = %state.phase, "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, workflow_id: &Uuid) -> Result<Option<OrchestrationState>> {
        match self.get(&workflow_key(workflow_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn latest_for_session(&self, session_id: &str) -> Result<Option<Uuid>> {
        match self.get(&session_key(session_id)).await? {
            Some(serde_json::Value::String(raw)) => {
                Ok(Some(Uuid::parse_str(&raw).map_err(|e| {
                    OrchestratorError::Persistence(format!("corrupt session pointer: {e}"))
                })?))
            }
            Some(_) => Err(OrchestratorError::Persistence(
                "session pointer is not a string".into(),
            )),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

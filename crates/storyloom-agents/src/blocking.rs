//! Bounded offload of blocking legacy collaborators.
//!
//! Legacy collaborator implementations are synchronous and may hang. They are
//! executed on tokio's blocking thread pool behind a semaphore so that a slow
//! downstream call can never stall the cooperative scheduler, and so the
//! number of in-flight blocking calls stays bounded.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use storyloom_types::{NarrativeContext, OrchestratorError, Result, WorldUpdates};

use crate::collaborator::{InputUnderstanding, NarrativeGeneration, WorldMutation};

/// Default cap on concurrently executing legacy calls.
pub const DEFAULT_BLOCKING_PERMITS: usize = 8;

/// Bounded worker-pool handle. Cloning shares the same permit budget.
#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
}

impl BlockingPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Run a synchronous operation off the async scheduler, waiting for a
    /// permit first.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OrchestratorError::Other("blocking pool closed".into()))?;
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| OrchestratorError::Other(format!("blocking task failed: {e}")))?
    }

    /// Permits currently free, mostly for tests.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKING_PERMITS)
    }
}

// ---------------------------------------------------------------------------
// Synchronous collaborator traits + offloading wrappers
// ---------------------------------------------------------------------------

/// Synchronous legacy variant of [`InputUnderstanding`].
pub trait SyncInputUnderstanding: Send + Sync + 'static {
    fn analyze(&self, text: &str) -> Result<Value>;
}

/// Synchronous legacy variant of [`WorldMutation`].
pub trait SyncWorldMutation: Send + Sync + 'static {
    fn apply(&self, world_id: &str, updates: &WorldUpdates) -> Result<Value>;
}

/// Synchronous legacy variant of [`NarrativeGeneration`].
pub trait SyncNarrativeGeneration: Send + Sync + 'static {
    fn generate(&self, prompt: &str, context: &NarrativeContext) -> Result<Value>;
}

/// Adapts a blocking input collaborator to the async seam.
pub struct OffloadedInput<T> {
    inner: Arc<T>,
    pool: BlockingPool,
}

impl<T: SyncInputUnderstanding> OffloadedInput<T> {
    pub fn new(inner: T, pool: BlockingPool) -> Self {
        Self {
            inner: Arc::new(inner),
            pool,
        }
    }
}

#[async_trait]
impl<T: SyncInputUnderstanding> InputUnderstanding for OffloadedInput<T> {
    async fn analyze(&self, text: &str) -> Result<Value> {
        let inner = self.inner.clone();
        let text = text.to_owned();
        self.pool.run(move || inner.analyze(&text)).await
    }
}

/// Adapts a blocking world collaborator to the async seam.
pub struct OffloadedWorld<T> {
    inner: Arc<T>,
    pool: BlockingPool,
}

impl<T: SyncWorldMutation> OffloadedWorld<T> {
    pub fn new(inner: T, pool: BlockingPool) -> Self {
        Self {
            inner: Arc::new(inner),
            pool,
        }
    }
}

#[async_trait]
impl<T: SyncWorldMutation> WorldMutation for OffloadedWorld<T> {
    async fn apply(&self, world_id: &str, updates: &WorldUpdates) -> Result<Value> {
        let inner = self.inner.clone();
        let world_id = world_id.to_owned();
        let updates = updates.clone();
        self.pool.run(move || inner.apply(&world_id, &updates)).await
    }
}

/// Adapts a blocking narrative collaborator to the async seam.
pub struct OffloadedNarrative<T> {
    inner: Arc<T>,
    pool: BlockingPool,
}

impl<T: SyncNarrativeGeneration> OffloadedNarrative<T> {
    pub fn new(inner: T, pool: BlockingPool) -> Self {
        Self {
            inner: Arc::new(inner),
            pool,
        }
    }
}

#[async_trait]
impl<T: SyncNarrativeGeneration> NarrativeGeneration for OffloadedNarrative<T> {
    async fn generate(&self, prompt: &str, context: &NarrativeContext) -> Result<Value> {
        let inner = self.inner.clone();
        let prompt = prompt.to_owned();
        let context = context.clone();
        self.pool
            .run(move || inner.generate(&prompt, &context))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

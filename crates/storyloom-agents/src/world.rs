//! World-mutation agent adapter.

use std::sync::Arc;

use serde_json::Value;

use storyloom_types::{Envelope, OrchestratorError, Result, WorldDelta, WorldUpdates};

use crate::collaborator::WorldMutation;
use crate::mock::mock_world_delta;
use crate::retry::{execute_with_retry, RetryConfig};

/// Wraps the world-mutation collaborator; same dispatch policy as the other
/// adapters.
pub struct WorldAgentAdapter {
    collaborator: Option<Arc<dyn WorldMutation>>,
    available: bool,
    retry: RetryConfig,
    fallback_to_mock: bool,
}

impl WorldAgentAdapter {
    pub fn new(
        collaborator: Option<Arc<dyn WorldMutation>>,
        retry: RetryConfig,
        fallback_to_mock: bool,
    ) -> Self {
        let available = collaborator.is_some();
        Self {
            collaborator,
            available,
            retry,
            fallback_to_mock,
        }
    }

    pub fn unavailable(retry: RetryConfig, fallback_to_mock: bool) -> Self {
        Self::new(None, retry, fallback_to_mock)
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Apply the detected intent and entities to the identified world.
    pub async fn apply(
        &self,
        world_id: &str,
        updates: &WorldUpdates,
    ) -> Result<Envelope<WorldDelta>> {
        let collaborator = match (&self.collaborator, self.available) {
            (Some(c), true) => c,
            _ => {
                if self.fallback_to_mock {
                    tracing::debug!(world_id, "World agent unavailable, using mock fallback");
                    return Ok(Envelope::mock(mock_world_delta(world_id, updates)));
                }
                return Err(OrchestratorError::AgentUnavailable {
                    agent: "world".into(),
                });
            }
        };

        match execute_with_retry(
            || collaborator.apply(world_id, updates),
            &self.retry,
            "world.apply",
        )
        .await
        {
            Ok(raw) => Ok(Envelope::real(normalize(&raw), raw)),
            Err(e) if self.fallback_to_mock => {
                tracing::warn!(world_id, error = %e, "World agent failed, degrading to mock fallback");
                Ok(Envelope::mock(mock_world_delta(world_id, updates)))
            }
            Err(e) => Err(OrchestratorError::AgentCommunication {
                agent: "world".into(),
                message: e.to_string(),
            }),
        }
    }
}

/// Normalize the collaborator result into a [`WorldDelta`]. A missing
/// `world_state` key means the collaborator returned the state directly.
fn normalize(raw: &Value) -> WorldDelta {
    let world_state = raw.get("world_state").cloned().unwrap_or_else(|| raw.clone());
    WorldDelta {
        updated: raw.get("updated").and_then(Value::as_bool).unwrap_or(true),
        description: raw
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        world_state,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

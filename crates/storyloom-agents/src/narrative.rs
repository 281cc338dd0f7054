//! Narrative-generation agent adapter.

use std::sync::Arc;

use serde_json::Value;

use storyloom_types::{Envelope, NarrativeContext, NarrativePiece, OrchestratorError, Result};

use crate::collaborator::NarrativeGeneration;
use crate::mock::mock_story;
use crate::retry::{execute_with_retry, RetryConfig};

/// Wraps the narrative-generation collaborator; same dispatch policy as the
/// other adapters.
pub struct NarrativeAgentAdapter {
    collaborator: Option<Arc<dyn NarrativeGeneration>>,
    available: bool,
    retry: RetryConfig,
    fallback_to_mock: bool,
}

impl NarrativeAgentAdapter {
    pub fn new(
        collaborator: Option<Arc<dyn NarrativeGeneration>>,
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

    /// Generate the next story beat from the prompt and aggregated context.
    pub async fn generate(
        &self,
        prompt: &str,
        context: &NarrativeContext,
    ) -> Result<Envelope<NarrativePiece>> {
        let collaborator = match (&self.collaborator, self.available) {
            (Some(c), true) => c,
            _ => {
                if self.fallback_to_mock {
                    tracing::debug!("Narrative agent unavailable, using mock fallback");
                    return Ok(Envelope::mock(mock_story(context)));
                }
                return Err(OrchestratorError::AgentUnavailable {
                    agent: "narrative".into(),
                });
            }
        };

        match execute_with_retry(
            || collaborator.generate(prompt, context),
            &self.retry,
            "narrative.generate",
        )
        .await
        {
            Ok(raw) => Ok(Envelope::real(normalize(&raw, context), raw)),
            Err(e) if self.fallback_to_mock => {
                tracing::warn!(error = %e, "Narrative agent failed, degrading to mock fallback");
                Ok(Envelope::mock(mock_story(context)))
            }
            Err(e) => Err(OrchestratorError::AgentCommunication {
                agent: "narrative".into(),
                message: e.to_string(),
            }),
        }
    }
}

/// Pull the story text out of whichever field the collaborator used. An
/// empty result degrades to the deterministic mock story so the caller never
/// receives a blank narrative.
fn normalize(raw: &Value, context: &NarrativeContext) -> NarrativePiece {
    let story = raw
        .get("story")
        .and_then(Value::as_str)
        .or_else(|| raw.get("text").and_then(Value::as_str))
        .or_else(|| raw.as_str())
        .unwrap_or_default();
    if story.is_empty() {
        mock_story(context)
    } else {
        NarrativePiece {
            story: story.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

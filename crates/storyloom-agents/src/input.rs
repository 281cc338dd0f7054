//! Input-understanding agent adapter.

use std::sync::Arc;

use serde_json::Value;

use storyloom_types::{Envelope, InputAnalysis, OrchestratorError, Result};

use crate::collaborator::InputUnderstanding;
use crate::mock::mock_input_analysis;
use crate::retry::{execute_with_retry, RetryConfig};

/// Wraps the input-understanding collaborator: availability check at
/// construction, retry on dispatch, deterministic mock degradation.
pub struct InputAgentAdapter {
    collaborator: Option<Arc<dyn InputUnderstanding>>,
    available: bool,
    retry: RetryConfig,
    fallback_to_mock: bool,
}

impl InputAgentAdapter {
    /// Availability is decided once, here, from the injected handle; it is
    /// never inferred from ambient state afterwards.
    pub fn new(
        collaborator: Option<Arc<dyn InputUnderstanding>>,
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

    /// Adapter with no collaborator wired up; useful when running fully
    /// degraded.
    pub fn unavailable(retry: RetryConfig, fallback_to_mock: bool) -> Self {
        Self::new(None, retry, fallback_to_mock)
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Analyze raw user text into a normalized [`InputAnalysis`] envelope.
    pub async fn analyze(&self, text: &str) -> Result<Envelope<InputAnalysis>> {
        let collaborator = match (&self.collaborator, self.available) {
            (Some(c), true) => c,
            _ => {
                if self.fallback_to_mock {
                    tracing::debug!("Input agent unavailable, using mock fallback");
                    return Ok(Envelope::mock(mock_input_analysis(text)));
                }
                return Err(OrchestratorError::AgentUnavailable {
                    agent: "input".into(),
                });
            }
        };

        match execute_with_retry(|| collaborator.analyze(text), &self.retry, "input.analyze").await
        {
            Ok(raw) => Ok(Envelope::real(normalize(&raw, text), raw)),
            Err(e) if self.fallback_to_mock => {
                tracing::warn!(error = %e, "Input agent failed, degrading to mock fallback");
                Ok(Envelope::mock(mock_input_analysis(text)))
            }
            Err(e) => Err(OrchestratorError::AgentCommunication {
                agent: "input".into(),
                message: e.to_string(),
            }),
        }
    }
}

/// Normalize whatever routing schema the collaborator returned into the
/// common `intent` / `confidence` / `entities` shape the next phase expects.
fn normalize(raw: &Value, text: &str) -> InputAnalysis {
    let routing = raw.get("routing").unwrap_or(raw);
    let fallback = mock_input_analysis(text);

    let intent = routing
        .get("intent")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(fallback.intent);
    let confidence = routing
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(fallback.confidence);
    let entities = routing
        .get("entities")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or(fallback.entities);

    InputAnalysis {
        intent,
        confidence,
        entities,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storyloom_types::PayloadSource;

    struct RoutingCollaborator;

    #[async_trait]
    impl InputUnderstanding for RoutingCollaborator {
        async fn analyze(&self, _text: &str) -> Result<Value> {
            Ok(serde_json::json!({
                "routing": {
                    "intent": "dialogue",
                    "confidence": 0.93,
                    "entities": ["Mara"],
                },
                "model": "ipa-v2",
            }))
        }
    }

    struct FailingCollaborator {
        call_count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InputUnderstanding for FailingCollaborator {
        async fn analyze(&self, _text: &str) -> Result<Value> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Err(OrchestratorError::Other("agent offline".into()))
        }
    }

    #[tokio::test]
    async fn unavailable_with_fallback_returns_mock() {
        let adapter = InputAgentAdapter::unavailable(RetryConfig::immediate(2), true);
        assert!(!adapter.is_available());

        let env = adapter.analyze("I feel anxious").await.unwrap();
        assert_eq!(env.source, PayloadSource::MockFallback);
        assert_eq!(env.payload.intent, "emotional_expression");
        assert!(env.raw.is_none());
    }

    #[tokio::test]
    async fn unavailable_without_fallback_errors() {
        let adapter = InputAgentAdapter::unavailable(RetryConfig::immediate(2), false);
        let err = adapter.analyze("hello").await.unwrap_err();
        assert_eq!(err.to_string(), "input implementation not available");
    }

    #[tokio::test]
    async fn real_result_is_normalized_from_routing_schema() {
        let adapter = InputAgentAdapter::new(
            Some(Arc::new(RoutingCollaborator)),
            RetryConfig::immediate(1),
            true,
        );
        let env = adapter.analyze("ask Mara about the storm").await.unwrap();
        assert_eq!(env.source, PayloadSource::Real);
        assert_eq!(env.payload.intent, "dialogue");
        assert_eq!(env.payload.confidence, 0.93);
        assert_eq!(env.payload.entities, vec!["Mara"]);
        // Raw collaborator result travels alongside.
        assert_eq!(env.raw.as_ref().unwrap()["model"], "ipa-v2");
    }

    #[tokio::test]
    async fn exhaustion_with_fallback_degrades_to_mock() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let adapter = InputAgentAdapter::new(
            Some(Arc::new(FailingCollaborator {
                call_count: call_count.clone(),
            })),
            RetryConfig::immediate(2),
            true,
        );

        let env = adapter.analyze("go north").await.unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert!(env.is_mock());
        assert_eq!(env.payload.intent, "movement");
    }

    #[tokio::test]
    async fn exhaustion_without_fallback_surfaces_communication_error() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let adapter = InputAgentAdapter::new(
            Some(Arc::new(FailingCollaborator {
                call_count: call_count.clone(),
            })),
            RetryConfig::immediate(1),
            false,
        );

        let err = adapter.analyze("go north").await.unwrap_err();
        match err {
            OrchestratorError::AgentCommunication { agent, message } => {
                assert_eq!(agent, "input");
                assert!(message.contains("Retries exhausted"));
            }
            other => panic!("expected AgentCommunication, got: {other:?}"),
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn normalize_flat_schema_without_routing_key() {
        let raw = serde_json::json!({ "intent": "observation", "confidence": 0.8 });
        let analysis = normalize(&raw, "look around");
        assert_eq!(analysis.intent, "observation");
        assert_eq!(analysis.confidence, 0.8);
        // Entities missing from the schema fall back to the deterministic
        // extraction from the input text.
        assert!(analysis.entities.is_empty());
    }
}

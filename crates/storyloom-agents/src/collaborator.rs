//! Downstream collaborator seams.
//!
//! The orchestrator and adapters only ever see these asynchronous traits.
//! Bridging to synchronous legacy implementations happens in
//! [`crate::blocking`], never by blocking the caller's scheduler.

use async_trait::async_trait;
use serde_json::Value;

use storyloom_types::{NarrativeContext, Result, SafetyCheck, WorldUpdates};

/// Classifies user text before the pipeline is allowed to continue.
#[async_trait]
pub trait SafetyValidation: Send + Sync {
    async fn validate_text(&self, text: &str) -> Result<SafetyCheck>;
}

/// Input-understanding collaborator. The returned schema is owned by the
/// collaborator; the input adapter normalizes it.
#[async_trait]
pub trait InputUnderstanding: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Value>;
}

/// World-mutation collaborator.
#[async_trait]
pub trait WorldMutation: Send + Sync {
    async fn apply(&self, world_id: &str, updates: &WorldUpdates) -> Result<Value>;
}

/// Narrative-generation collaborator.
#[async_trait]
pub trait NarrativeGeneration: Send + Sync {
    async fn generate(&self, prompt: &str, context: &NarrativeContext) -> Result<Value>;
}

/// A safety collaborator that classifies everything as safe. Useful as a
/// stand-in when no real validator is wired up.
pub struct PermissiveSafety;

#[async_trait]
impl SafetyValidation for PermissiveSafety {
    async fn validate_text(&self, _text: &str) -> Result<SafetyCheck> {
        Ok(SafetyCheck::safe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_types::SafetyLevel;

    #[tokio::test]
    async fn permissive_safety_always_safe() {
        let safety = PermissiveSafety;
        let check = safety.validate_text("anything at all").await.unwrap();
        assert_eq!(check.level, SafetyLevel::Safe);
        assert!(check.reasons.is_empty());
    }
}

//! The normalized envelope every agent adapter returns, plus the typed
//! payloads flowing between pipeline phases.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::SafetyLevel;

// ---------------------------------------------------------------------------
// PayloadSource / Envelope
// ---------------------------------------------------------------------------

/// Where an adapter result actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    /// The downstream collaborator answered.
    Real,
    /// The collaborator was unavailable or exhausted its retries and the
    /// adapter degraded to a deterministic placeholder.
    MockFallback,
}

impl PayloadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadSource::Real => "real",
            PayloadSource::MockFallback => "mock_fallback",
        }
    }
}

/// The shape every adapter returns regardless of downstream collaborator.
///
/// `source == MockFallback` if and only if the real collaborator was
/// unavailable or all retry attempts failed and fallback was permitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub payload: T,
    pub source: PayloadSource,
    /// The collaborator's untranslated result, kept for diagnostics. Absent
    /// for mock fallbacks, which are built purely from the input.
    pub raw: Option<Value>,
}

impl<T> Envelope<T> {
    pub fn real(payload: T, raw: Value) -> Self {
        Self {
            payload,
            source: PayloadSource::Real,
            raw: Some(raw),
        }
    }

    pub fn mock(payload: T) -> Self {
        Self {
            payload,
            source: PayloadSource::MockFallback,
            raw: None,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.source == PayloadSource::MockFallback
    }
}

// ---------------------------------------------------------------------------
// Typed adapter payloads
// ---------------------------------------------------------------------------

/// Normalized output of the input-understanding phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAnalysis {
    pub intent: String,
    pub confidence: f64,
    pub entities: Vec<String>,
}

/// Updates handed to the world-mutation collaborator: the detected intent
/// and entities plus the identifiers of who asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldUpdates {
    pub intent: String,
    pub entities: Vec<String>,
    pub player_id: String,
    pub session_id: String,
    pub user_input: String,
}

/// Normalized output of the world-building phase. `world_state` may be
/// partial; `updated` records whether the collaborator applied anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDelta {
    pub world_state: Value,
    pub updated: bool,
    pub description: Option<String>,
}

/// Everything the narrative collaborator needs to continue the story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeContext {
    pub world_state: Value,
    pub intent: String,
    pub entities: Vec<String>,
    pub world_updates: Value,
    pub therapeutic_context: Value,
    pub safety_level: SafetyLevel,
}

/// Normalized output of the narrative-generation phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativePiece {
    pub story: String,
}

/// Result of the safety collaborator's text validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub level: SafetyLevel,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl SafetyCheck {
    pub fn safe() -> Self {
        Self {
            level: SafetyLevel::Safe,
            reasons: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_source_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&PayloadSource::Real).unwrap(),
            "\"real\""
        );
        assert_eq!(
            serde_json::to_string(&PayloadSource::MockFallback).unwrap(),
            "\"mock_fallback\""
        );
    }

    #[test]
    fn real_envelope_keeps_raw_result() {
        let raw = serde_json::json!({"routing": {"intent": "movement"}});
        let env = Envelope::real(
            InputAnalysis {
                intent: "movement".into(),
                confidence: 0.9,
                entities: vec![],
            },
            raw.clone(),
        );
        assert_eq!(env.source, PayloadSource::Real);
        assert_eq!(env.raw, Some(raw));
        assert!(!env.is_mock());
    }

    #[test]
    fn mock_envelope_has_no_raw_result() {
        let env = Envelope::mock(NarrativePiece {
            story: "a quiet clearing".into(),
        });
        assert!(env.is_mock());
        assert!(env.raw.is_none());
    }

    #[test]
    fn envelope_serde_round_trip() {
        let env = Envelope::real(
            WorldDelta {
                world_state: serde_json::json!({"world_id": "w-1"}),
                updated: true,
                description: Some("a door opens".into()),
            },
            serde_json::json!({"world_state": {"world_id": "w-1"}}),
        );
        let json = serde_json::to_string(&env).unwrap();
        let restored: Envelope<WorldDelta> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, env);
    }

    #[test]
    fn safety_check_reasons_default_to_empty() {
        let check: SafetyCheck = serde_json::from_str("{\"level\": \"warning\"}").unwrap();
        assert_eq!(check.level, SafetyLevel::Warning);
        assert!(check.reasons.is_empty());
    }
}

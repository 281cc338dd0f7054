//! Workflow state machine: phases, the persisted `OrchestrationState`, and the
//! orchestrator's request/response contract.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{OrchestratorError, Result};

// ---------------------------------------------------------------------------
// SafetyLevel
// ---------------------------------------------------------------------------

/// Classification returned by the safety collaborator for a piece of user text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    Warning,
    Blocked,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Warning => "warning",
            SafetyLevel::Blocked => "blocked",
        }
    }

    /// `Warning` and `Blocked` both stop the main pipeline before any world
    /// mutation or narrative generation happens.
    pub fn requires_intervention(&self) -> bool {
        matches!(self, SafetyLevel::Warning | SafetyLevel::Blocked)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WorkflowPhase
// ---------------------------------------------------------------------------

/// Named stage of the workflow state machine.
///
/// Within one workflow the observed phases form a non-decreasing sequence
/// along `InputProcessing → WorldBuilding → NarrativeGeneration → Complete`.
/// `SafetyIntervention` is a terminal branch out of `WorldBuilding`, taken
/// when the safety check stops the pipeline; `Error` is reachable from any
/// non-terminal phase. Terminal phases accept no further writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    InputProcessing,
    WorldBuilding,
    NarrativeGeneration,
    SafetyIntervention,
    Complete,
    Error,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::InputProcessing => "input_processing",
            WorkflowPhase::WorldBuilding => "world_building",
            WorkflowPhase::NarrativeGeneration => "narrative_generation",
            WorkflowPhase::SafetyIntervention => "safety_intervention",
            WorkflowPhase::Complete => "complete",
            WorkflowPhase::Error => "error",
        }
    }

    /// Terminal phases never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowPhase::SafetyIntervention | WorkflowPhase::Complete | WorkflowPhase::Error
        )
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(&self, to: WorkflowPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == WorkflowPhase::Error {
            return true;
        }
        matches!(
            (self, to),
            (WorkflowPhase::InputProcessing, WorkflowPhase::WorldBuilding)
                | (WorkflowPhase::WorldBuilding, WorkflowPhase::NarrativeGeneration)
                | (WorkflowPhase::WorldBuilding, WorkflowPhase::SafetyIntervention)
                | (WorkflowPhase::NarrativeGeneration, WorkflowPhase::Complete)
        )
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OrchestrationState
// ---------------------------------------------------------------------------

/// One workflow instance: the durable record of a single user input moving
/// through the three-stage pipeline.
///
/// The orchestrator exclusively owns an instance for the duration of one
/// `process_user_input` call; the checkpoint store owns the serialized copy
/// after each persist. Instances are never deleted by the orchestrator, only
/// expired by the store's TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub workflow_id: Uuid,
    pub session_id: String,
    pub player_id: String,
    pub phase: WorkflowPhase,
    pub user_input: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ipa_result: Option<Value>,
    pub wba_result: Option<Value>,
    pub nga_result: Option<Value>,
    pub world_context: Map<String, Value>,
    pub therapeutic_context: Map<String, Value>,
    pub safety_level: Option<SafetyLevel>,
    pub error: Option<String>,
}

impl OrchestrationState {
    /// Allocate a fresh workflow at `InputProcessing` with a generated id.
    pub fn new(
        user_input: impl Into<String>,
        session_id: impl Into<String>,
        player_id: impl Into<String>,
        world_context: Option<Map<String, Value>>,
        therapeutic_context: Option<Map<String, Value>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: Uuid::new_v4(),
            session_id: session_id.into(),
            player_id: player_id.into(),
            phase: WorkflowPhase::InputProcessing,
            user_input: user_input.into(),
            created_at: now,
            updated_at: now,
            ipa_result: None,
            wba_result: None,
            nga_result: None,
            world_context: world_context.unwrap_or_default(),
            therapeutic_context: therapeutic_context.unwrap_or_default(),
            safety_level: None,
            error: None,
        }
    }

    /// Bump `updated_at`, keeping it monotonically non-decreasing even if the
    /// wall clock steps backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = self.updated_at.max(now);
    }

    /// Advance the phase, enforcing the state machine invariant.
    pub fn advance(&mut self, to: WorkflowPhase) -> Result<()> {
        if !self.phase.can_transition_to(to) {
            return Err(OrchestratorError::PhaseTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        self.touch();
        Ok(())
    }

    /// Transition to the absorbing `Error` phase with a diagnostic message.
    /// A workflow that is already terminal is left untouched.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = WorkflowPhase::Error;
        self.error = Some(message.into());
        self.touch();
    }

    /// Record the safety classification. Set exactly once, after phase 1;
    /// later calls are ignored.
    pub fn set_safety_level(&mut self, level: SafetyLevel) {
        if self.safety_level.is_none() {
            self.safety_level = Some(level);
            self.touch();
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// WorkflowRequest / WorkflowResponse
// ---------------------------------------------------------------------------

/// Caller-supplied input to `process_user_input`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub user_input: String,
    pub session_id: String,
    pub player_id: String,
    #[serde(default)]
    pub world_context: Option<Map<String, Value>>,
    #[serde(default)]
    pub therapeutic_context: Option<Map<String, Value>>,
}

impl WorkflowRequest {
    pub fn new(
        user_input: impl Into<String>,
        session_id: impl Into<String>,
        player_id: impl Into<String>,
    ) -> Self {
        Self {
            user_input: user_input.into(),
            session_id: session_id.into(),
            player_id: player_id.into(),
            world_context: None,
            therapeutic_context: None,
        }
    }

    pub fn with_world_context(mut self, world_context: Map<String, Value>) -> Self {
        self.world_context = Some(world_context);
        self
    }

    pub fn with_therapeutic_context(mut self, therapeutic_context: Map<String, Value>) -> Self {
        self.therapeutic_context = Some(therapeutic_context);
        self
    }
}

/// The orchestrator's only output shape. `success = false` still arrives as a
/// structured response with a non-alarming narrative; the orchestrator never
/// raises to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub workflow_id: Uuid,
    pub success: bool,
    pub narrative: String,
    pub intent: Option<String>,
    pub world_updates: Option<Value>,
    pub safety_level: Option<SafetyLevel>,
    pub error: Option<String>,
    pub state: OrchestrationState,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> OrchestrationState {
        OrchestrationState::new("hello", "s1", "p1", None, None)
    }

    #[test]
    fn safety_level_serializes_to_snake_case() {
        assert_eq!(serde_json::to_string(&SafetyLevel::Safe).unwrap(), "\"safe\"");
        assert_eq!(
            serde_json::to_string(&SafetyLevel::Warning).unwrap(),
            "\"warning\""
        );
        assert_eq!(
            serde_json::to_string(&SafetyLevel::Blocked).unwrap(),
            "\"blocked\""
        );
    }

    #[test]
    fn safety_intervention_levels() {
        assert!(!SafetyLevel::Safe.requires_intervention());
        assert!(SafetyLevel::Warning.requires_intervention());
        assert!(SafetyLevel::Blocked.requires_intervention());
    }

    #[test]
    fn phase_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&WorkflowPhase::InputProcessing).unwrap(),
            "\"input_processing\""
        );
        assert_eq!(
            serde_json::to_string(&WorkflowPhase::SafetyIntervention).unwrap(),
            "\"safety_intervention\""
        );
        let phase: WorkflowPhase = serde_json::from_str("\"narrative_generation\"").unwrap();
        assert_eq!(phase, WorkflowPhase::NarrativeGeneration);
    }

    #[test]
    fn forward_transitions_are_legal() {
        assert!(WorkflowPhase::InputProcessing.can_transition_to(WorkflowPhase::WorldBuilding));
        assert!(WorkflowPhase::WorldBuilding.can_transition_to(WorkflowPhase::NarrativeGeneration));
        assert!(WorkflowPhase::WorldBuilding.can_transition_to(WorkflowPhase::SafetyIntervention));
        assert!(WorkflowPhase::NarrativeGeneration.can_transition_to(WorkflowPhase::Complete));
    }

    #[test]
    fn error_reachable_from_any_non_terminal_phase() {
        for phase in [
            WorkflowPhase::InputProcessing,
            WorkflowPhase::WorldBuilding,
            WorkflowPhase::NarrativeGeneration,
        ] {
            assert!(phase.can_transition_to(WorkflowPhase::Error));
        }
    }

    #[test]
    fn terminal_phases_have_no_outgoing_transitions() {
        for terminal in [
            WorkflowPhase::SafetyIntervention,
            WorkflowPhase::Complete,
            WorkflowPhase::Error,
        ] {
            for to in [
                WorkflowPhase::InputProcessing,
                WorkflowPhase::WorldBuilding,
                WorkflowPhase::NarrativeGeneration,
                WorkflowPhase::Complete,
                WorkflowPhase::Error,
            ] {
                assert!(!terminal.can_transition_to(to), "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn backward_and_skipping_transitions_are_illegal() {
        assert!(!WorkflowPhase::WorldBuilding.can_transition_to(WorkflowPhase::InputProcessing));
        assert!(!WorkflowPhase::InputProcessing.can_transition_to(WorkflowPhase::Complete));
        assert!(
            !WorkflowPhase::InputProcessing.can_transition_to(WorkflowPhase::NarrativeGeneration)
        );
    }

    #[test]
    fn new_state_starts_at_input_processing() {
        let state = fresh_state();
        assert_eq!(state.phase, WorkflowPhase::InputProcessing);
        assert_eq!(state.user_input, "hello");
        assert_eq!(state.session_id, "s1");
        assert_eq!(state.player_id, "p1");
        assert!(state.safety_level.is_none());
        assert!(state.error.is_none());
        assert_eq!(state.created_at, state.updated_at);
    }

    #[test]
    fn advance_rejects_illegal_transition() {
        let mut state = fresh_state();
        let err = state.advance(WorkflowPhase::Complete).unwrap_err();
        assert!(matches!(err, OrchestratorError::PhaseTransition { .. }));
        // Phase untouched after the rejected transition.
        assert_eq!(state.phase, WorkflowPhase::InputProcessing);
    }

    #[test]
    fn advance_bumps_updated_at() {
        let mut state = fresh_state();
        let before = state.updated_at;
        state.advance(WorkflowPhase::WorldBuilding).unwrap();
        assert!(state.updated_at >= before);
        assert_eq!(state.phase, WorkflowPhase::WorldBuilding);
    }

    #[test]
    fn fail_is_absorbing_and_idempotent_on_terminal() {
        let mut state = fresh_state();
        state.fail("downstream exploded");
        assert_eq!(state.phase, WorkflowPhase::Error);
        assert_eq!(state.error.as_deref(), Some("downstream exploded"));

        // A terminal workflow ignores further failure writes.
        state.fail("second failure");
        assert_eq!(state.error.as_deref(), Some("downstream exploded"));
    }

    #[test]
    fn complete_state_ignores_fail() {
        let mut state = fresh_state();
        state.advance(WorkflowPhase::WorldBuilding).unwrap();
        state.advance(WorkflowPhase::NarrativeGeneration).unwrap();
        state.advance(WorkflowPhase::Complete).unwrap();

        state.fail("too late");
        assert_eq!(state.phase, WorkflowPhase::Complete);
        assert!(state.error.is_none());
    }

    #[test]
    fn safety_level_is_set_once() {
        let mut state = fresh_state();
        state.set_safety_level(SafetyLevel::Warning);
        state.set_safety_level(SafetyLevel::Safe);
        assert_eq!(state.safety_level, Some(SafetyLevel::Warning));
    }

    #[test]
    fn serde_round_trip_preserves_every_field() {
        let mut state = OrchestrationState::new("I feel anxious", "s1", "p1", None, None);
        state.set_safety_level(SafetyLevel::Safe);
        state.ipa_result = Some(serde_json::json!({"intent": "emotional_expression"}));
        state
            .world_context
            .insert("world_id".into(), serde_json::json!("w-42"));
        state.advance(WorkflowPhase::WorldBuilding).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        let restored: OrchestrationState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn request_builders_attach_contexts() {
        let mut world = Map::new();
        world.insert("world_id".into(), serde_json::json!("w-1"));
        let request = WorkflowRequest::new("look around", "s9", "p9")
            .with_world_context(world.clone());
        assert_eq!(request.world_context, Some(world));
        assert!(request.therapeutic_context.is_none());
    }
}

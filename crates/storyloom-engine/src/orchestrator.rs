//! The workflow orchestrator: drives the three-phase pipeline, applies the
//! safety short-circuit, and checkpoints after every phase transition.
//!
//! `process_user_input` never returns an error and never panics: adapter
//! failures are retried and degraded inside the adapters, persistence
//! failures are logged and ignored, and anything else becomes a terminal
//! `Error` state wrapped in a structured response.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use storyloom_agents::{
    InputAgentAdapter, InputUnderstanding, NarrativeAgentAdapter, NarrativeGeneration,
    RetryConfig, SafetyValidation, WorldAgentAdapter, WorldMutation,
};
use storyloom_types::{
    NarrativeContext, OrchestrationState, Result, SafetyLevel, WorkflowPhase, WorkflowRequest,
    WorkflowResponse, WorldDelta, WorldUpdates,
};

use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore, DEFAULT_CHECKPOINT_TTL};
use crate::events::{EventEmitter, WorkflowEvent};

/// Returned to the caller when the pipeline fails irrecoverably. Deliberately
/// generic and non-alarming; diagnostics travel in the `error` field.
const FALLBACK_NARRATIVE: &str = "The story stumbles for a moment, as if the narrator lost the \
     thread. Take a breath, and try again in a little while.";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Knobs shared by the adapters and the checkpoint store.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub checkpoint_ttl: std::time::Duration,
    pub retry: RetryConfig,
    pub fallback_to_mock: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            checkpoint_ttl: DEFAULT_CHECKPOINT_TTL,
            retry: RetryConfig::default(),
            fallback_to_mock: true,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowOrchestrator
// ---------------------------------------------------------------------------

/// Coordinates one workflow per `process_user_input` call. All dependencies
/// are injected at construction; there are no module-level singletons.
pub struct WorkflowOrchestrator {
    safety: Arc<dyn SafetyValidation>,
    input: InputAgentAdapter,
    world: WorldAgentAdapter,
    narrative: NarrativeAgentAdapter,
    store: Arc<dyn CheckpointStore>,
    events: EventEmitter,
}

/// What a completed pipeline hands back up to `process_user_input`.
struct PipelineOutcome {
    narrative: String,
    intent: Option<String>,
    world_updates: Option<Value>,
}

impl WorkflowOrchestrator {
    pub fn new(
        safety: Arc<dyn SafetyValidation>,
        input: InputAgentAdapter,
        world: WorldAgentAdapter,
        narrative: NarrativeAgentAdapter,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            safety,
            input,
            world,
            narrative,
            store,
            events: EventEmitter::default(),
        }
    }

    /// Build the three adapters from optional collaborator handles using one
    /// shared config. `store = None` falls back to an in-memory store with
    /// the configured TTL.
    pub fn with_collaborators(
        config: &OrchestratorConfig,
        safety: Arc<dyn SafetyValidation>,
        input: Option<Arc<dyn InputUnderstanding>>,
        world: Option<Arc<dyn WorldMutation>>,
        narrative: Option<Arc<dyn NarrativeGeneration>>,
        store: Option<Arc<dyn CheckpointStore>>,
    ) -> Self {
        let store = store
            .unwrap_or_else(|| Arc::new(MemoryCheckpointStore::new(config.checkpoint_ttl)));
        Self::new(
            safety,
            InputAgentAdapter::new(input, config.retry.clone(), config.fallback_to_mock),
            WorldAgentAdapter::new(world, config.retry.clone(), config.fallback_to_mock),
            NarrativeAgentAdapter::new(narrative, config.retry.clone(), config.fallback_to_mock),
            store,
        )
    }

    /// The orchestrator's event stream; subscribe before calling
    /// `process_user_input` to observe progress.
    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Run one full workflow for a single user input.
    ///
    /// Always returns a structured response: `success = false` carries a
    /// generic narrative and the diagnostic in `error`.
    pub async fn process_user_input(&self, request: WorkflowRequest) -> WorkflowResponse {
        let started = Instant::now();
        let mut state = OrchestrationState::new(
            request.user_input,
            request.session_id,
            request.player_id,
            request.world_context,
            request.therapeutic_context,
        );
        tracing::info!(workflow_id = %state.workflow_id, session_id = %state.session_id, "Workflow started");
        self.events.emit(WorkflowEvent::WorkflowStarted {
            workflow_id: state.workflow_id,
            session_id: state.session_id.clone(),
        });
        self.persist(&state).await;

        match self.run_pipeline(&mut state).await {
            Ok(outcome) => {
                self.events.emit(WorkflowEvent::WorkflowCompleted {
                    workflow_id: state.workflow_id,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                WorkflowResponse {
                    workflow_id: state.workflow_id,
                    success: true,
                    narrative: outcome.narrative,
                    intent: outcome.intent,
                    world_updates: outcome.world_updates,
                    safety_level: state.safety_level,
                    error: None,
                    state,
                }
            }
            Err(e) => {
                tracing::error!(workflow_id = %state.workflow_id, error = %e, "Workflow failed");
                state.fail(e.to_string());
                self.persist(&state).await;
                self.events.emit(WorkflowEvent::WorkflowFailed {
                    workflow_id: state.workflow_id,
                    error: e.to_string(),
                });
                WorkflowResponse {
                    workflow_id: state.workflow_id,
                    success: false,
                    narrative: FALLBACK_NARRATIVE.to_string(),
                    intent: None,
                    world_updates: None,
                    safety_level: state.safety_level,
                    error: state.error.clone(),
                    state,
                }
            }
        }
    }

    async fn run_pipeline(&self, state: &mut OrchestrationState) -> Result<PipelineOutcome> {
        // Phase 1: input processing
        self.events.emit(WorkflowEvent::PhaseStarted {
            workflow_id: state.workflow_id,
            phase: WorkflowPhase::InputProcessing,
        });
        let check = self.safety.validate_text(&state.user_input).await?;
        state.set_safety_level(check.level);

        let input_env = self.input.analyze(&state.user_input).await?;
        if input_env.is_mock() {
            self.emit_fallback(state, "input");
        }
        let analysis = input_env.payload.clone();
        state.ipa_result = Some(serde_json::to_value(&input_env)?);
        state.advance(WorkflowPhase::WorldBuilding)?;
        self.persist(state).await;
        self.events.emit(WorkflowEvent::PhaseCompleted {
            workflow_id: state.workflow_id,
            phase: WorkflowPhase::InputProcessing,
        });

        // Safety short-circuit: the world and narrative agents are never
        // invoked once the validator asks for an intervention.
        if check.level.requires_intervention() {
            tracing::info!(workflow_id = %state.workflow_id, level = %check.level, "Safety intervention");
            state.advance(WorkflowPhase::SafetyIntervention)?;
            self.persist(state).await;
            self.events.emit(WorkflowEvent::SafetyIntervened {
                workflow_id: state.workflow_id,
                level: check.level,
            });
            return Ok(PipelineOutcome {
                narrative: supportive_narrative(check.level).to_string(),
                intent: Some(analysis.intent),
                world_updates: None,
            });
        }

        // Phase 2: world building
        self.events.emit(WorkflowEvent::PhaseStarted {
            workflow_id: state.workflow_id,
            phase: WorkflowPhase::WorldBuilding,
        });
        let world_id = state
            .world_context
            .get("world_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| state.session_id.clone());
        let updates = WorldUpdates {
            intent: analysis.intent.clone(),
            entities: analysis.entities.clone(),
            player_id: state.player_id.clone(),
            session_id: state.session_id.clone(),
            user_input: state.user_input.clone(),
        };
        let world_env = self.world.apply(&world_id, &updates).await?;
        if world_env.is_mock() {
            self.emit_fallback(state, "world");
        }
        let delta = world_env.payload.clone();
        if let Value::Object(map) = &delta.world_state {
            for (key, value) in map {
                state.world_context.insert(key.clone(), value.clone());
            }
        }
        state
            .world_context
            .insert("world_id".into(), Value::String(world_id));
        // The world-building phase is the only writer of the therapeutic
        // context: it appends the delta it just produced.
        state
            .therapeutic_context
            .insert("last_world_delta".into(), serde_json::to_value(&delta)?);
        state.wba_result = Some(serde_json::to_value(&world_env)?);
        state.advance(WorkflowPhase::NarrativeGeneration)?;
        self.persist(state).await;
        self.events.emit(WorkflowEvent::PhaseCompleted {
            workflow_id: state.workflow_id,
            phase: WorkflowPhase::WorldBuilding,
        });

        // Phase 3: narrative generation
        self.events.emit(WorkflowEvent::PhaseStarted {
            workflow_id: state.workflow_id,
            phase: WorkflowPhase::NarrativeGeneration,
        });
        let prompt = build_narrative_prompt(&state.user_input, &analysis.intent, &delta);
        let context = NarrativeContext {
            world_state: delta.world_state.clone(),
            intent: analysis.intent.clone(),
            entities: analysis.entities.clone(),
            world_updates: serde_json::to_value(&delta)?,
            therapeutic_context: Value::Object(state.therapeutic_context.clone()),
            safety_level: check.level,
        };
        let narrative_env = self.narrative.generate(&prompt, &context).await?;
        if narrative_env.is_mock() {
            self.emit_fallback(state, "narrative");
        }
        let story = narrative_env.payload.story.clone();
        state.nga_result = Some(serde_json::to_value(&narrative_env)?);
        state.advance(WorkflowPhase::Complete)?;
        self.persist(state).await;
        self.events.emit(WorkflowEvent::PhaseCompleted {
            workflow_id: state.workflow_id,
            phase: WorkflowPhase::NarrativeGeneration,
        });

        Ok(PipelineOutcome {
            narrative: story,
            intent: Some(analysis.intent),
            world_updates: Some(serde_json::to_value(&delta)?),
        })
    }

    /// Best-effort checkpointing: a store failure is logged and swallowed so
    /// persistence never aborts the workflow.
    async fn persist(&self, state: &OrchestrationState) {
        match self.store.save(state).await {
            Ok(()) => self.events.emit(WorkflowEvent::CheckpointSaved {
                workflow_id: state.workflow_id,
                phase: state.phase,
            }),
            Err(e) => {
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    phase = %state.phase,
                    error = %e,
                    "Checkpoint save failed, continuing without persistence"
                );
            }
        }
    }

    fn emit_fallback(&self, state: &OrchestrationState, agent: &str) {
        self.events.emit(WorkflowEvent::AdapterFellBack {
            workflow_id: state.workflow_id,
            agent: agent.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Narrative helpers
// ---------------------------------------------------------------------------

/// Deterministic prompt for the narrative collaborator, built only from the
/// user input, the detected intent, and the world delta.
fn build_narrative_prompt(user_input: &str, intent: &str, delta: &WorldDelta) -> String {
    let world_note = if delta.updated {
        "weaving in the changes the world just underwent"
    } else {
        "keeping the world as it stands"
    };
    format!(
        "The player says: \"{user_input}\". Their intent reads as '{intent}'. \
         Continue the story in second person, {world_note}."
    )
}

/// The supportive text returned when a safety intervention stops the
/// pipeline. Never empty.
fn supportive_narrative(level: SafetyLevel) -> &'static str {
    match level {
        SafetyLevel::Blocked => {
            "Let's take a gentle pause here. What you're carrying sounds heavy, and you don't \
             have to face it through this story alone. If you're in immediate distress, please \
             reach out to someone you trust or a local support line. The story will keep your \
             place for whenever you want to return."
        }
        SafetyLevel::Warning => {
            "The story can wait for a moment. It sounds like something difficult is surfacing. \
             Take whatever time you need, and we can continue whenever you're ready."
        }
        SafetyLevel::Safe => {
            "The story continues, steady and unhurried, ready for your next step."
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

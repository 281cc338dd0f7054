//! Shared types, errors, workflow state, and adapter envelopes for Storyloom.
//!
//! This crate provides the foundational types used across the other Storyloom
//! crates:
//! - `OrchestratorError`: unified error taxonomy
//! - `OrchestrationState` / `WorkflowPhase`: the persisted workflow state machine
//! - `Envelope`: the normalized shape every agent adapter returns
//! - `WorkflowRequest` / `WorkflowResponse`: the orchestrator's outer contract

pub mod envelope;
pub mod state;

pub use envelope::{
    Envelope, InputAnalysis, NarrativeContext, NarrativePiece, PayloadSource, SafetyCheck,
    WorldDelta, WorldUpdates,
};
pub use state::{
    OrchestrationState, SafetyLevel, WorkflowPhase, WorkflowRequest, WorkflowResponse,
};

/// Unified error type for all Storyloom subsystems.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    // === Agent adapter errors ===
    #[error("{agent} implementation not available")]
    AgentUnavailable { agent: String },

    #[error("Agent '{agent}' communication failed: {message}")]
    AgentCommunication { agent: String, message: String },

    #[error("Retries exhausted for '{operation}' after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<OrchestratorError>,
    },

    // === Workflow errors ===
    #[error("Invalid phase transition from {from} to {to}")]
    PhaseTransition {
        from: state::WorkflowPhase,
        to: state::WorkflowPhase,
    },

    #[error("Safety validation failed: {0}")]
    SafetyValidation(String),

    // === Persistence errors ===
    //
    // Always caught and logged at the orchestrator level; never propagated
    // out of a workflow.
    #[error("Checkpoint store error: {0}")]
    Persistence(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl OrchestratorError {
    /// Returns `true` when the error means a downstream agent could not be
    /// reached at all (as opposed to failing mid-call).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, OrchestratorError::AgentUnavailable { .. })
    }

    /// Returns `true` for failures an adapter is allowed to degrade into a
    /// deterministic mock result when fallback is permitted.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::RetriesExhausted { .. }
                | OrchestratorError::AgentCommunication { .. }
                | OrchestratorError::AgentUnavailable { .. }
        )
    }
}

/// A convenience alias for `Result<T, OrchestratorError>`.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

//! Storyloom workflow engine.
//!
//! Drives the three-stage pipeline (input understanding → world-state
//! mutation → narrative generation) across independent downstream agents,
//! with retry/backoff, deterministic fallback degradation, safety
//! short-circuiting, and durable checkpointing of in-flight workflow state.

pub mod checkpoint;
pub mod events;
pub mod orchestrator;

pub use checkpoint::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, DEFAULT_CHECKPOINT_TTL,
};
pub use events::{EventEmitter, WorkflowEvent};
pub use orchestrator::{OrchestratorConfig, WorkflowOrchestrator};

//! Agent adapters for the Storyloom orchestration engine.
//!
//! Three structurally identical adapters (input understanding, world
//! mutation, narrative generation) normalize their downstream collaborator's
//! call shape, apply the retry engine, and degrade to deterministic mock
//! payloads when the collaborator is unavailable or exhausted. Blocking
//! legacy collaborators are bridged through a bounded offload pool.

pub mod blocking;
pub mod collaborator;
pub mod input;
pub mod mock;
pub mod narrative;
pub mod retry;
pub mod world;

pub use blocking::{
    BlockingPool, OffloadedInput, OffloadedNarrative, OffloadedWorld, SyncInputUnderstanding,
    SyncNarrativeGeneration, SyncWorldMutation, DEFAULT_BLOCKING_PERMITS,
};
pub use collaborator::{
    InputUnderstanding, NarrativeGeneration, PermissiveSafety, SafetyValidation, WorldMutation,
};
pub use input::InputAgentAdapter;
pub use narrative::NarrativeAgentAdapter;
pub use retry::{execute_with_retry, RetryConfig};
pub use world::WorldAgentAdapter;

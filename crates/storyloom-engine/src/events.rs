//! Workflow event stream for observability.
//!
//! Emits [`WorkflowEvent`]s via a [`tokio::sync::broadcast`] channel so
//! external observers (loggers, UIs, test harnesses) can follow workflow
//! progress without coupling to the orchestrator internals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storyloom_types::{SafetyLevel, WorkflowPhase};

/// Events emitted while a workflow moves through its phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: Uuid,
        session_id: String,
    },
    PhaseStarted {
        workflow_id: Uuid,
        phase: WorkflowPhase,
    },
    PhaseCompleted {
        workflow_id: Uuid,
        phase: WorkflowPhase,
    },
    AdapterFellBack {
        workflow_id: Uuid,
        agent: String,
    },
    SafetyIntervened {
        workflow_id: Uuid,
        level: SafetyLevel,
    },
    CheckpointSaved {
        workflow_id: Uuid,
        phase: WorkflowPhase,
    },
    WorkflowCompleted {
        workflow_id: Uuid,
        duration_ms: u64,
    },
    WorkflowFailed {
        workflow_id: Uuid,
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        let id = Uuid::new_v4();
        emitter.emit(WorkflowEvent::WorkflowStarted {
            workflow_id: id,
            session_id: "s1".into(),
        });

        match rx.recv().await.unwrap() {
            WorkflowEvent::WorkflowStarted {
                workflow_id,
                session_id,
            } => {
                assert_eq!(workflow_id, id);
                assert_eq!(session_id, "s1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(WorkflowEvent::CheckpointSaved {
            workflow_id: Uuid::new_v4(),
            phase: WorkflowPhase::WorldBuilding,
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(
            serde_json::to_string(&e1).unwrap(),
            serde_json::to_string(&e2).unwrap()
        );
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(WorkflowEvent::WorkflowFailed {
            workflow_id: Uuid::new_v4(),
            error: "something went wrong".into(),
        });
    }

    #[test]
    fn event_serialization_round_trip() {
        let event = WorkflowEvent::SafetyIntervened {
            workflow_id: Uuid::nil(),
            level: SafetyLevel::Blocked,
        };
        let json = serde_json::to_string(&event).unwrap();
        let restored: WorkflowEvent = serde_json::from_str(&json).unwrap();
        match restored {
            WorkflowEvent::SafetyIntervened { workflow_id, level } => {
                assert_eq!(workflow_id, Uuid::nil());
                assert_eq!(level, SafetyLevel::Blocked);
            }
            other => panic!("unexpected variant after round-trip: {other:?}"),
        }
    }
}

use crate::{RunError, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Ok,
    Error,
}

/// Per-step status update consumed by the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: StepId,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<serde_json::Value>,
}

impl StepProgress {
    pub fn running(step_id: impl Into<StepId>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Running,
            message: None,
            preview: None,
        }
    }

    pub fn ok(step_id: impl Into<StepId>, preview: serde_json::Value) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Ok,
            message: None,
            preview: Some(preview),
        }
    }

    pub fn error(step_id: impl Into<StepId>, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Error,
            message: Some(message.into()),
            preview: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Aborted(RunError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// Events emitted while a run advances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    RunStarted {
        run_id: RunId,
        total_steps: usize,
        timestamp: DateTime<Utc>,
    },
    StepUpdate {
        run_id: RunId,
        #[serde(flatten)]
        progress: StepProgress,
        timestamp: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Receiver of run progress (the editor UI, a console, a test recorder)
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Broadcast fan-out of progress events
pub struct EventBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl ProgressSink for EventBus {
    fn emit(&self, event: ProgressEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_update_serializes_flat() {
        let event = ProgressEvent::StepUpdate {
            run_id: Uuid::nil(),
            progress: StepProgress::error("step_2", "boom"),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StepUpdate");
        assert_eq!(json["stepId"], "step_2");
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "boom");
        assert!(json.get("preview").is_none());
    }

    #[test]
    fn aborted_outcome_carries_reason() {
        let outcome = RunOutcome::Aborted(RunError::Cancelled);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["error"]["kind"], "cancelled");

        let back: RunOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[tokio::test]
    async fn bus_fans_out_to_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(ProgressEvent::RunStarted {
            run_id: Uuid::nil(),
            total_steps: 3,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            ProgressEvent::RunStarted { total_steps, .. } => assert_eq!(total_steps, 3),
            other => panic!("unexpected event {:?}", other),
        }
    }
}

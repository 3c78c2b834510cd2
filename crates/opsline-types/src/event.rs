//! Pipeline event types.
//!
//! Commands (`ServiceRequestStarted`, `StepCompleted`) drive the execution
//! coordinator. The remaining variants are notifications for observers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::ServiceRequestStatus;

/// Events published on the pipeline event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A submitted request should begin executing.
    ServiceRequestStarted { request_id: Uuid },

    /// An approval-gate step was decided. `error` present means rejection.
    StepCompleted {
        request_id: Uuid,
        step_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A step finished executing.
    StepExecuted {
        request_id: Uuid,
        step_name: String,
        duration_ms: u64,
    },

    /// Execution paused at an approval gate.
    RequestSuspended { request_id: Uuid, step_name: String },

    /// The request reached a terminal status.
    RequestFinished {
        request_id: Uuid,
        status: ServiceRequestStatus,
    },
}

/// Discriminant of a [`PipelineEvent`], for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ServiceRequestStarted,
    StepCompleted,
    StepExecuted,
    RequestSuspended,
    RequestFinished,
}

impl PipelineEvent {
    /// Approval event for the named step.
    pub fn approved(request_id: Uuid, step_name: impl Into<String>) -> Self {
        PipelineEvent::StepCompleted {
            request_id,
            step_name: step_name.into(),
            result: None,
            error: None,
        }
    }

    /// Rejection event for the named step.
    pub fn rejected(request_id: Uuid, step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineEvent::StepCompleted {
            request_id,
            step_name: step_name.into(),
            result: None,
            error: Some(reason.into()),
        }
    }

    pub fn request_id(&self) -> Uuid {
        match self {
            PipelineEvent::ServiceRequestStarted { request_id }
            | PipelineEvent::StepCompleted { request_id, .. }
            | PipelineEvent::StepExecuted { request_id, .. }
            | PipelineEvent::RequestSuspended { request_id, .. }
            | PipelineEvent::RequestFinished { request_id, .. } => *request_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            PipelineEvent::ServiceRequestStarted { .. } => EventKind::ServiceRequestStarted,
            PipelineEvent::StepCompleted { .. } => EventKind::StepCompleted,
            PipelineEvent::StepExecuted { .. } => EventKind::StepExecuted,
            PipelineEvent::RequestSuspended { .. } => EventKind::RequestSuspended,
            PipelineEvent::RequestFinished { .. } => EventKind::RequestFinished,
        }
    }

    /// Whether this event asks the coordinator to act.
    pub fn is_command(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::ServiceRequestStarted | EventKind::StepCompleted
        )
    }
}

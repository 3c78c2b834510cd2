//! Service request and step execution log types.
//!
//! A `ServiceRequest` is one execution of a pipeline version with the form
//! data a user submitted. The step log is the checkpoint trail the
//! coordinator reads back on every resume.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::FormData;

// ---------------------------------------------------------------------------
// Service Request
// ---------------------------------------------------------------------------

/// A submitted pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub pipeline_version: u32,
    #[serde(default)]
    pub form_data: FormData,
    pub status: ServiceRequestStatus,
    /// Failure cause or rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub created_on: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ServiceRequest {
    /// A freshly submitted request in `NotStarted`.
    pub fn new(pipeline_id: Uuid, pipeline_version: u32, form_data: FormData) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            pipeline_id,
            pipeline_version,
            form_data,
            status: ServiceRequestStatus::NotStarted,
            remarks: None,
            created_on: now,
            last_updated: now,
        }
    }
}

/// Lifecycle state of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRequestStatus {
    NotStarted,
    Running,
    Success,
    Failure,
    Canceled,
}

impl ServiceRequestStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServiceRequestStatus::Success
                | ServiceRequestStatus::Failure
                | ServiceRequestStatus::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceRequestStatus::NotStarted => "not_started",
            ServiceRequestStatus::Running => "running",
            ServiceRequestStatus::Success => "success",
            ServiceRequestStatus::Failure => "failure",
            ServiceRequestStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(ServiceRequestStatus::NotStarted),
            "running" => Some(ServiceRequestStatus::Running),
            "success" => Some(ServiceRequestStatus::Success),
            "failure" => Some(ServiceRequestStatus::Failure),
            "canceled" => Some(ServiceRequestStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial update applied by `ServiceRequestRepository::update_fields`.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ServiceRequestPatch {
    pub status: Option<ServiceRequestStatus>,
    pub remarks: Option<String>,
}

// ---------------------------------------------------------------------------
// Step Execution Log
// ---------------------------------------------------------------------------

/// One record per step execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionLog {
    pub id: Uuid,
    pub request_id: Uuid,
    pub step_name: String,
    pub status: StepExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Running,
    Completed,
    Failed,
    WaitingApproval,
    Approved,
    Rejected,
}

impl StepExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepExecutionStatus::Running => "running",
            StepExecutionStatus::Completed => "completed",
            StepExecutionStatus::Failed => "failed",
            StepExecutionStatus::WaitingApproval => "waiting_approval",
            StepExecutionStatus::Approved => "approved",
            StepExecutionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(StepExecutionStatus::Running),
            "completed" => Some(StepExecutionStatus::Completed),
            "failed" => Some(StepExecutionStatus::Failed),
            "waiting_approval" => Some(StepExecutionStatus::WaitingApproval),
            "approved" => Some(StepExecutionStatus::Approved),
            "rejected" => Some(StepExecutionStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for StepExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Durable checkpoint manager for service request execution.
//!
//! Wraps `StepLogRepository` to record each step transition (running ->
//! completed / failed / waiting_approval -> approved / rejected). The step
//! log is the only record of where a suspended request stopped and what
//! earlier steps returned, so it is written before the coordinator moves on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use opsline_types::request::{StepExecutionLog, StepExecutionStatus};
use serde_json::Value;
use uuid::Uuid;

use crate::repository::step_log::StepLogRepository;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Records step-level checkpoints for service requests.
///
/// Generic over `L: StepLogRepository` so it works with any storage backend.
pub struct CheckpointManager<L: StepLogRepository> {
    repo: Arc<L>,
}

impl<L: StepLogRepository> CheckpointManager<L> {
    pub fn new(repo: Arc<L>) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &L {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Step transitions
    // -----------------------------------------------------------------------

    /// Create a `running` log entry for a step and return its ID.
    pub async fn step_started(
        &self,
        request_id: Uuid,
        step_name: &str,
    ) -> Result<Uuid, CheckpointError> {
        let log_id = Uuid::now_v7();
        let log = StepExecutionLog {
            id: log_id,
            request_id,
            step_name: step_name.to_string(),
            status: StepExecutionStatus::Running,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };

        self.repo
            .create_step_log(&log)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            request_id = %request_id,
            step = step_name,
            log_id = %log_id,
            "checkpointed step start"
        );
        Ok(log_id)
    }

    pub async fn step_completed(&self, log_id: Uuid, output: &Value) -> Result<(), CheckpointError> {
        self.update(log_id, StepExecutionStatus::Completed, Some(output), None)
            .await
    }

    pub async fn step_failed(&self, log_id: Uuid, error: &str) -> Result<(), CheckpointError> {
        self.update(log_id, StepExecutionStatus::Failed, None, Some(error))
            .await
    }

    pub async fn step_waiting_approval(&self, log_id: Uuid) -> Result<(), CheckpointError> {
        self.update(log_id, StepExecutionStatus::WaitingApproval, None, None)
            .await
    }

    /// Resolve a waiting gate as approved. Returns `false` if the log was
    /// no longer `waiting_approval`.
    pub async fn step_approved(
        &self,
        log_id: Uuid,
        output: Option<&Value>,
    ) -> Result<bool, CheckpointError> {
        self.resolve_gate(log_id, StepExecutionStatus::Approved, output, None)
            .await
    }

    /// Resolve a waiting gate as rejected. Returns `false` if the log was
    /// no longer `waiting_approval`.
    pub async fn step_rejected(&self, log_id: Uuid, reason: &str) -> Result<bool, CheckpointError> {
        self.resolve_gate(log_id, StepExecutionStatus::Rejected, None, Some(reason))
            .await
    }

    async fn resolve_gate(
        &self,
        log_id: Uuid,
        status: StepExecutionStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<bool, CheckpointError> {
        let resolved = self
            .repo
            .transition_step_log(
                &log_id,
                StepExecutionStatus::WaitingApproval,
                status,
                output,
                error,
            )
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        if resolved {
            tracing::debug!(log_id = %log_id, status = %status, "checkpointed gate decision");
        } else {
            tracing::debug!(log_id = %log_id, status = %status, "gate already resolved");
        }
        Ok(resolved)
    }

    async fn update(
        &self,
        log_id: Uuid,
        status: StepExecutionStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_step_log(&log_id, status, output, error)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(log_id = %log_id, status = %status, "checkpointed step");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recovery helpers
    // -----------------------------------------------------------------------

    /// The log the request is suspended on: its most recent entry, if that
    /// entry is `waiting_approval`.
    pub async fn suspended_step(
        &self,
        request_id: Uuid,
    ) -> Result<Option<StepExecutionLog>, CheckpointError> {
        let logs = self.logs(request_id).await?;
        Ok(logs
            .into_iter()
            .next_back()
            .filter(|log| log.status == StepExecutionStatus::WaitingApproval))
    }

    /// Results of every completed or approved step, keyed by step name.
    ///
    /// Later entries for the same step override earlier ones.
    pub async fn completed_results(
        &self,
        request_id: Uuid,
    ) -> Result<HashMap<String, Value>, CheckpointError> {
        let logs = self.logs(request_id).await?;
        let mut results = HashMap::new();
        for log in logs {
            match log.status {
                StepExecutionStatus::Completed => {
                    results.insert(log.step_name, log.output.unwrap_or(Value::Null));
                }
                StepExecutionStatus::Approved => {
                    if let Some(output) = log.output {
                        results.insert(log.step_name, output);
                    }
                }
                _ => {}
            }
        }
        Ok(results)
    }

    pub async fn logs(&self, request_id: Uuid) -> Result<Vec<StepExecutionLog>, CheckpointError> {
        self.repo
            .list_step_logs(&request_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),
}

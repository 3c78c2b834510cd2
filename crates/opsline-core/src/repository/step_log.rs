//! Step execution log repository trait definition.

use opsline_types::error::RepositoryError;
use opsline_types::request::{StepExecutionLog, StepExecutionStatus};
use uuid::Uuid;

/// Repository trait for the per-request step execution trail.
pub trait StepLogRepository: Send + Sync {
    /// Create a new step execution log entry.
    fn create_step_log(
        &self,
        log: &StepExecutionLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a log's status and optionally its output/error.
    ///
    /// Any status other than `Running` and `WaitingApproval` stamps
    /// `completed_at`.
    fn update_step_log(
        &self,
        log_id: &Uuid,
        status: StepExecutionStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Like `update_step_log`, but only if the log currently has status
    /// `from`.
    ///
    /// Returns `true` if the update happened. Approving or rejecting a gate
    /// goes through here so two deciders cannot both resolve it.
    fn transition_step_log(
        &self,
        log_id: &Uuid,
        from: StepExecutionStatus,
        to: StepExecutionStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// All logs for a request, oldest first.
    fn list_step_logs(
        &self,
        request_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepExecutionLog>, RepositoryError>> + Send;
}

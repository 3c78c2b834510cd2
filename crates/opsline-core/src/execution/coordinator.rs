//! Execution coordinator: drives a service request through its pipeline.
//!
//! The coordinator owns the request state machine
//! (`NotStarted -> Running -> {Success, Failure, Canceled}`) and reacts to
//! start and approval commands. Steps run strictly one after another. At an
//! approval gate the coordinator records the suspension and returns; nothing
//! stays in memory until the matching approval arrives.
//!
//! # Resume
//!
//! Every resume rebuilds the `ExecutionContext` from persisted state: the
//! request row, the pipeline version it was submitted against, the step log,
//! and the step named by the approval. A process restart between suspension
//! and approval loses nothing.
//!
//! # Concurrency
//!
//! Commands for the same request are serialized by a per-request lock.
//! `start` additionally uses a conditional `NotStarted -> Running` update, so
//! a duplicate start is rejected even across processes. Finishing transitions
//! are conditional on `Running`, which keeps a concurrent cancel from being
//! overwritten.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use opsline_types::error::RepositoryError;
use opsline_types::event::PipelineEvent;
use opsline_types::pipeline::{PipelineDefinition, StepKind};
use opsline_types::request::{ServiceRequest, ServiceRequestStatus};
use uuid::Uuid;

use crate::event::bus::EventBus;
use crate::repository::pipeline::PipelineRepository;
use crate::repository::service_request::ServiceRequestRepository;
use crate::repository::step_log::StepLogRepository;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::context::ExecutionContext;
use super::executor::{ExecutionError, StepOutcome};
use super::registry::ExecutorRegistry;

// ---------------------------------------------------------------------------
// ExecutionReport
// ---------------------------------------------------------------------------

/// What a single coordinator command did.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub request_id: Uuid,
    /// Status after the command.
    pub status: ServiceRequestStatus,
    /// Set when the run paused at an approval gate.
    pub suspended_at: Option<String>,
    /// Steps that completed during this command, in order.
    pub executed_steps: Vec<String>,
    /// Failure cause, if the command ended the run in `Failure`.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors returned when a command is rejected or storage fails.
///
/// Step failures are not errors here: they move the request to `Failure` and
/// come back as a normal `ExecutionReport`.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("service request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("cannot {action} service request {request_id} in status {status}")]
    InvalidTransition {
        request_id: Uuid,
        status: ServiceRequestStatus,
        action: &'static str,
    },

    #[error("step '{step}' does not exist in the request's pipeline")]
    InvalidReference { step: String },

    #[error("step '{step}' is a {kind} step, not an approval gate")]
    WrongStepType { step: String, kind: StepKind },

    #[error("service request is not suspended at step '{step}'")]
    NotSuspendedAt { step: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

// ---------------------------------------------------------------------------
// ExecutionCoordinator
// ---------------------------------------------------------------------------

/// Drives service requests through their pipelines.
///
/// Generic over the three repository ports so the same engine runs against
/// SQLite in production and in-memory stores in tests.
pub struct ExecutionCoordinator<P, S, L>
where
    P: PipelineRepository,
    S: ServiceRequestRepository,
    L: StepLogRepository,
{
    pipelines: Arc<P>,
    requests: Arc<S>,
    checkpoint: CheckpointManager<L>,
    registry: Arc<ExecutorRegistry>,
    event_bus: EventBus,
    /// Per-request command locks, removed once uncontended.
    request_locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
}

impl<P, S, L> ExecutionCoordinator<P, S, L>
where
    P: PipelineRepository,
    S: ServiceRequestRepository,
    L: StepLogRepository,
{
    pub fn new(
        pipelines: Arc<P>,
        requests: Arc<S>,
        step_logs: Arc<L>,
        registry: Arc<ExecutorRegistry>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            pipelines,
            requests,
            checkpoint: CheckpointManager::new(step_logs),
            registry,
            event_bus,
            request_locks: DashMap::new(),
        }
    }

    pub fn checkpoint(&self) -> &CheckpointManager<L> {
        &self.checkpoint
    }

    // -----------------------------------------------------------------------
    // Event entry point
    // -----------------------------------------------------------------------

    /// Apply a command event. Notification events are ignored (`Ok(None)`).
    pub async fn handle_event(
        &self,
        event: &PipelineEvent,
    ) -> Result<Option<ExecutionReport>, CoordinatorError> {
        match event {
            PipelineEvent::ServiceRequestStarted { request_id } => {
                self.start(*request_id).await.map(Some)
            }
            PipelineEvent::StepCompleted {
                request_id,
                step_name,
                result,
                error: None,
            } => self
                .approve_with_result(*request_id, step_name, result.clone())
                .await
                .map(Some),
            PipelineEvent::StepCompleted {
                request_id,
                step_name,
                error: Some(reason),
                ..
            } => self.reject(*request_id, step_name, reason).await.map(Some),
            _ => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Begin executing a `NotStarted` request from its first step.
    pub async fn start(&self, request_id: Uuid) -> Result<ExecutionReport, CoordinatorError> {
        let lock = self.request_lock(request_id);
        let result = {
            let _guard = lock.lock().await;
            self.start_locked(request_id).await
        };
        drop(lock);
        self.release_lock(request_id);
        result
    }

    /// Approve the gate the request is suspended at and continue.
    pub async fn approve(
        &self,
        request_id: Uuid,
        step_name: &str,
    ) -> Result<ExecutionReport, CoordinatorError> {
        self.approve_with_result(request_id, step_name, None).await
    }

    /// Approve with an optional result that later steps can reference as
    /// `${steps.<gate>...}`.
    pub async fn approve_with_result(
        &self,
        request_id: Uuid,
        step_name: &str,
        result: Option<serde_json::Value>,
    ) -> Result<ExecutionReport, CoordinatorError> {
        let lock = self.request_lock(request_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.approve_locked(request_id, step_name, result).await
        };
        drop(lock);
        self.release_lock(request_id);
        outcome
    }

    /// Reject the gate the request is suspended at; the request fails.
    pub async fn reject(
        &self,
        request_id: Uuid,
        step_name: &str,
        reason: &str,
    ) -> Result<ExecutionReport, CoordinatorError> {
        let lock = self.request_lock(request_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.reject_locked(request_id, step_name, reason).await
        };
        drop(lock);
        self.release_lock(request_id);
        outcome
    }

    /// Cancel a `NotStarted` or `Running` request.
    ///
    /// Does not take the request lock: an in-flight step finishes, and the
    /// run loop stops when it next reads the status.
    pub async fn cancel(&self, request_id: Uuid) -> Result<ExecutionReport, CoordinatorError> {
        for from in [ServiceRequestStatus::NotStarted, ServiceRequestStatus::Running] {
            if self
                .requests
                .transition_status(&request_id, from, ServiceRequestStatus::Canceled)
                .await?
            {
                tracing::info!(request_id = %request_id, from = %from, "service request canceled");
                self.event_bus.publish(PipelineEvent::RequestFinished {
                    request_id,
                    status: ServiceRequestStatus::Canceled,
                });
                return Ok(ExecutionReport {
                    request_id,
                    status: ServiceRequestStatus::Canceled,
                    suspended_at: None,
                    executed_steps: Vec::new(),
                    error: None,
                });
            }
        }

        let request = self.load_request(request_id).await?;
        Err(CoordinatorError::InvalidTransition {
            request_id,
            status: request.status,
            action: "cancel",
        })
    }

    // -----------------------------------------------------------------------
    // Locked command bodies
    // -----------------------------------------------------------------------

    async fn start_locked(&self, request_id: Uuid) -> Result<ExecutionReport, CoordinatorError> {
        let mut request = self.load_request(request_id).await?;
        if request.status != ServiceRequestStatus::NotStarted {
            return Err(CoordinatorError::InvalidTransition {
                request_id,
                status: request.status,
                action: "start",
            });
        }

        let claimed = self
            .requests
            .transition_status(
                &request_id,
                ServiceRequestStatus::NotStarted,
                ServiceRequestStatus::Running,
            )
            .await?;
        if !claimed {
            let current = self.load_request(request_id).await?;
            return Err(CoordinatorError::InvalidTransition {
                request_id,
                status: current.status,
                action: "start",
            });
        }
        request.status = ServiceRequestStatus::Running;

        tracing::info!(
            request_id = %request_id,
            pipeline_id = %request.pipeline_id,
            version = request.pipeline_version,
            "starting service request"
        );

        let Some(pipeline) = self.load_pipeline(&request).await? else {
            let cause = format!(
                "pipeline {}@v{} not found",
                request.pipeline_id, request.pipeline_version
            );
            return self
                .finish(request_id, ServiceRequestStatus::Failure, Some(cause), Vec::new())
                .await;
        };

        let first = pipeline.first_step_name.clone();
        let mut ctx = ExecutionContext::new(pipeline, request);
        self.run_steps(&mut ctx, first, Vec::new()).await
    }

    async fn approve_locked(
        &self,
        request_id: Uuid,
        step_name: &str,
        result: Option<serde_json::Value>,
    ) -> Result<ExecutionReport, CoordinatorError> {
        let (request, pipeline, log_id) = self.check_gate(request_id, step_name, "approve").await?;

        if !self.checkpoint.step_approved(log_id, result.as_ref()).await? {
            return Err(CoordinatorError::NotSuspendedAt {
                step: step_name.to_string(),
            });
        }
        tracing::info!(request_id = %request_id, step = step_name, "approval received");

        let Some(step) = pipeline.step(step_name).cloned() else {
            return Err(CoordinatorError::InvalidReference {
                step: step_name.to_string(),
            });
        };

        let executed = vec![step.name.clone()];
        if step.is_terminal {
            return self
                .finish(request_id, ServiceRequestStatus::Success, None, executed)
                .await;
        }

        let results = self.checkpoint.completed_results(request_id).await?;
        let mut ctx = ExecutionContext::new(pipeline, request).with_results(results);
        self.run_steps(&mut ctx, step.next_name, executed).await
    }

    async fn reject_locked(
        &self,
        request_id: Uuid,
        step_name: &str,
        reason: &str,
    ) -> Result<ExecutionReport, CoordinatorError> {
        let (_, _, log_id) = self.check_gate(request_id, step_name, "reject").await?;

        if !self.checkpoint.step_rejected(log_id, reason).await? {
            return Err(CoordinatorError::NotSuspendedAt {
                step: step_name.to_string(),
            });
        }
        tracing::info!(request_id = %request_id, step = step_name, reason, "approval rejected");

        let cause = format!("step '{step_name}' rejected: {reason}");
        self.finish(request_id, ServiceRequestStatus::Failure, Some(cause), Vec::new())
            .await
    }

    /// Checks shared by approve and reject. Returns the request, its
    /// pipeline, and the waiting log entry.
    async fn check_gate(
        &self,
        request_id: Uuid,
        step_name: &str,
        action: &'static str,
    ) -> Result<(ServiceRequest, Arc<PipelineDefinition>, Uuid), CoordinatorError> {
        let request = self.load_request(request_id).await?;
        if request.status != ServiceRequestStatus::Running {
            return Err(CoordinatorError::InvalidTransition {
                request_id,
                status: request.status,
                action,
            });
        }

        let pipeline = self.load_pipeline(&request).await?.ok_or_else(|| {
            CoordinatorError::InvalidReference {
                step: step_name.to_string(),
            }
        })?;

        let step = pipeline
            .step(step_name)
            .ok_or_else(|| CoordinatorError::InvalidReference {
                step: step_name.to_string(),
            })?;
        if step.kind != StepKind::WaitForApproval {
            return Err(CoordinatorError::WrongStepType {
                step: step_name.to_string(),
                kind: step.kind.clone(),
            });
        }

        let log = self
            .checkpoint
            .suspended_step(request_id)
            .await?
            .filter(|log| log.step_name == step_name)
            .ok_or_else(|| CoordinatorError::NotSuspendedAt {
                step: step_name.to_string(),
            })?;

        Ok((request, pipeline, log.id))
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// Execute steps starting at `from` until the run finishes, suspends, or
    /// is canceled from outside.
    async fn run_steps(
        &self,
        ctx: &mut ExecutionContext,
        from: String,
        mut executed: Vec<String>,
    ) -> Result<ExecutionReport, CoordinatorError> {
        let request_id = ctx.request.id;
        let mut step_name = from;

        loop {
            // Cancellation is observed between steps.
            let current = self.load_request(request_id).await?;
            if current.status != ServiceRequestStatus::Running {
                tracing::info!(
                    request_id = %request_id,
                    status = %current.status,
                    "stopping run: status changed externally"
                );
                return Ok(ExecutionReport {
                    request_id,
                    status: current.status,
                    suspended_at: None,
                    executed_steps: executed,
                    error: current.remarks,
                });
            }

            ctx.current_step = step_name.clone();
            let Some(step) = ctx.current_step().cloned() else {
                let err = ExecutionError::StepNotFound { step: step_name };
                return self.fail(request_id, err, executed).await;
            };
            let Some(executor) = self.registry.get(&step.kind) else {
                let err = ExecutionError::MissingExecutor {
                    kind: step.kind.to_string(),
                };
                return self.fail(request_id, err, executed).await;
            };

            let log_id = self.checkpoint.step_started(request_id, &step.name).await?;
            let started = Instant::now();

            match executor.execute(ctx).await {
                Ok(StepOutcome::Completed(result)) => {
                    self.checkpoint.step_completed(log_id, &result).await?;
                    ctx.record_result(&step.name, result);
                    executed.push(step.name.clone());

                    self.event_bus.publish(PipelineEvent::StepExecuted {
                        request_id,
                        step_name: step.name.clone(),
                        duration_ms: started.elapsed().as_millis() as u64,
                    });

                    if step.is_terminal {
                        return self
                            .finish(request_id, ServiceRequestStatus::Success, None, executed)
                            .await;
                    }
                    step_name = step.next_name;
                }
                Ok(StepOutcome::Suspended) => {
                    self.checkpoint.step_waiting_approval(log_id).await?;
                    self.event_bus.publish(PipelineEvent::RequestSuspended {
                        request_id,
                        step_name: step.name.clone(),
                    });
                    tracing::info!(
                        request_id = %request_id,
                        step = step.name.as_str(),
                        "service request suspended for approval"
                    );
                    return Ok(ExecutionReport {
                        request_id,
                        status: ServiceRequestStatus::Running,
                        suspended_at: Some(step.name),
                        executed_steps: executed,
                        error: None,
                    });
                }
                Err(err) => {
                    self.checkpoint.step_failed(log_id, &err.to_string()).await?;
                    return self.fail(request_id, err, executed).await;
                }
            }
        }
    }

    async fn fail(
        &self,
        request_id: Uuid,
        err: ExecutionError,
        executed: Vec<String>,
    ) -> Result<ExecutionReport, CoordinatorError> {
        tracing::warn!(request_id = %request_id, error = %err, "service request failed");
        self.finish(
            request_id,
            ServiceRequestStatus::Failure,
            Some(err.to_string()),
            executed,
        )
        .await
    }

    /// Move a `Running` request to its final status. A request that left
    /// `Running` in the meantime (canceled) keeps its current status.
    async fn finish(
        &self,
        request_id: Uuid,
        status: ServiceRequestStatus,
        remarks: Option<String>,
        executed: Vec<String>,
    ) -> Result<ExecutionReport, CoordinatorError> {
        let applied = self
            .requests
            .transition_with_remarks(
                &request_id,
                ServiceRequestStatus::Running,
                status,
                remarks.as_deref(),
            )
            .await?;

        if !applied {
            let current = self.load_request(request_id).await?;
            tracing::info!(
                request_id = %request_id,
                wanted = %status,
                current = %current.status,
                "final transition skipped"
            );
            return Ok(ExecutionReport {
                request_id,
                status: current.status,
                suspended_at: None,
                executed_steps: executed,
                error: current.remarks,
            });
        }

        self.event_bus
            .publish(PipelineEvent::RequestFinished { request_id, status });
        tracing::info!(request_id = %request_id, status = %status, "service request finished");

        Ok(ExecutionReport {
            request_id,
            status,
            suspended_at: None,
            executed_steps: executed,
            error: remarks,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load_request(&self, request_id: Uuid) -> Result<ServiceRequest, CoordinatorError> {
        self.requests
            .get(&request_id)
            .await?
            .ok_or(CoordinatorError::RequestNotFound(request_id))
    }

    async fn load_pipeline(
        &self,
        request: &ServiceRequest,
    ) -> Result<Option<Arc<PipelineDefinition>>, CoordinatorError> {
        Ok(self
            .pipelines
            .get(&request.pipeline_id, request.pipeline_version)
            .await?
            .map(Arc::new))
    }

    fn request_lock(&self, request_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.request_locks
            .entry(request_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release_lock(&self, request_id: Uuid) {
        self.request_locks
            .remove_if(&request_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Service request submission and approval commands.
//!
//! The service never runs steps itself. It validates and persists, then
//! publishes the command on the event bus; the listener hands it to the
//! execution coordinator.

use std::sync::Arc;

use opsline_types::event::PipelineEvent;
use opsline_types::form::FormData;
use opsline_types::request::ServiceRequest;
use serde_json::Value;
use uuid::Uuid;

use crate::event::bus::EventBus;
use crate::form::FormDataValidator;
use crate::repository::pipeline::PipelineRepository;
use crate::repository::service_request::ServiceRequestRepository;

use super::ServiceError;

pub struct ServiceRequestService<P, S>
where
    P: PipelineRepository,
    S: ServiceRequestRepository,
{
    pipelines: Arc<P>,
    requests: Arc<S>,
    form_validator: Arc<FormDataValidator>,
    event_bus: EventBus,
}

impl<P, S> ServiceRequestService<P, S>
where
    P: PipelineRepository,
    S: ServiceRequestRepository,
{
    pub fn new(
        pipelines: Arc<P>,
        requests: Arc<S>,
        form_validator: Arc<FormDataValidator>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            pipelines,
            requests,
            form_validator,
            event_bus,
        }
    }

    /// Submit a request against a pipeline version (latest when `None`).
    ///
    /// Form data is validated against that version's schema. The request is
    /// stored as `NotStarted` and a `ServiceRequestStarted` command is
    /// published.
    pub async fn submit(
        &self,
        pipeline_id: Uuid,
        version: Option<u32>,
        form_data: FormData,
    ) -> Result<ServiceRequest, ServiceError> {
        let version = match version {
            Some(v) => v,
            None => self
                .pipelines
                .latest_version(&pipeline_id)
                .await?
                .ok_or(ServiceError::PipelineNotFound(pipeline_id))?,
        };
        let pipeline = self
            .pipelines
            .get(&pipeline_id, version)
            .await?
            .ok_or(ServiceError::PipelineVersionNotFound {
                id: pipeline_id,
                version,
            })?;

        self.form_validator
            .validate(&form_data, &pipeline.form_schema)?;

        let request = ServiceRequest::new(pipeline.id, pipeline.version, form_data);
        self.requests.create(&request).await?;

        tracing::info!(
            request_id = %request.id,
            pipeline = %pipeline.reference(),
            "submitted service request"
        );

        self.event_bus
            .send_command(PipelineEvent::ServiceRequestStarted {
                request_id: request.id,
            })
            .await;
        Ok(request)
    }

    /// Publish an approval for the gate `step_name`.
    ///
    /// `result` becomes the gate's step result for later placeholders.
    pub async fn approve(
        &self,
        request_id: Uuid,
        step_name: &str,
        result: Option<Value>,
    ) -> Result<(), ServiceError> {
        self.get(request_id).await?;
        tracing::info!(request_id = %request_id, step = step_name, "approval submitted");
        self.event_bus
            .send_command(PipelineEvent::StepCompleted {
                request_id,
                step_name: step_name.to_string(),
                result,
                error: None,
            })
            .await;
        Ok(())
    }

    /// Publish a rejection for the gate `step_name`.
    pub async fn reject(
        &self,
        request_id: Uuid,
        step_name: &str,
        reason: &str,
    ) -> Result<(), ServiceError> {
        self.get(request_id).await?;
        tracing::info!(
            request_id = %request_id,
            step = step_name,
            reason,
            "rejection submitted"
        );
        self.event_bus
            .send_command(PipelineEvent::rejected(request_id, step_name, reason))
            .await;
        Ok(())
    }

    pub async fn get(&self, request_id: Uuid) -> Result<ServiceRequest, ServiceError> {
        self.requests
            .get(&request_id)
            .await?
            .ok_or(ServiceError::RequestNotFound(request_id))
    }

    pub async fn list(&self, limit: u32) -> Result<Vec<ServiceRequest>, ServiceError> {
        Ok(self.requests.list(limit).await?)
    }
}

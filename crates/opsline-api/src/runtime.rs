//! In-process execution runtime for one CLI invocation.
//!
//! Commands that publish events start the runtime (event bus, listener, task
//! queue, coordinator), publish, then `drain` before printing. Nothing is
//! kept in memory across invocations: a request suspended at an approval
//! gate is resumed later from what the database holds.

use std::sync::Arc;

use opsline_core::event::{EventBus, EventListener};
use opsline_core::execution::{ExecutionCoordinator, ExecutorRegistry};
use opsline_core::form::FormDataValidator;
use opsline_core::queue::TaskQueue;
use opsline_core::service::ServiceRequestService;
use opsline_infra::sqlite::{
    SqlitePipelineRepository, SqliteServiceRequestRepository, SqliteStepLogRepository,
};

use crate::state::AppState;

pub type ConcreteCoordinator = ExecutionCoordinator<
    SqlitePipelineRepository,
    SqliteServiceRequestRepository,
    SqliteStepLogRepository,
>;

pub type ConcreteRequestService =
    ServiceRequestService<SqlitePipelineRepository, SqliteServiceRequestRepository>;

pub struct Runtime {
    pub coordinator: Arc<ConcreteCoordinator>,
    pub requests: ConcreteRequestService,
    listener: EventListener,
    queue: TaskQueue,
}

impl Runtime {
    pub fn start(state: &AppState) -> anyhow::Result<Self> {
        let runtime_config = &state.config.runtime;
        let bus = EventBus::new(runtime_config.event_bus_capacity);
        let registry = ExecutorRegistry::with_defaults(Arc::clone(&state.http))?;

        let coordinator = Arc::new(ExecutionCoordinator::new(
            Arc::clone(&state.pipelines),
            Arc::clone(&state.requests),
            Arc::clone(&state.step_logs),
            Arc::new(registry),
            bus.clone(),
        ));

        let queue = TaskQueue::start(runtime_config.queue_capacity, runtime_config.workers);
        let listener = EventListener::spawn(&bus, Arc::clone(&coordinator), queue.clone());

        let requests = ServiceRequestService::new(
            Arc::clone(&state.pipelines),
            Arc::clone(&state.requests),
            Arc::new(FormDataValidator::new()),
            bus,
        );

        tracing::debug!(
            workers = runtime_config.workers,
            queue_capacity = runtime_config.queue_capacity,
            "execution runtime started"
        );

        Ok(Self {
            coordinator,
            requests,
            listener,
            queue,
        })
    }

    /// Forward pending events, then wait for every queued command to finish.
    pub async fn drain(self) {
        self.listener.shutdown().await;
        self.queue.shutdown().await;
        tracing::debug!("execution runtime drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use opsline_core::repository::service_request::ServiceRequestRepository;
    use opsline_core::repository::step_log::StepLogRepository;
    use opsline_core::execution::CoordinatorError;
    use opsline_core::pipeline::definition::parse_pipeline_yaml;
    use opsline_infra::http::ReqwestHttpClient;
    use opsline_infra::sqlite::DatabasePool;
    use opsline_types::config::GlobalConfig;
    use opsline_types::request::{ServiceRequestStatus, StepExecutionStatus};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gated_yaml(base: &str) -> String {
        format!(
            r#"
name: restart-service
first_step_name: open-ticket
form_schema:
  fields:
    - name: service
      type: text
      required: true
steps:
  - name: open-ticket
    kind: api
    next_name: approval
    parameters:
      method: POST
      url: "{base}/tickets"
      body:
        service: "${{form.service}}"
  - name: approval
    kind: wait_for_approval
    prev_name: open-ticket
    next_name: restart
  - name: restart
    kind: api
    prev_name: approval
    is_terminal: true
    parameters:
      method: POST
      url: "{base}/restart"
      body:
        ticket: "${{steps.open-ticket.body.id}}"
        approver: "${{steps.approval.by}}"
"#
        )
    }

    async fn state_in(dir: &std::path::Path) -> AppState {
        let url = format!("sqlite://{}?mode=rwc", dir.join("ops.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        let config = GlobalConfig::default();
        let http = ReqwestHttpClient::new(&config.http).unwrap();
        AppState::from_parts(dir, config, pool, Arc::new(http))
    }

    #[tokio::test]
    async fn suspended_request_resumes_in_a_later_runtime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tickets"))
            .and(body_json(json!({"service": "billing"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "T-42"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/restart"))
            .and(body_json(json!({"ticket": "T-42", "approver": "alice"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path()).await;
        let def = parse_pipeline_yaml(&gated_yaml(&server.uri())).unwrap();
        let def = state.pipeline_service.create(def).await.unwrap();

        // First invocation: submit and run up to the gate.
        let runtime = Runtime::start(&state).unwrap();
        let form = HashMap::from([("service".to_string(), json!("billing"))]);
        let request = runtime.requests.submit(def.id, None, form).await.unwrap();
        runtime.drain().await;

        let stored = state.requests.get(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ServiceRequestStatus::Running);
        let logs = state.step_logs.list_step_logs(&request.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].status, StepExecutionStatus::WaitingApproval);

        // Second invocation: nothing in memory but the database.
        let state = state_in(dir.path()).await;
        let runtime = Runtime::start(&state).unwrap();
        runtime
            .requests
            .approve(request.id, "approval", Some(json!({"by": "alice"})))
            .await
            .unwrap();
        runtime.drain().await;

        let stored = state.requests.get(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ServiceRequestStatus::Success);
        let logs = state.step_logs.list_step_logs(&request.id).await.unwrap();
        let statuses: Vec<StepExecutionStatus> = logs.iter().map(|l| l.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepExecutionStatus::Completed,
                StepExecutionStatus::Approved,
                StepExecutionStatus::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn failing_step_marks_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tickets"))
            .respond_with(ResponseTemplate::new(500).set_body_string("ticketing down"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path()).await;
        let def = parse_pipeline_yaml(&gated_yaml(&server.uri())).unwrap();
        let def = state.pipeline_service.create(def).await.unwrap();

        let runtime = Runtime::start(&state).unwrap();
        let form = HashMap::from([("service".to_string(), json!("billing"))]);
        let request = runtime.requests.submit(def.id, None, form).await.unwrap();
        runtime.drain().await;

        let stored = state.requests.get(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ServiceRequestStatus::Failure);
        assert!(stored.remarks.unwrap().contains("500"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_approvals_from_two_processes_resume_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tickets"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "T-7"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/restart"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path()).await;
        let def = parse_pipeline_yaml(&gated_yaml(&server.uri())).unwrap();
        let def = state.pipeline_service.create(def).await.unwrap();

        let runtime = Runtime::start(&state).unwrap();
        let form = HashMap::from([("service".to_string(), json!("billing"))]);
        let request = runtime.requests.submit(def.id, None, form).await.unwrap();
        runtime.drain().await;

        // Two invocations, each with its own pool and coordinator, decide the
        // same gate at once. Only the shared database can order them.
        let first = Runtime::start(&state_in(dir.path()).await).unwrap();
        let second = Runtime::start(&state_in(dir.path()).await).unwrap();
        let (a, b) = tokio::join!(
            first
                .coordinator
                .approve_with_result(request.id, "approval", Some(json!({"by": "alice"}))),
            second
                .coordinator
                .approve_with_result(request.id, "approval", Some(json!({"by": "bob"}))),
        );
        first.drain().await;
        second.drain().await;

        let (won, lost) = match (a, b) {
            (Ok(report), Err(e)) | (Err(e), Ok(report)) => (report, e),
            (a, b) => panic!("expected exactly one approval to win, got {a:?} and {b:?}"),
        };
        assert_eq!(won.status, ServiceRequestStatus::Success);
        assert!(matches!(
            lost,
            CoordinatorError::NotSuspendedAt { .. } | CoordinatorError::InvalidTransition { .. }
        ));

        let logs = state.step_logs.list_step_logs(&request.id).await.unwrap();
        let statuses: Vec<StepExecutionStatus> = logs.iter().map(|l| l.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepExecutionStatus::Completed,
                StepExecutionStatus::Approved,
                StepExecutionStatus::Completed,
            ]
        );
    }
}

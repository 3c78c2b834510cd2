//! In-memory repositories, a scripted HTTP client, and pipeline fixtures
//! shared by the unit tests in this crate.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use opsline_types::error::RepositoryError;
use opsline_types::form::{FieldType, FormField, FormSchema};
use opsline_types::pipeline::{PipelineDefinition, PipelineStep, StepKind};
use opsline_types::request::{
    ServiceRequest, ServiceRequestPatch, ServiceRequestStatus, StepExecutionLog,
    StepExecutionStatus,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::event::bus::EventBus;
use crate::execution::coordinator::ExecutionCoordinator;
use crate::execution::http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::execution::registry::ExecutorRegistry;
use crate::repository::pipeline::PipelineRepository;
use crate::repository::service_request::ServiceRequestRepository;
use crate::repository::step_log::StepLogRepository;

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryPipelineRepository {
    rows: Mutex<HashMap<(Uuid, u32), PipelineDefinition>>,
}

impl PipelineRepository for InMemoryPipelineRepository {
    async fn create(&self, def: &PipelineDefinition) -> Result<Uuid, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let key = (def.id, def.version);
        if rows.contains_key(&key) {
            return Err(RepositoryError::Conflict(format!(
                "pipeline {}@v{} exists",
                def.id, def.version
            )));
        }
        rows.insert(key, def.clone());
        Ok(def.id)
    }

    async fn get(&self, id: &Uuid, version: u32) -> Result<Option<PipelineDefinition>, RepositoryError> {
        Ok(self.rows.lock().unwrap().get(&(*id, version)).cloned())
    }

    async fn latest_version(&self, id: &Uuid) -> Result<Option<u32>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .keys()
            .filter(|(pid, _)| pid == id)
            .map(|(_, v)| *v)
            .max())
    }

    async fn list_latest(&self) -> Result<Vec<PipelineDefinition>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut latest: HashMap<Uuid, &PipelineDefinition> = HashMap::new();
        for def in rows.values() {
            match latest.get(&def.id) {
                Some(existing) if existing.version >= def.version => {}
                _ => {
                    latest.insert(def.id, def);
                }
            }
        }
        let mut out: Vec<PipelineDefinition> = latest.into_values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryServiceRequestRepository {
    rows: Mutex<Vec<ServiceRequest>>,
}

impl InMemoryServiceRequestRepository {
    fn with_row<T>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut ServiceRequest) -> T,
    ) -> Result<T, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or(RepositoryError::NotFound)?;
        Ok(f(row))
    }
}

impl ServiceRequestRepository for InMemoryServiceRequestRepository {
    async fn create(&self, request: &ServiceRequest) -> Result<Uuid, RepositoryError> {
        self.rows.lock().unwrap().push(request.clone());
        Ok(request.id)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<ServiceRequest>, RepositoryError> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == *id).cloned())
    }

    async fn update_status(&self, id: &Uuid, status: ServiceRequestStatus) -> Result<(), RepositoryError> {
        self.with_row(id, |row| {
            row.status = status;
            row.last_updated = Utc::now();
        })
    }

    async fn transition_status(
        &self,
        id: &Uuid,
        from: ServiceRequestStatus,
        to: ServiceRequestStatus,
    ) -> Result<bool, RepositoryError> {
        self.transition_with_remarks(id, from, to, None).await
    }

    async fn transition_with_remarks(
        &self,
        id: &Uuid,
        from: ServiceRequestStatus,
        to: ServiceRequestStatus,
        remarks: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        self.with_row(id, |row| {
            if row.status != from {
                return false;
            }
            row.status = to;
            if let Some(remarks) = remarks {
                row.remarks = Some(remarks.to_string());
            }
            row.last_updated = Utc::now();
            true
        })
    }

    async fn update_fields(&self, id: &Uuid, patch: &ServiceRequestPatch) -> Result<(), RepositoryError> {
        self.with_row(id, |row| {
            if let Some(status) = patch.status {
                row.status = status;
            }
            if let Some(remarks) = &patch.remarks {
                row.remarks = Some(remarks.clone());
            }
            row.last_updated = Utc::now();
        })
    }

    async fn list(&self, limit: u32) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().rev().take(limit as usize).cloned().collect())
    }
}

fn apply_step_update(
    row: &mut StepExecutionLog,
    status: StepExecutionStatus,
    output: Option<&Value>,
    error: Option<&str>,
) {
    row.status = status;
    if let Some(output) = output {
        row.output = Some(output.clone());
    }
    if let Some(error) = error {
        row.error = Some(error.to_string());
    }
    if !matches!(
        status,
        StepExecutionStatus::Running | StepExecutionStatus::WaitingApproval
    ) {
        row.completed_at = Some(Utc::now());
    }
}

#[derive(Default)]
pub struct InMemoryStepLogRepository {
    rows: Mutex<Vec<StepExecutionLog>>,
}

impl StepLogRepository for InMemoryStepLogRepository {
    async fn create_step_log(&self, log: &StepExecutionLog) -> Result<(), RepositoryError> {
        self.rows.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn update_step_log(
        &self,
        log_id: &Uuid,
        status: StepExecutionStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|l| l.id == *log_id)
            .ok_or(RepositoryError::NotFound)?;
        apply_step_update(row, status, output, error);
        Ok(())
    }

    async fn transition_step_log(
        &self,
        log_id: &Uuid,
        from: StepExecutionStatus,
        to: StepExecutionStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|l| l.id == *log_id)
            .ok_or(RepositoryError::NotFound)?;
        if row.status != from {
            return Ok(false);
        }
        apply_step_update(row, to, output, error);
        Ok(true)
    }

    async fn list_step_logs(&self, request_id: &Uuid) -> Result<Vec<StepExecutionLog>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.request_id == *request_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Scripted HTTP client
// ---------------------------------------------------------------------------

type SendHook = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Replays queued responses in order and records every request.
///
/// With nothing queued it answers `200 {"ticket": "T-1"}`.
#[derive(Default)]
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    sent: Mutex<Vec<HttpRequest>>,
    hook: Mutex<Option<SendHook>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: HttpError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Run `f` inside every `send`, before the response is returned.
    pub fn on_send<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.hook.lock().unwrap() = Some(Box::new(move || Box::pin(f())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(request);
            let hook = self.hook.lock().unwrap().as_ref().map(|f| f());
            if let Some(hook) = hook {
                hook.await;
            }
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: r#"{"ticket": "T-1"}"#.to_string(),
                })
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn api_step(name: &str, next: &str, prev: &str, terminal: bool) -> PipelineStep {
    PipelineStep {
        name: name.to_string(),
        kind: StepKind::Api,
        parameters: HashMap::from([(
            "url".to_string(),
            json!(format!("https://svc.test/{name}")),
        )]),
        next_name: next.to_string(),
        prev_name: prev.to_string(),
        is_terminal: terminal,
    }
}

pub fn gate_step(name: &str, next: &str, prev: &str, terminal: bool) -> PipelineStep {
    PipelineStep {
        name: name.to_string(),
        kind: StepKind::WaitForApproval,
        parameters: HashMap::new(),
        next_name: next.to_string(),
        prev_name: prev.to_string(),
        is_terminal: terminal,
    }
}

fn pipeline(name: &str, first: &str, steps: Vec<PipelineStep>) -> PipelineDefinition {
    PipelineDefinition {
        id: Uuid::now_v7(),
        version: 1,
        name: name.to_string(),
        description: None,
        first_step_name: first.to_string(),
        steps,
        form_schema: FormSchema {
            fields: vec![FormField {
                name: "env".to_string(),
                field_type: FieldType::Dropdown,
                required: false,
                allowed_values: vec!["staging".to_string(), "prod".to_string()],
            }],
        },
        created_on: Utc::now(),
    }
}

/// `s1 -> s2 (terminal)`, both API steps.
pub fn two_step_pipeline() -> PipelineDefinition {
    pipeline(
        "two-step",
        "s1",
        vec![api_step("s1", "s2", "", false), api_step("s2", "", "s1", true)],
    )
}

/// `prepare -> gate -> apply (terminal)`. `apply` posts the ticket that
/// `prepare` returned.
pub fn gated_pipeline() -> PipelineDefinition {
    let mut apply = api_step("apply", "", "gate", true);
    apply.parameters.insert("method".to_string(), json!("POST"));
    apply
        .parameters
        .insert("body".to_string(), json!({"ticket": "${steps.prepare.body.ticket}"}));
    pipeline(
        "gated",
        "prepare",
        vec![
            api_step("prepare", "gate", "", false),
            gate_step("gate", "apply", "prepare", false),
            apply,
        ],
    )
}

/// `prepare -> gate -> apply -> final-gate (terminal)`.
pub fn double_gated_pipeline() -> PipelineDefinition {
    let mut def = gated_pipeline();
    def.name = "double-gated".to_string();
    def.steps[2].is_terminal = false;
    def.steps[2].next_name = "final-gate".to_string();
    def.steps.push(gate_step("final-gate", "", "apply", true));
    def
}

pub fn sample_request(pipeline: &PipelineDefinition) -> ServiceRequest {
    ServiceRequest::new(pipeline.id, pipeline.version, HashMap::new())
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub type TestCoordinator = ExecutionCoordinator<
    InMemoryPipelineRepository,
    InMemoryServiceRequestRepository,
    InMemoryStepLogRepository,
>;

/// A coordinator wired to in-memory stores and a scripted HTTP client.
pub struct Harness {
    pub pipelines: Arc<InMemoryPipelineRepository>,
    pub requests: Arc<InMemoryServiceRequestRepository>,
    pub step_logs: Arc<InMemoryStepLogRepository>,
    pub http: Arc<ScriptedHttpClient>,
    pub bus: EventBus,
    pub coordinator: Arc<TestCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_bus_capacity(256)
    }

    pub fn with_bus_capacity(capacity: usize) -> Self {
        let pipelines = Arc::new(InMemoryPipelineRepository::default());
        let requests = Arc::new(InMemoryServiceRequestRepository::default());
        let step_logs = Arc::new(InMemoryStepLogRepository::default());
        let http = Arc::new(ScriptedHttpClient::new());
        let bus = EventBus::new(capacity);
        let registry = ExecutorRegistry::with_defaults(http.clone()).unwrap();
        let coordinator = Arc::new(ExecutionCoordinator::new(
            Arc::clone(&pipelines),
            Arc::clone(&requests),
            Arc::clone(&step_logs),
            Arc::new(registry),
            bus.clone(),
        ));
        Self {
            pipelines,
            requests,
            step_logs,
            http,
            bus,
            coordinator,
        }
    }

    /// Persist a pipeline and hand it back.
    pub async fn store(&self, def: PipelineDefinition) -> PipelineDefinition {
        self.pipelines.create(&def).await.unwrap();
        def
    }
}

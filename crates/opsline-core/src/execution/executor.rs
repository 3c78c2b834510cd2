//! Step executors, one per step kind.
//!
//! `StepExecutor::execute` either completes a step with a JSON result or
//! suspends the run. Executors are stateless; everything they need comes from
//! the `ExecutionContext` and the handles they were built with.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use opsline_types::pipeline::StepKind;
use serde_json::{json, Value};

use super::context::ExecutionContext;
use super::http::{HttpClient, HttpRequest};
use super::template::{resolve_value, TemplateError};

// ---------------------------------------------------------------------------
// StepOutcome / ExecutionError
// ---------------------------------------------------------------------------

/// Result of running one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step finished; the value is available to later steps.
    Completed(Value),
    /// The run must pause here until an external decision arrives.
    Suspended,
}

/// Errors that fail a service request. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("step '{step}': {source}")]
    UnresolvedPlaceholder {
        step: String,
        #[source]
        source: TemplateError,
    },

    #[error("step '{step}': invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        step: String,
        parameter: String,
        reason: String,
    },

    #[error("step '{step}': {reason}")]
    Transport { step: String, reason: String },

    #[error("step '{step}': unexpected HTTP status {status}")]
    UnexpectedStatus {
        step: String,
        status: u16,
        body: String,
    },

    #[error("no executor registered for step kind '{kind}'")]
    MissingExecutor { kind: String },

    #[error("step '{step}' not found in pipeline")]
    StepNotFound { step: String },
}

// ---------------------------------------------------------------------------
// StepExecutor trait
// ---------------------------------------------------------------------------

/// Executes the context's current step.
///
/// Returns boxed futures so the registry can store `Arc<dyn StepExecutor>`.
pub trait StepExecutor: Send + Sync {
    /// The step kind this executor handles.
    fn kind(&self) -> StepKind;

    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutcome, ExecutionError>> + Send + 'a>>;
}

// ---------------------------------------------------------------------------
// ApiStepExecutor
// ---------------------------------------------------------------------------

/// Issues one HTTP call described by the step's parameters.
///
/// Parameters: `url` (required), `method` (default GET), `headers` (object of
/// strings), `body` (any JSON). All values are placeholder-resolved first.
pub struct ApiStepExecutor {
    http: Arc<dyn HttpClient>,
}

impl ApiStepExecutor {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    fn build_request(
        step: &str,
        params: &HashMap<String, Value>,
    ) -> Result<HttpRequest, ExecutionError> {
        let invalid = |parameter: &str, reason: &str| ExecutionError::InvalidParameter {
            step: step.to_string(),
            parameter: parameter.to_string(),
            reason: reason.to_string(),
        };

        let method = match params.get("method") {
            None | Some(Value::Null) => "GET".to_string(),
            Some(Value::String(m)) if !m.trim().is_empty() => m.trim().to_ascii_uppercase(),
            Some(_) => return Err(invalid("method", "must be a non-empty string")),
        };

        let url = match params.get("url") {
            Some(Value::String(u)) if !u.trim().is_empty() => u.trim().to_string(),
            Some(_) => return Err(invalid("url", "must be a non-empty string")),
            None => return Err(invalid("url", "is required")),
        };

        let mut headers = HashMap::new();
        match params.get("headers") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    let Value::String(v) = value else {
                        return Err(invalid("headers", "values must be strings"));
                    };
                    headers.insert(name.clone(), v.clone());
                }
            }
            Some(_) => return Err(invalid("headers", "must be an object")),
        }

        let body = params.get("body").filter(|b| !b.is_null()).cloned();

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }
}

impl StepExecutor for ApiStepExecutor {
    fn kind(&self) -> StepKind {
        StepKind::Api
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutcome, ExecutionError>> + Send + 'a>> {
        Box::pin(async move {
            let step = ctx
                .current_step()
                .ok_or_else(|| ExecutionError::StepNotFound {
                    step: ctx.current_step.clone(),
                })?;

            let mut params = HashMap::with_capacity(step.parameters.len());
            for (key, value) in &step.parameters {
                let resolved = resolve_value(value, ctx).map_err(|source| {
                    ExecutionError::UnresolvedPlaceholder {
                        step: step.name.clone(),
                        source,
                    }
                })?;
                params.insert(key.clone(), resolved);
            }

            let request = Self::build_request(&step.name, &params)?;
            let method = request.method.clone();
            let url = request.url.clone();

            let response = self.http.send(request).await.map_err(|e| {
                ExecutionError::Transport {
                    step: step.name.clone(),
                    reason: e.to_string(),
                }
            })?;

            tracing::info!(
                request_id = %ctx.request.id,
                step = step.name.as_str(),
                method = method.as_str(),
                url = url.as_str(),
                status = response.status,
                "API step call returned"
            );

            if !response.is_success() {
                return Err(ExecutionError::UnexpectedStatus {
                    step: step.name.clone(),
                    status: response.status,
                    body: response.body,
                });
            }

            let body = serde_json::from_str::<Value>(&response.body)
                .unwrap_or(Value::String(response.body));

            Ok(StepOutcome::Completed(json!({
                "status": response.status,
                "headers": response.headers,
                "body": body,
            })))
        })
    }
}

// ---------------------------------------------------------------------------
// WaitForApprovalStepExecutor
// ---------------------------------------------------------------------------

/// Approval gate. Always suspends; the coordinator resumes the run when an
/// approval names this exact request and step.
pub struct WaitForApprovalStepExecutor;

impl StepExecutor for WaitForApprovalStepExecutor {
    fn kind(&self) -> StepKind {
        StepKind::WaitForApproval
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutcome, ExecutionError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::debug!(
                request_id = %ctx.request.id,
                step = ctx.current_step.as_str(),
                "approval gate reached"
            );
            Ok(StepOutcome::Suspended)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

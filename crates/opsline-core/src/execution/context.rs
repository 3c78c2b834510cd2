//! Execution context for a single service request run.
//!
//! Rebuilt from persisted state on every start and resume; never held across
//! a suspension.

use std::collections::HashMap;
use std::sync::Arc;

use opsline_types::pipeline::{PipelineDefinition, PipelineStep};
use opsline_types::request::ServiceRequest;
use serde_json::Value;

/// Everything a step executor can see while running.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The pipeline version the request was submitted against.
    pub pipeline: Arc<PipelineDefinition>,
    /// The owning service request.
    pub request: ServiceRequest,
    /// Name of the step being executed.
    pub current_step: String,
    /// Results of steps completed so far, keyed by step name.
    pub results: HashMap<String, Value>,
}

impl ExecutionContext {
    /// A context positioned at the pipeline's first step with no results.
    pub fn new(pipeline: Arc<PipelineDefinition>, request: ServiceRequest) -> Self {
        let current_step = pipeline.first_step_name.clone();
        Self {
            pipeline,
            request,
            current_step,
            results: HashMap::new(),
        }
    }

    /// Replace the accumulated results (used on resume).
    pub fn with_results(mut self, results: HashMap<String, Value>) -> Self {
        self.results = results;
        self
    }

    /// The step definition for `current_step`.
    pub fn current_step(&self) -> Option<&PipelineStep> {
        self.pipeline.step(&self.current_step)
    }

    pub fn record_result(&mut self, step_name: &str, result: Value) {
        self.results.insert(step_name.to_string(), result);
    }

    pub fn result(&self, step_name: &str) -> Option<&Value> {
        self.results.get(step_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_request, two_step_pipeline};
    use serde_json::json;

    #[test]
    fn new_context_starts_at_first_step() {
        let pipeline = Arc::new(two_step_pipeline());
        let ctx = ExecutionContext::new(Arc::clone(&pipeline), sample_request(&pipeline));
        assert_eq!(ctx.current_step, "s1");
        assert_eq!(ctx.current_step().map(|s| s.name.as_str()), Some("s1"));
        assert!(ctx.results.is_empty());
    }

    #[test]
    fn record_and_read_results() {
        let pipeline = Arc::new(two_step_pipeline());
        let mut ctx = ExecutionContext::new(Arc::clone(&pipeline), sample_request(&pipeline));
        ctx.record_result("s1", json!({"status": 200}));
        assert_eq!(ctx.result("s1"), Some(&json!({"status": 200})));
        assert!(ctx.result("s2").is_none());

        ctx.current_step = "nope".to_string();
        assert!(ctx.current_step().is_none());
    }
}

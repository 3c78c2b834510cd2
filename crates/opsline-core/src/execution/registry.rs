//! Step kind to executor table, built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use opsline_types::pipeline::StepKind;

use super::executor::{ApiStepExecutor, StepExecutor, WaitForApprovalStepExecutor};
use super::http::HttpClient;

/// Fatal configuration errors from building a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no executor registered for step kind '{0}'")]
    MissingExecutor(StepKind),

    #[error("more than one executor registered for step kind '{0}'")]
    DuplicateExecutor(StepKind),
}

/// Immutable map from step kind to its executor.
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<StepKind, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::default()
    }

    /// The standard registry: API steps over `http`, approval gates.
    pub fn with_defaults(http: Arc<dyn HttpClient>) -> Result<Self, RegistryError> {
        Self::builder()
            .register(Arc::new(ApiStepExecutor::new(http)))
            .register(Arc::new(WaitForApprovalStepExecutor))
            .build()
    }

    pub fn get(&self, kind: &StepKind) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &StepKind> {
        self.executors.keys()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.executors.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

#[derive(Default)]
pub struct ExecutorRegistryBuilder {
    executors: HashMap<StepKind, Arc<dyn StepExecutor>>,
    duplicate: Option<StepKind>,
}

impl ExecutorRegistryBuilder {
    /// Register an executor under its own `kind()`.
    pub fn register(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        let kind = executor.kind();
        if self.executors.insert(kind.clone(), executor).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(kind);
        }
        self
    }

    /// Finish the registry. Every known step kind must be covered exactly once.
    pub fn build(self) -> Result<ExecutorRegistry, RegistryError> {
        if let Some(kind) = self.duplicate {
            return Err(RegistryError::DuplicateExecutor(kind));
        }
        for kind in StepKind::KNOWN {
            if !self.executors.contains_key(&kind) {
                return Err(RegistryError::MissingExecutor(kind));
            }
        }
        Ok(ExecutorRegistry {
            executors: self.executors,
        })
    }
}

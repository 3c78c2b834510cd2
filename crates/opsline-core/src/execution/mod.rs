//! Pipeline execution engine.
//!
//! - `context` -- transient per-run state (pipeline, request, step results)
//! - `template` -- `${token}` placeholder resolution
//! - `http` -- outbound HTTP port used by API steps
//! - `executor` -- the `StepExecutor` trait and its API / approval variants
//! - `registry` -- step kind to executor table built at startup
//! - `checkpoint` -- step log writer and resume helpers
//! - `coordinator` -- the service request state machine

pub mod checkpoint;
pub mod context;
pub mod coordinator;
pub mod executor;
pub mod http;
pub mod registry;
pub mod template;

pub use context::ExecutionContext;
pub use coordinator::{CoordinatorError, ExecutionCoordinator, ExecutionReport};
pub use executor::{ExecutionError, StepExecutor, StepOutcome};
pub use registry::{ExecutorRegistry, RegistryError};

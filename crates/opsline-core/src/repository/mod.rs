//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (opsline-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod pipeline;
pub mod service_request;
pub mod step_log;

pub use pipeline::PipelineRepository;
pub use service_request::ServiceRequestRepository;
pub use step_log::StepLogRepository;

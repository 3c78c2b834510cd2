//! Business logic services (use cases).
//!
//! Services orchestrate repository calls, validation and event publication.
//! They depend on traits (ports) -- never on concrete infrastructure
//! implementations.

pub mod pipeline;
pub mod request;

use opsline_types::error::{RepositoryError, ValidationError};
use uuid::Uuid;

pub use pipeline::PipelineService;
pub use request::ServiceRequestService;

/// Errors returned by the service layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("pipeline not found: {0}")]
    PipelineNotFound(Uuid),

    #[error("pipeline {id} has no version {version}")]
    PipelineVersionNotFound { id: Uuid, version: u32 },

    #[error("service request not found: {0}")]
    RequestNotFound(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

//! Pipeline repository trait definition.

use opsline_types::error::RepositoryError;
use opsline_types::pipeline::PipelineDefinition;
use uuid::Uuid;

/// Repository trait for versioned pipeline definitions.
///
/// Each `(id, version)` pair is written once and never modified; a revision
/// is a new row under the same `id`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait PipelineRepository: Send + Sync {
    /// Store a pipeline version. Fails with `Conflict` if `(id, version)` exists.
    fn create(
        &self,
        def: &PipelineDefinition,
    ) -> impl std::future::Future<Output = Result<Uuid, RepositoryError>> + Send;

    /// Get one version of a pipeline.
    fn get(
        &self,
        id: &Uuid,
        version: u32,
    ) -> impl std::future::Future<Output = Result<Option<PipelineDefinition>, RepositoryError>> + Send;

    /// Highest stored version number for a pipeline, if any.
    fn latest_version(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<u32>, RepositoryError>> + Send;

    /// The latest version of every pipeline, ordered by name.
    fn list_latest(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<PipelineDefinition>, RepositoryError>> + Send;
}

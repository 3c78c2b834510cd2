//! Pipeline management service.
//!
//! Every stored version passes `validate_pipeline` first. Versions are
//! immutable: `revise` writes a new row under the same id with the next
//! version number, so requests submitted against an older version keep
//! executing the definition they were submitted with.

use std::sync::Arc;

use chrono::Utc;
use opsline_types::pipeline::{PipelineDefinition, PipelineSummary};
use uuid::Uuid;

use crate::pipeline::validate_pipeline;
use crate::repository::pipeline::PipelineRepository;

use super::ServiceError;

pub struct PipelineService<P: PipelineRepository> {
    repo: Arc<P>,
}

impl<P: PipelineRepository> PipelineService<P> {
    pub fn new(repo: Arc<P>) -> Self {
        Self { repo }
    }

    /// Validate and store a new pipeline as version 1 under a fresh id.
    ///
    /// Any `id`, `version` or `created_on` on the input is overwritten.
    pub async fn create(
        &self,
        mut def: PipelineDefinition,
    ) -> Result<PipelineDefinition, ServiceError> {
        validate_pipeline(&def)?;

        def.id = Uuid::now_v7();
        def.version = 1;
        def.created_on = Utc::now();
        self.repo.create(&def).await?;

        tracing::info!(
            pipeline_id = %def.id,
            name = %def.name,
            steps = def.steps.len(),
            "created pipeline"
        );
        Ok(def)
    }

    /// Validate and store `def` as the next version of pipeline `id`.
    pub async fn revise(
        &self,
        id: Uuid,
        mut def: PipelineDefinition,
    ) -> Result<PipelineDefinition, ServiceError> {
        validate_pipeline(&def)?;

        let latest = self
            .repo
            .latest_version(&id)
            .await?
            .ok_or(ServiceError::PipelineNotFound(id))?;

        def.id = id;
        def.version = latest + 1;
        def.created_on = Utc::now();
        self.repo.create(&def).await?;

        tracing::info!(
            pipeline_id = %id,
            version = def.version,
            "revised pipeline"
        );
        Ok(def)
    }

    /// Fetch a specific version, or the latest when `version` is `None`.
    pub async fn get(
        &self,
        id: Uuid,
        version: Option<u32>,
    ) -> Result<PipelineDefinition, ServiceError> {
        let version = match version {
            Some(v) => v,
            None => self
                .repo
                .latest_version(&id)
                .await?
                .ok_or(ServiceError::PipelineNotFound(id))?,
        };

        self.repo
            .get(&id, version)
            .await?
            .ok_or(ServiceError::PipelineVersionNotFound { id, version })
    }

    /// Summaries of the latest version of every pipeline, ordered by name.
    pub async fn list(&self) -> Result<Vec<PipelineSummary>, ServiceError> {
        let defs = self.repo.list_latest().await?;
        Ok(defs
            .into_iter()
            .map(|def| PipelineSummary {
                id: def.id,
                version: def.version,
                name: def.name,
                step_count: def.steps.len(),
                created_on: def.created_on,
            })
            .collect())
    }
}

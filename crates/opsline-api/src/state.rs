//! Application state wiring repositories and services together.
//!
//! Core services are generic over repository traits; `AppState` pins them to
//! the SQLite implementations from opsline-infra.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use opsline_core::execution::http::HttpClient;
use opsline_core::service::PipelineService;
use opsline_infra::config::{load_global_config, resolve_data_dir, resolve_database_url};
use opsline_infra::http::ReqwestHttpClient;
use opsline_infra::sqlite::{
    DatabasePool, SqlitePipelineRepository, SqliteServiceRequestRepository,
    SqliteStepLogRepository,
};
use opsline_types::config::GlobalConfig;

pub type ConcretePipelineService = PipelineService<SqlitePipelineRepository>;

/// Shared state for every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: GlobalConfig,
    pub pipelines: Arc<SqlitePipelineRepository>,
    pub requests: Arc<SqliteServiceRequestRepository>,
    pub step_logs: Arc<SqliteStepLogRepository>,
    pub pipeline_service: Arc<ConcretePipelineService>,
    pub http: Arc<dyn HttpClient>,
}

impl AppState {
    /// Resolve the data directory and configuration, then open the database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_global_config(&data_dir).await;
        Self::open(&data_dir, config).await
    }

    /// Wire state for an explicit data directory and configuration.
    pub async fn open(data_dir: &Path, config: GlobalConfig) -> anyhow::Result<Self> {
        let db_url = resolve_database_url(&config, data_dir);
        let db_pool = DatabasePool::new(&db_url).await?;
        let http = ReqwestHttpClient::new(&config.http)?;

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");
        Ok(Self::from_parts(data_dir, config, db_pool, Arc::new(http)))
    }

    pub fn from_parts(
        data_dir: &Path,
        config: GlobalConfig,
        db_pool: DatabasePool,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        let pipelines = Arc::new(SqlitePipelineRepository::new(db_pool.clone()));
        let requests = Arc::new(SqliteServiceRequestRepository::new(db_pool.clone()));
        let step_logs = Arc::new(SqliteStepLogRepository::new(db_pool));

        Self {
            data_dir: data_dir.to_path_buf(),
            config,
            pipeline_service: Arc::new(PipelineService::new(Arc::clone(&pipelines))),
            pipelines,
            requests,
            step_logs,
            http,
        }
    }
}

//! SQLite pipeline repository implementation.
//!
//! Each version is stored as a JSON document keyed by `(id, version)`. The
//! `name` column is duplicated out of the document for ordering.

use opsline_core::repository::pipeline::PipelineRepository;
use opsline_types::error::RepositoryError;
use opsline_types::pipeline::PipelineDefinition;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, query_error};

/// SQLite-backed implementation of `PipelineRepository`.
pub struct SqlitePipelineRepository {
    pool: DatabasePool,
}

impl SqlitePipelineRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct PipelineRow {
    definition: String,
}

impl PipelineRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            definition: row.try_get("definition")?,
        })
    }

    fn into_definition(self) -> Result<PipelineDefinition, RepositoryError> {
        serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid pipeline definition JSON: {e}")))
    }
}

impl PipelineRepository for SqlitePipelineRepository {
    async fn create(&self, def: &PipelineDefinition) -> Result<Uuid, RepositoryError> {
        let definition_json = serde_json::to_string(def)
            .map_err(|e| RepositoryError::Query(format!("serialize pipeline: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO pipelines (id, version, name, definition, created_on) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(def.id.to_string())
        .bind(def.version as i64)
        .bind(&def.name)
        .bind(&definition_json)
        .bind(format_datetime(&def.created_on))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(def.id),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                RepositoryError::Conflict(format!("pipeline {} already exists", def.reference())),
            ),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn get(
        &self,
        id: &Uuid,
        version: u32,
    ) -> Result<Option<PipelineDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM pipelines WHERE id = ? AND version = ?")
            .bind(id.to_string())
            .bind(version as i64)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = PipelineRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_definition()?))
            }
            None => Ok(None),
        }
    }

    async fn latest_version(&self, id: &Uuid) -> Result<Option<u32>, RepositoryError> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(version) FROM pipelines WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.0
            .map(|v| {
                u32::try_from(v)
                    .map_err(|_| RepositoryError::Query(format!("invalid pipeline version {v}")))
            })
            .transpose()
    }

    async fn list_latest(&self) -> Result<Vec<PipelineDefinition>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT p.definition FROM pipelines p
               JOIN (SELECT id, MAX(version) AS version FROM pipelines GROUP BY id) latest
                 ON p.id = latest.id AND p.version = latest.version
               ORDER BY p.name ASC, p.id ASC"#,
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut defs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = PipelineRow::from_row(row).map_err(query_error)?;
            defs.push(r.into_definition()?);
        }
        Ok(defs)
    }
}

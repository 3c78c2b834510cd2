//! SQLite step execution log repository implementation.
//!
//! Step logs are the checkpoint trail the coordinator resumes from, so
//! listing order matters: oldest first, ties broken by insertion order.

use chrono::Utc;
use opsline_core::repository::step_log::StepLogRepository;
use opsline_types::error::RepositoryError;
use opsline_types::request::{StepExecutionLog, StepExecutionStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `StepLogRepository`.
pub struct SqliteStepLogRepository {
    pool: DatabasePool,
}

impl SqliteStepLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct StepLogRow {
    id: String,
    request_id: String,
    step_name: String,
    status: String,
    output: Option<String>,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl StepLogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            step_name: row.try_get("step_name")?,
            status: row.try_get("status")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_log(self) -> Result<StepExecutionLog, RepositoryError> {
        let status = StepExecutionStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::Query(format!("invalid step status '{}'", self.status))
        })?;
        let output = self
            .output
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid step output JSON: {e}")))?;

        Ok(StepExecutionLog {
            id: parse_uuid(&self.id)?,
            request_id: parse_uuid(&self.request_id)?,
            step_name: self.step_name,
            status,
            output,
            error: self.error,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

fn to_json(value: Option<&serde_json::Value>) -> Result<Option<String>, RepositoryError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError::Query(e.to_string()))
}

impl StepLogRepository for SqliteStepLogRepository {
    async fn create_step_log(&self, log: &StepExecutionLog) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO step_executions
               (id, request_id, step_name, status, output, error, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.request_id.to_string())
        .bind(&log.step_name)
        .bind(log.status.as_str())
        .bind(to_json(log.output.as_ref())?)
        .bind(&log.error)
        .bind(format_datetime(&log.started_at))
        .bind(log.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn update_step_log(
        &self,
        log_id: &Uuid,
        status: StepExecutionStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let completed_at = match status {
            StepExecutionStatus::Running | StepExecutionStatus::WaitingApproval => None,
            _ => Some(format_datetime(&Utc::now())),
        };

        let result = sqlx::query(
            r#"UPDATE step_executions
               SET status = ?,
                   output = COALESCE(?, output),
                   error = COALESCE(?, error),
                   completed_at = COALESCE(?, completed_at)
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(to_json(output)?)
        .bind(error)
        .bind(&completed_at)
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn transition_step_log(
        &self,
        log_id: &Uuid,
        from: StepExecutionStatus,
        to: StepExecutionStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let completed_at = match to {
            StepExecutionStatus::Running | StepExecutionStatus::WaitingApproval => None,
            _ => Some(format_datetime(&Utc::now())),
        };

        let result = sqlx::query(
            r#"UPDATE step_executions
               SET status = ?,
                   output = COALESCE(?, output),
                   error = COALESCE(?, error),
                   completed_at = COALESCE(?, completed_at)
               WHERE id = ? AND status = ?"#,
        )
        .bind(to.as_str())
        .bind(to_json(output)?)
        .bind(error)
        .bind(&completed_at)
        .bind(log_id.to_string())
        .bind(from.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM step_executions WHERE id = ?")
            .bind(log_id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn list_step_logs(
        &self,
        request_id: &Uuid,
    ) -> Result<Vec<StepExecutionLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM step_executions WHERE request_id = ? ORDER BY started_at ASC, rowid ASC",
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepLogRow::from_row(row).map_err(query_error)?;
            logs.push(r.into_log()?);
        }
        Ok(logs)
    }
}

//! SQLite service request repository implementation.

use chrono::Utc;
use opsline_core::repository::service_request::ServiceRequestRepository;
use opsline_types::error::RepositoryError;
use opsline_types::form::FormData;
use opsline_types::request::{ServiceRequest, ServiceRequestPatch, ServiceRequestStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `ServiceRequestRepository`.
pub struct SqliteServiceRequestRepository {
    pool: DatabasePool,
}

impl SqliteServiceRequestRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM service_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(row.is_some())
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct ServiceRequestRow {
    id: String,
    pipeline_id: String,
    pipeline_version: i64,
    form_data: String,
    status: String,
    remarks: Option<String>,
    created_on: String,
    last_updated: String,
}

impl ServiceRequestRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            pipeline_id: row.try_get("pipeline_id")?,
            pipeline_version: row.try_get("pipeline_version")?,
            form_data: row.try_get("form_data")?,
            status: row.try_get("status")?,
            remarks: row.try_get("remarks")?,
            created_on: row.try_get("created_on")?,
            last_updated: row.try_get("last_updated")?,
        })
    }

    fn into_request(self) -> Result<ServiceRequest, RepositoryError> {
        let status = ServiceRequestStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::Query(format!("invalid request status '{}'", self.status))
        })?;
        let form_data: FormData = serde_json::from_str(&self.form_data)
            .map_err(|e| RepositoryError::Query(format!("invalid form data JSON: {e}")))?;
        let pipeline_version = u32::try_from(self.pipeline_version).map_err(|_| {
            RepositoryError::Query(format!("invalid pipeline version {}", self.pipeline_version))
        })?;

        Ok(ServiceRequest {
            id: parse_uuid(&self.id)?,
            pipeline_id: parse_uuid(&self.pipeline_id)?,
            pipeline_version,
            form_data,
            status,
            remarks: self.remarks,
            created_on: parse_datetime(&self.created_on)?,
            last_updated: parse_datetime(&self.last_updated)?,
        })
    }
}

// ---------------------------------------------------------------------------
// ServiceRequestRepository impl
// ---------------------------------------------------------------------------

impl ServiceRequestRepository for SqliteServiceRequestRepository {
    async fn create(&self, request: &ServiceRequest) -> Result<Uuid, RepositoryError> {
        let form_json = serde_json::to_string(&request.form_data)
            .map_err(|e| RepositoryError::Query(format!("serialize form data: {e}")))?;

        let result = sqlx::query(
            r#"INSERT INTO service_requests
               (id, pipeline_id, pipeline_version, form_data, status, remarks, created_on, last_updated)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(request.id.to_string())
        .bind(request.pipeline_id.to_string())
        .bind(request.pipeline_version as i64)
        .bind(&form_json)
        .bind(request.status.as_str())
        .bind(&request.remarks)
        .bind(format_datetime(&request.created_on))
        .bind(format_datetime(&request.last_updated))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(request.id),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                RepositoryError::Conflict(format!("service request {} already exists", request.id)),
            ),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn get(&self, id: &Uuid) -> Result<Option<ServiceRequest>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM service_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ServiceRequestRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_request()?))
            }
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        id: &Uuid,
        status: ServiceRequestStatus,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE service_requests SET status = ?, last_updated = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(format_datetime(&Utc::now()))
                .bind(id.to_string())
                .execute(&self.pool.writer)
                .await
                .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        id: &Uuid,
        from: ServiceRequestStatus,
        to: ServiceRequestStatus,
    ) -> Result<bool, RepositoryError> {
        self.transition_with_remarks(id, from, to, None).await
    }

    async fn transition_with_remarks(
        &self,
        id: &Uuid,
        from: ServiceRequestStatus,
        to: ServiceRequestStatus,
        remarks: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE service_requests
               SET status = ?,
                   remarks = COALESCE(?, remarks),
                   last_updated = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(to.as_str())
        .bind(remarks)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn update_fields(
        &self,
        id: &Uuid,
        patch: &ServiceRequestPatch,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE service_requests
               SET status = COALESCE(?, status),
                   remarks = COALESCE(?, remarks),
                   last_updated = ?
               WHERE id = ?"#,
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(&patch.remarks)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, limit: u32) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM service_requests ORDER BY created_on DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ServiceRequestRow::from_row(row).map_err(query_error)?;
            requests.push(r.into_request()?);
        }
        Ok(requests)
    }
}

//! Service request repository trait definition.

use opsline_types::error::RepositoryError;
use opsline_types::request::{ServiceRequest, ServiceRequestPatch, ServiceRequestStatus};
use uuid::Uuid;

/// Repository trait for service requests.
///
/// Every mutation refreshes `last_updated`. Updates to an unknown ID fail
/// with `RepositoryError::NotFound`.
pub trait ServiceRequestRepository: Send + Sync {
    /// Insert a new service request.
    fn create(
        &self,
        request: &ServiceRequest,
    ) -> impl std::future::Future<Output = Result<Uuid, RepositoryError>> + Send;

    /// Get a service request by its UUID.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ServiceRequest>, RepositoryError>> + Send;

    /// Unconditionally set the status.
    fn update_status(
        &self,
        id: &Uuid,
        status: ServiceRequestStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Set the status to `to` only if it currently is `from`.
    ///
    /// Returns `true` if the update happened. This is the compare-and-set
    /// that serializes competing transitions.
    fn transition_status(
        &self,
        id: &Uuid,
        from: ServiceRequestStatus,
        to: ServiceRequestStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// `transition_status` that also sets `remarks` (when given) in the same
    /// write, so a final status never lands without its cause.
    fn transition_with_remarks(
        &self,
        id: &Uuid,
        from: ServiceRequestStatus,
        to: ServiceRequestStatus,
        remarks: Option<&str>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Apply a partial update.
    fn update_fields(
        &self,
        id: &Uuid,
        patch: &ServiceRequestPatch,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Most recently created requests first.
    fn list(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ServiceRequest>, RepositoryError>> + Send;
}

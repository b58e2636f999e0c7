//! Role-scoped, paginated reads over the lifecycle tables and profiles.
//!
//! | Table        | admin | store            | lab                |
//! |--------------|-------|------------------|--------------------|
//! | devices      | all   | all              | all                |
//! | warranties   | all   | issued by caller | all                |
//! | repairs      | all   | forbidden        | assigned to caller |
//! | replacements | all   | filed by caller  | filed by caller    |
//! | profiles     | all   | forbidden        | forbidden          |

use repairhub_auth::gate::Caller;
use repairhub_core::error::HubResult;
use repairhub_core::models::audit::AuditLogEntry;
use repairhub_core::models::device::Device;
use repairhub_core::models::profile::{Profile, Role};
use repairhub_core::models::repair::Repair;
use repairhub_core::models::replacement::ReplacementRequest;
use repairhub_core::models::warranty::Warranty;
use repairhub_core::query::{
    DeviceFilter, PaginatedResult, Pagination, ProfileFilter, RepairFilter, ReplacementFilter,
    RowScope, WarrantyFilter,
};
use repairhub_core::repository::{
    AuditLogRepository, DeviceRepository, ProfileStore, RepairRepository, ReplacementRepository,
    WarrantyRepository,
};
use uuid::Uuid;

use crate::stores::LifecycleStores;

pub struct QueryGateway<S, P, A> {
    stores: S,
    profiles: P,
    audit: A,
}

impl<S, P, A> QueryGateway<S, P, A>
where
    S: LifecycleStores,
    P: ProfileStore,
    A: AuditLogRepository,
{
    pub fn new(stores: S, profiles: P, audit: A) -> Self {
        Self {
            stores,
            profiles,
            audit,
        }
    }

    pub async fn list_devices(
        &self,
        _caller: &Caller,
        filter: DeviceFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Device>> {
        self.stores.devices().list(filter, pagination).await
    }

    pub async fn find_device_by_imei(
        &self,
        _caller: &Caller,
        imei: &str,
    ) -> HubResult<Option<Device>> {
        self.stores.devices().find_by_imei(imei.trim()).await
    }

    pub async fn list_warranties(
        &self,
        caller: &Caller,
        filter: WarrantyFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Warranty>> {
        let scope = match caller.role {
            Role::Store => RowScope::OwnedBy(caller.identity_id),
            Role::Admin | Role::Lab => RowScope::All,
        };
        self.stores.warranties().list(scope, filter, pagination).await
    }

    pub async fn list_repairs(
        &self,
        caller: &Caller,
        filter: RepairFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Repair>> {
        caller.require(&[Role::Admin, Role::Lab])?;
        let scope = RowScope::for_caller(caller.identity_id, caller.role);
        self.stores.repairs().list(scope, filter, pagination).await
    }

    pub async fn list_replacement_requests(
        &self,
        caller: &Caller,
        filter: ReplacementFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<ReplacementRequest>> {
        let scope = RowScope::for_caller(caller.identity_id, caller.role);
        self.stores
            .replacements()
            .list(scope, filter, pagination)
            .await
    }

    pub async fn list_profiles(
        &self,
        caller: &Caller,
        filter: ProfileFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Profile>> {
        caller.require(&[Role::Admin])?;
        self.profiles.list(RowScope::All, filter, pagination).await
    }

    /// The caller's own profile row.
    pub async fn own_profile(&self, caller: &Caller) -> HubResult<Option<Profile>> {
        self.profiles.get(caller.identity_id).await
    }

    pub async fn audit_trail(
        &self,
        caller: &Caller,
        entity_type: &str,
        entity_id: Uuid,
    ) -> HubResult<Vec<AuditLogEntry>> {
        caller.require(&[Role::Admin])?;
        self.audit.list_for_entity(entity_type, entity_id).await
    }
}

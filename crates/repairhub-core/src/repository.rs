//! Collaborator and repository trait definitions.
//!
//! All operations are async. The [`Directory`] and [`ProfileStore`] are
//! the two independently-failable identity systems; the remaining
//! repositories back the lifecycle tables. Composite writes documented
//! as atomic must either fully apply or leave no trace.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::HubResult;
use crate::models::{
    audit::{AuditLogEntry, CreateAuditLogEntry},
    device::{CreateDevice, Device, WarrantyStatus},
    identity::{CreateIdentity, Identity},
    payment::{CreateLabPayment, LabPayment, LabTotals},
    pricing::{CreateRepairType, LabRepairPrice, RepairType, SetLabRepairPrice, UpdateRepairType},
    profile::{Profile, UpdateProfile, UpsertProfile},
    repair::{CreateRepair, Repair, RepairStatus, RepairStatusChange},
    replacement::{CreateReplacementRequest, ReplacementRequest, ResolveReplacement},
    warranty::{ActivateWarranty, Warranty},
};
use crate::query::{
    DeviceFilter, PaginatedResult, Pagination, ProfileFilter, RepairFilter, ReplacementFilter,
    RowScope, WarrantyFilter,
};

// ---------------------------------------------------------------------------
// Identity systems
// ---------------------------------------------------------------------------

/// External system of record for credentials and identity ids.
pub trait Directory: Send + Sync {
    fn create_identity(
        &self,
        input: CreateIdentity,
    ) -> impl Future<Output = HubResult<Identity>> + Send;
    fn get_identity(&self, id: Uuid) -> impl Future<Output = HubResult<Identity>> + Send;
    fn find_by_email(&self, email: &str) -> impl Future<Output = HubResult<Identity>> + Send;
    /// Deleting an identity deletes the profile with the same id in the
    /// same operation. Either both rows are gone afterwards or neither is.
    fn delete_identity(&self, id: Uuid) -> impl Future<Output = HubResult<()>> + Send;
    /// Replace the credential and mark it confirmed.
    fn update_credential(
        &self,
        id: Uuid,
        new_password: &str,
    ) -> impl Future<Output = HubResult<()>> + Send;
}

/// Keyed table of [`Profile`] rows addressed by identity id.
pub trait ProfileStore: Send + Sync {
    fn get(&self, id: Uuid) -> impl Future<Output = HubResult<Option<Profile>>> + Send;
    /// Insert or overwrite on `id` conflict.
    fn upsert(&self, input: UpsertProfile) -> impl Future<Output = HubResult<Profile>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateProfile,
    ) -> impl Future<Output = HubResult<Profile>> + Send;
    /// Bump `updated_at` only.
    fn touch(&self, id: Uuid) -> impl Future<Output = HubResult<()>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = HubResult<()>> + Send;
    /// `RowScope::OwnedBy` restricts the listing to the caller's own row.
    fn list(
        &self,
        scope: RowScope,
        filter: ProfileFilter,
        pagination: Pagination,
    ) -> impl Future<Output = HubResult<PaginatedResult<Profile>>> + Send;
}

// ---------------------------------------------------------------------------
// Lifecycle tables
// ---------------------------------------------------------------------------

pub trait DeviceRepository: Send + Sync {
    fn create(&self, input: CreateDevice) -> impl Future<Output = HubResult<Device>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HubResult<Device>> + Send;
    fn find_by_imei(&self, imei: &str)
    -> impl Future<Output = HubResult<Option<Device>>> + Send;
    /// Compare-and-set on `warranty_status`. Returns `false` without
    /// writing when the device is no longer in `expected`.
    fn transition_status(
        &self,
        id: Uuid,
        expected: WarrantyStatus,
        target: WarrantyStatus,
    ) -> impl Future<Output = HubResult<bool>> + Send;
    fn list(
        &self,
        filter: DeviceFilter,
        pagination: Pagination,
    ) -> impl Future<Output = HubResult<PaginatedResult<Device>>> + Send;
}

pub trait WarrantyRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HubResult<Warranty>> + Send;
    fn find_active_for_device(
        &self,
        device_id: Uuid,
    ) -> impl Future<Output = HubResult<Option<Warranty>>> + Send;
    /// Atomic: insert the warranty and move the device `new -> active`.
    /// Fails with `Conflict(AlreadyActive)` if the device is not `new`.
    fn activate(&self, input: ActivateWarranty)
    -> impl Future<Output = HubResult<Warranty>> + Send;
    /// Active warranties of `active` devices whose expiry is at or
    /// before `now`.
    fn list_lapsed(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = HubResult<Vec<Warranty>>> + Send;
    /// `RowScope::OwnedBy` restricts to warranties issued by that store.
    fn list(
        &self,
        scope: RowScope,
        filter: WarrantyFilter,
        pagination: Pagination,
    ) -> impl Future<Output = HubResult<PaginatedResult<Warranty>>> + Send;
}

pub trait RepairRepository: Send + Sync {
    fn create(&self, input: CreateRepair) -> impl Future<Output = HubResult<Repair>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HubResult<Repair>> + Send;
    /// Compare-and-set on `status`. Returns `None` without writing when
    /// the repair is no longer in `expected`.
    fn update_status(
        &self,
        id: Uuid,
        expected: RepairStatus,
        change: RepairStatusChange,
    ) -> impl Future<Output = HubResult<Option<Repair>>> + Send;
    /// Set or clear the repair type. Returns `None` without writing when
    /// the repair is no longer open.
    fn set_repair_type(
        &self,
        id: Uuid,
        repair_type_id: Option<Uuid>,
    ) -> impl Future<Output = HubResult<Option<Repair>>> + Send;
    /// Sum of `cost` and count over the lab's `completed` repairs.
    /// Completed repairs without a cost count with zero.
    fn completed_totals(&self, lab_id: Uuid) -> impl Future<Output = HubResult<LabTotals>> + Send;
    /// `RowScope::OwnedBy` restricts to repairs assigned to that lab.
    fn list(
        &self,
        scope: RowScope,
        filter: RepairFilter,
        pagination: Pagination,
    ) -> impl Future<Output = HubResult<PaginatedResult<Repair>>> + Send;
}

pub trait ReplacementRepository: Send + Sync {
    /// Atomic: insert a `pending` request and, when it references a
    /// repair, move that repair to `replacement_requested`.
    fn create(
        &self,
        input: CreateReplacementRequest,
    ) -> impl Future<Output = HubResult<ReplacementRequest>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HubResult<ReplacementRequest>> + Send;
    fn find_by_repair(
        &self,
        repair_id: Uuid,
    ) -> impl Future<Output = HubResult<Option<ReplacementRequest>>> + Send;
    /// Atomic: record the decision on a `pending` request and apply the
    /// device/warranty side effects named in `input`. Fails with
    /// `Conflict(AlreadyResolved)` if the request is not pending.
    fn resolve(
        &self,
        input: ResolveReplacement,
    ) -> impl Future<Output = HubResult<ReplacementRequest>> + Send;
    /// `RowScope::OwnedBy` restricts to requests filed by that caller.
    fn list(
        &self,
        scope: RowScope,
        filter: ReplacementFilter,
        pagination: Pagination,
    ) -> impl Future<Output = HubResult<PaginatedResult<ReplacementRequest>>> + Send;
}

// ---------------------------------------------------------------------------
// Pricing and payments
// ---------------------------------------------------------------------------

pub trait RepairTypeRepository: Send + Sync {
    /// Fails with `Conflict(Duplicate)` when the name is taken.
    fn create(&self, input: CreateRepairType)
    -> impl Future<Output = HubResult<RepairType>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HubResult<RepairType>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateRepairType,
    ) -> impl Future<Output = HubResult<RepairType>> + Send;
    /// Atomic: delete the type together with every lab price for it.
    fn delete(&self, id: Uuid) -> impl Future<Output = HubResult<()>> + Send;
    /// Ordered by name.
    fn list(&self, active_only: bool) -> impl Future<Output = HubResult<Vec<RepairType>>> + Send;
}

pub trait LabPriceRepository: Send + Sync {
    /// Insert or overwrite on (`lab_id`, `repair_type_id`).
    fn upsert(
        &self,
        input: SetLabRepairPrice,
    ) -> impl Future<Output = HubResult<LabRepairPrice>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = HubResult<LabRepairPrice>> + Send;
    fn find(
        &self,
        lab_id: Uuid,
        repair_type_id: Uuid,
    ) -> impl Future<Output = HubResult<Option<LabRepairPrice>>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = HubResult<()>> + Send;
    /// Newest first.
    fn list_for_lab(
        &self,
        lab_id: Uuid,
    ) -> impl Future<Output = HubResult<Vec<LabRepairPrice>>> + Send;
}

/// Append-only record of money paid out to labs.
pub trait LabPaymentRepository: Send + Sync {
    fn create(&self, input: CreateLabPayment)
    -> impl Future<Output = HubResult<LabPayment>> + Send;
    /// Newest `payment_date` first.
    fn list_for_lab(
        &self,
        lab_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = HubResult<PaginatedResult<LabPayment>>> + Send;
    fn totals(&self, lab_id: Uuid) -> impl Future<Output = HubResult<LabTotals>> + Send;
}

/// Append-only audit trail.
pub trait AuditLogRepository: Send + Sync {
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = HubResult<AuditLogEntry>> + Send;
    fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> impl Future<Output = HubResult<Vec<AuditLogEntry>>> + Send;
}

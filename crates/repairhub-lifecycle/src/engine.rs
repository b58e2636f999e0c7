//! The lifecycle engine: role-gated transitions over devices,
//! warranties, repairs and replacement requests.
//!
//! Every operation validates its inputs and the current state before it
//! writes. Composite transitions (activation, filing a replacement,
//! resolving one) are single atomic repository writes; a rejected
//! transition leaves no trace. Each successful write is audited and
//! published on the change feed.

use chrono::{DateTime, Months, Utc};
use repairhub_auth::gate::Caller;
use repairhub_core::error::{ConflictKind, ForbiddenReason, HubError, HubResult};
use repairhub_core::models::audit::CreateAuditLogEntry;
use repairhub_core::models::change::{ChangeEvent, LifecycleTable};
use repairhub_core::models::device::{CreateDevice, Device, WarrantyStatus};
use repairhub_core::models::profile::{Profile, Role};
use repairhub_core::models::repair::{
    CreateRepair, FaultType, Repair, RepairStatus, RepairStatusChange,
};
use repairhub_core::models::replacement::{
    CreateReplacementRequest, Decision, ReplacementRequest, RequestStatus, ResolveReplacement,
};
use repairhub_core::models::warranty::{ActivateWarranty, Customer, Warranty};
use repairhub_core::repository::{
    AuditLogRepository, DeviceRepository, LabPriceRepository, ProfileStore, RepairRepository,
    RepairTypeRepository, ReplacementRepository, WarrantyRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::feed::ChangeFeed;
use crate::stores::LifecycleStores;

/// Actor recorded for transitions the system performs on its own.
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

/// Attempts at a compare-and-set transition before giving up.
const CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateWarrantyInput {
    pub device_id: Uuid,
    pub customer: Customer,
    /// Defaults to the device's `warranty_months`.
    pub duration_months: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRepairInput {
    pub device_id: Uuid,
    pub fault_type: FaultType,
    pub fault_description: Option<String>,
    /// Required when an admin opens the repair; a lab caller is always
    /// the repair's lab.
    pub lab_id: Option<Uuid>,
}

/// Result of resolving a replacement request. On approval the replaced
/// device and the deactivated warranty are returned as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementOutcome {
    pub request: ReplacementRequest,
    pub device: Option<Device>,
    pub warranty: Option<Warranty>,
}

pub struct LifecycleEngine<S, P, A> {
    stores: S,
    profiles: P,
    audit: A,
    feed: ChangeFeed,
}

impl<S, P, A> LifecycleEngine<S, P, A>
where
    S: LifecycleStores,
    P: ProfileStore,
    A: AuditLogRepository,
{
    pub fn new(stores: S, profiles: P, audit: A, feed: ChangeFeed) -> Self {
        Self {
            stores,
            profiles,
            audit,
            feed,
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    // -----------------------------------------------------------------------
    // Devices and warranties
    // -----------------------------------------------------------------------

    /// Intake a device in state `new`.
    pub async fn register_device(&self, caller: &Caller, input: CreateDevice) -> HubResult<Device> {
        caller.require(&[Role::Admin])?;
        input.validate()?;

        let devices = self.stores.devices();
        for imei in std::iter::once(&input.imei).chain(input.imei2.as_ref()) {
            if devices.find_by_imei(imei).await?.is_some() {
                return Err(HubError::conflict(
                    ConflictKind::Duplicate,
                    format!("IMEI {imei} is already registered"),
                ));
            }
        }

        let device = devices.create(input).await?;
        info!(device_id = %device.id, imei = %device.imei, "device registered");
        self.record(
            caller.identity_id,
            "device.registered",
            "device",
            device.id,
            json!({ "imei": device.imei, "model": device.model }),
        )
        .await;
        self.feed.publish(ChangeEvent::insert(LifecycleTable::Devices));
        Ok(device)
    }

    /// Activate the warranty of a `new` device for a customer. The
    /// calling store is recorded as the issuer.
    pub async fn activate_warranty(
        &self,
        caller: &Caller,
        input: ActivateWarrantyInput,
    ) -> HubResult<Warranty> {
        caller.require(&[Role::Store])?;
        input.customer.validate()?;

        let device = self.stores.devices().get_by_id(input.device_id).await?;
        match device.warranty_status {
            WarrantyStatus::New => {}
            WarrantyStatus::Active => {
                return Err(HubError::conflict(
                    ConflictKind::AlreadyActive,
                    format!("warranty of device {} is already active", device.id),
                ));
            }
            status @ (WarrantyStatus::Expired | WarrantyStatus::Replaced) => {
                return Err(HubError::validation(format!(
                    "device {} is {status} and cannot be activated",
                    device.id
                )));
            }
        }

        let months = input.duration_months.unwrap_or(device.warranty_months);
        let activation_date = Utc::now();
        let expiry_date = expiry_after(activation_date, months)?;

        let warranty = self
            .stores
            .warranties()
            .activate(ActivateWarranty {
                device_id: device.id,
                store_id: Some(caller.identity_id),
                customer: input.customer,
                activation_date,
                expiry_date,
                notes: input.notes,
            })
            .await?;

        info!(
            device_id = %device.id,
            warranty_id = %warranty.id,
            store_id = %caller.identity_id,
            months,
            "warranty activated"
        );
        self.record(
            caller.identity_id,
            "warranty.activated",
            "warranty",
            warranty.id,
            json!({ "device_id": device.id, "months": months }),
        )
        .await;
        self.feed.publish(ChangeEvent::insert(LifecycleTable::Warranties));
        self.feed.publish(ChangeEvent::update(LifecycleTable::Devices));
        Ok(warranty)
    }

    /// Move every `active` device whose warranty has lapsed at `now` to
    /// `expired`. Returns the ids of the devices that moved.
    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> HubResult<Vec<Uuid>> {
        let lapsed = self.stores.warranties().list_lapsed(now).await?;
        let mut expired = Vec::with_capacity(lapsed.len());

        for warranty in lapsed {
            let moved = self
                .stores
                .devices()
                .transition_status(
                    warranty.device_id,
                    WarrantyStatus::Active,
                    WarrantyStatus::Expired,
                )
                .await?;
            if !moved {
                continue;
            }
            self.record(
                SYSTEM_ACTOR,
                "warranty.expired",
                "device",
                warranty.device_id,
                json!({ "warranty_id": warranty.id, "expiry_date": warranty.expiry_date }),
            )
            .await;
            expired.push(warranty.device_id);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "lapsed warranties expired");
            self.feed.publish(ChangeEvent::update(LifecycleTable::Devices));
        }
        Ok(expired)
    }

    // -----------------------------------------------------------------------
    // Repairs
    // -----------------------------------------------------------------------

    /// Open a repair in state `received` against an `active` or `expired`
    /// device, linked to the device's current warranty.
    pub async fn open_repair(&self, caller: &Caller, input: OpenRepairInput) -> HubResult<Repair> {
        caller.require(&[Role::Lab, Role::Admin])?;

        let lab_id = match caller.role {
            Role::Lab => match input.lab_id {
                Some(other) if other != caller.identity_id => {
                    return Err(HubError::validation(
                        "a lab can only open repairs assigned to itself",
                    ));
                }
                _ => caller.identity_id,
            },
            _ => {
                let lab_id = input
                    .lab_id
                    .ok_or_else(|| HubError::validation("lab_id is required"))?;
                self.require_role_of(lab_id, Role::Lab).await?;
                lab_id
            }
        };

        let device = self.stores.devices().get_by_id(input.device_id).await?;
        if !device.warranty_status.accepts_repairs() {
            return Err(HubError::validation(format!(
                "device {} is {} and cannot take repairs",
                device.id, device.warranty_status
            )));
        }
        let warranty = self
            .stores
            .warranties()
            .find_active_for_device(device.id)
            .await?;

        let repair = self
            .stores
            .repairs()
            .create(CreateRepair {
                device_id: device.id,
                lab_id: Some(lab_id),
                warranty_id: warranty.map(|w| w.id),
                fault_type: input.fault_type,
                fault_description: input.fault_description,
            })
            .await?;

        info!(repair_id = %repair.id, device_id = %device.id, lab_id = %lab_id, "repair opened");
        self.record(
            caller.identity_id,
            "repair.opened",
            "repair",
            repair.id,
            json!({ "device_id": device.id, "fault_type": repair.fault_type }),
        )
        .await;
        self.feed.publish(ChangeEvent::insert(LifecycleTable::Repairs));
        Ok(repair)
    }

    /// Classify an open repair with a catalog repair type, or clear it
    /// with `None`. Only active types can be assigned.
    pub async fn set_repair_type(
        &self,
        caller: &Caller,
        repair_id: Uuid,
        repair_type_id: Option<Uuid>,
    ) -> HubResult<Repair> {
        caller.require(&[Role::Lab, Role::Admin])?;
        if let Some(type_id) = repair_type_id {
            let repair_type = self.stores.repair_types().get_by_id(type_id).await?;
            if !repair_type.is_active {
                return Err(HubError::validation(format!(
                    "repair type '{}' is inactive",
                    repair_type.name
                )));
            }
        }

        let repair = self.stores.repairs().get_by_id(repair_id).await?;
        ensure_assigned(caller, &repair)?;
        if repair.repair_type_id == repair_type_id {
            return Ok(repair);
        }
        let Some(updated) = self
            .stores
            .repairs()
            .set_repair_type(repair_id, repair_type_id)
            .await?
        else {
            let current = self.stores.repairs().get_by_id(repair_id).await?;
            return Err(HubError::validation(format!(
                "repair {} is {} and can no longer be classified",
                current.id, current.status
            )));
        };

        info!(repair_id = %updated.id, repair_type_id = ?repair_type_id, "repair type set");
        self.record(
            caller.identity_id,
            "repair.type_set",
            "repair",
            updated.id,
            json!({ "from": repair.repair_type_id, "to": repair_type_id }),
        )
        .await;
        self.feed.publish(ChangeEvent::update(LifecycleTable::Repairs));
        Ok(updated)
    }

    /// Advance a repair along its transition table.
    ///
    /// Re-applying the current status is a no-op. Advancing to
    /// `replacement_requested` files a pending replacement request in the
    /// same write. `cost` is only accepted when completing; without one,
    /// a completed repair is charged the lab's active price for its
    /// repair type.
    pub async fn advance_repair(
        &self,
        caller: &Caller,
        repair_id: Uuid,
        target: RepairStatus,
        cost: Option<f64>,
    ) -> HubResult<Repair> {
        caller.require(&[Role::Lab])?;
        if cost.is_some() && target != RepairStatus::Completed {
            return Err(HubError::validation("cost can only be set when completing"));
        }
        if cost.is_some_and(|c| !c.is_finite() || c < 0.0) {
            return Err(HubError::validation("cost must be a non-negative amount"));
        }

        if target == RepairStatus::ReplacementRequested {
            let repair = self.stores.repairs().get_by_id(repair_id).await?;
            ensure_assigned(caller, &repair)?;
            if repair.status != target {
                self.file_replacement(caller, repair, "requested by lab".into())
                    .await?;
            }
            return self.stores.repairs().get_by_id(repair_id).await;
        }

        for _ in 0..CAS_ATTEMPTS {
            let repair = self.stores.repairs().get_by_id(repair_id).await?;
            ensure_assigned(caller, &repair)?;
            if repair.status == target {
                return Ok(repair);
            }
            if !repair.status.can_advance_to(target) {
                return Err(HubError::validation(format!(
                    "repair {} cannot move from {} to {target}",
                    repair.id, repair.status
                )));
            }

            let cost = match (target, cost) {
                (RepairStatus::Completed, None) => self.priced_cost(&repair).await?,
                _ => cost,
            };
            let change = RepairStatusChange {
                status: target,
                cost,
                completed_at: (target == RepairStatus::Completed).then(Utc::now),
            };
            let from = repair.status;
            let Some(updated) = self
                .stores
                .repairs()
                .update_status(repair_id, from, change)
                .await?
            else {
                continue;
            };

            info!(repair_id = %updated.id, %from, to = %target, "repair advanced");
            self.record(
                caller.identity_id,
                "repair.status_changed",
                "repair",
                updated.id,
                json!({ "from": from, "to": target, "cost": cost }),
            )
            .await;
            self.feed.publish(ChangeEvent::update(LifecycleTable::Repairs));
            return Ok(updated);
        }

        Err(HubError::Internal(format!(
            "repair {repair_id} kept changing underneath the transition"
        )))
    }

    // -----------------------------------------------------------------------
    // Replacement requests
    // -----------------------------------------------------------------------

    /// File a replacement request for an open repair. A repeat request
    /// for the same repair returns the request already on file.
    pub async fn request_replacement(
        &self,
        caller: &Caller,
        repair_id: Uuid,
        reason: &str,
    ) -> HubResult<ReplacementRequest> {
        caller.require(&[Role::Lab, Role::Store])?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(HubError::validation("a reason is required"));
        }

        let repair = self.stores.repairs().get_by_id(repair_id).await?;
        if caller.role == Role::Lab {
            ensure_assigned(caller, &repair)?;
        }
        self.file_replacement(caller, repair, reason.to_owned()).await
    }

    /// Record an admin's terminal decision. Approval replaces the device
    /// and deactivates its warranty in the same write.
    pub async fn resolve_replacement(
        &self,
        caller: &Caller,
        request_id: Uuid,
        decision: Decision,
        notes: Option<String>,
    ) -> HubResult<ReplacementOutcome> {
        caller.require(&[Role::Admin])?;

        let request = self.stores.replacements().get_by_id(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(already_resolved(&request));
        }

        let (replace_device, deactivate_warranty) = match decision {
            Decision::Rejected => (None, None),
            Decision::Approved => {
                let warranty_id = match request.warranty_id {
                    Some(id) => Some(id),
                    None => self
                        .stores
                        .warranties()
                        .find_active_for_device(request.device_id)
                        .await?
                        .map(|w| w.id),
                };
                (Some(request.device_id), warranty_id)
            }
        };

        let resolved = self
            .stores
            .replacements()
            .resolve(ResolveReplacement {
                request_id,
                decision,
                admin_notes: notes,
                resolved_by: caller.identity_id,
                resolved_at: Utc::now(),
                replace_device,
                deactivate_warranty,
            })
            .await?;

        let device = match replace_device {
            Some(id) => Some(self.stores.devices().get_by_id(id).await?),
            None => None,
        };
        let warranty = match deactivate_warranty {
            Some(id) => Some(self.stores.warranties().get_by_id(id).await?),
            None => None,
        };

        info!(
            request_id = %resolved.id,
            device_id = %resolved.device_id,
            %decision,
            "replacement request resolved"
        );
        self.record(
            caller.identity_id,
            "replacement.resolved",
            "replacement_request",
            resolved.id,
            json!({ "decision": decision, "device_id": resolved.device_id }),
        )
        .await;
        self.feed
            .publish(ChangeEvent::update(LifecycleTable::ReplacementRequests));
        if device.is_some() {
            self.feed.publish(ChangeEvent::update(LifecycleTable::Devices));
        }
        if warranty.is_some() {
            self.feed.publish(ChangeEvent::update(LifecycleTable::Warranties));
        }

        Ok(ReplacementOutcome {
            request: resolved,
            device,
            warranty,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn file_replacement(
        &self,
        caller: &Caller,
        repair: Repair,
        reason: String,
    ) -> HubResult<ReplacementRequest> {
        let replacements = self.stores.replacements();
        if repair.status == RepairStatus::ReplacementRequested {
            if let Some(existing) = replacements.find_by_repair(repair.id).await? {
                return Ok(existing);
            }
        }
        if !repair.status.is_open() {
            return Err(HubError::validation(format!(
                "repair {} is {} and cannot request a replacement",
                repair.id, repair.status
            )));
        }
        // Referential check before the composite write.
        let device = self.stores.devices().get_by_id(repair.device_id).await?;

        let created = replacements
            .create(CreateReplacementRequest {
                device_id: device.id,
                repair_id: Some(repair.id),
                warranty_id: repair.warranty_id,
                requester_id: caller.identity_id,
                reason,
            })
            .await;
        let request = match created {
            Ok(request) => request,
            Err(err @ HubError::Conflict { .. }) => {
                // Lost a race with another filer for the same repair.
                return replacements
                    .find_by_repair(repair.id)
                    .await?
                    .ok_or(err);
            }
            Err(err) => return Err(err),
        };

        info!(
            request_id = %request.id,
            repair_id = %repair.id,
            device_id = %device.id,
            "replacement requested"
        );
        self.record(
            caller.identity_id,
            "replacement.requested",
            "replacement_request",
            request.id,
            json!({ "repair_id": repair.id, "device_id": device.id }),
        )
        .await;
        self.feed
            .publish(ChangeEvent::insert(LifecycleTable::ReplacementRequests));
        self.feed.publish(ChangeEvent::update(LifecycleTable::Repairs));
        Ok(request)
    }

    /// The assigned lab's active price for the repair's type.
    async fn priced_cost(&self, repair: &Repair) -> HubResult<Option<f64>> {
        let (Some(lab_id), Some(type_id)) = (repair.lab_id, repair.repair_type_id) else {
            debug!(repair_id = %repair.id, "unclassified repair completes without cost");
            return Ok(None);
        };
        match self.stores.prices().find(lab_id, type_id).await? {
            Some(price) if price.is_active => Ok(Some(price.price)),
            _ => {
                warn!(
                    repair_id = %repair.id,
                    lab_id = %lab_id,
                    repair_type_id = %type_id,
                    "no active lab price, repair completes without cost"
                );
                Ok(None)
            }
        }
    }

    /// A referenced identity must exist with `role`.
    async fn require_role_of(&self, id: Uuid, role: Role) -> HubResult<()> {
        profile_with_role(&self.profiles, id, role).await.map(drop)
    }

    async fn record(
        &self,
        actor: Uuid,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        metadata: serde_json::Value,
    ) {
        append_audit(&self.audit, actor, action, entity_type, entity_id, metadata).await;
    }
}

/// Load a referenced identity's profile, which must carry `role`.
pub(crate) async fn profile_with_role<P: ProfileStore>(
    profiles: &P,
    id: Uuid,
    role: Role,
) -> HubResult<Profile> {
    let profile = profiles
        .get(id)
        .await?
        .ok_or_else(|| HubError::not_found("profile", id))?;
    if profile.role != role {
        return Err(HubError::validation(format!(
            "identity {id} has role {}, expected {role}",
            profile.role
        )));
    }
    Ok(profile)
}

/// Audit failures are logged and never fail the write they describe.
pub(crate) async fn append_audit<A: AuditLogRepository>(
    audit: &A,
    actor: Uuid,
    action: &str,
    entity_type: &str,
    entity_id: Uuid,
    metadata: serde_json::Value,
) {
    let entry = CreateAuditLogEntry {
        actor_id: actor,
        action: action.into(),
        entity_type: entity_type.into(),
        entity_id,
        metadata,
    };
    if let Err(err) = audit.append(entry).await {
        warn!(%entity_id, action, error = %err, "audit append failed");
    }
}

fn expiry_after(activation: DateTime<Utc>, months: u32) -> HubResult<DateTime<Utc>> {
    if months == 0 {
        return Err(HubError::validation("warranty duration must be at least 1 month"));
    }
    activation
        .checked_add_months(Months::new(months))
        .ok_or_else(|| {
            HubError::validation(format!(
                "warranty duration of {months} months is out of range"
            ))
        })
}

fn ensure_assigned(caller: &Caller, repair: &Repair) -> HubResult<()> {
    if caller.role == Role::Lab && repair.lab_id != Some(caller.identity_id) {
        return Err(HubError::Forbidden {
            reason: ForbiddenReason::Role,
            message: format!("repair {} is assigned to another lab", repair.id),
        });
    }
    Ok(())
}

fn already_resolved(request: &ReplacementRequest) -> HubError {
    HubError::conflict(
        ConflictKind::AlreadyResolved,
        format!("replacement request {} is already {}", request.id, request.status),
    )
}

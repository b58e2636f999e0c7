use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use repairhub_core::error::{ConflictKind, HubError, HubResult, UpstreamSystem};
use repairhub_core::models::device::{CreateDevice, Device, WarrantyStatus};
use repairhub_core::models::payment::{CreateLabPayment, LabPayment, LabTotals};
use repairhub_core::models::pricing::{
    CreateRepairType, LabRepairPrice, RepairType, SetLabRepairPrice, UpdateRepairType,
};
use repairhub_core::models::repair::{CreateRepair, Repair, RepairStatus, RepairStatusChange};
use repairhub_core::models::replacement::{
    CreateReplacementRequest, ReplacementRequest, RequestStatus, ResolveReplacement,
};
use repairhub_core::models::warranty::{ActivateWarranty, Warranty};
use repairhub_core::query::{
    DeviceFilter, PaginatedResult, Pagination, RepairFilter, ReplacementFilter, RowScope,
    WarrantyFilter,
};
use repairhub_core::repository::{
    DeviceRepository, LabPaymentRepository, LabPriceRepository, RepairRepository,
    RepairTypeRepository, ReplacementRepository, WarrantyRepository,
};
use uuid::Uuid;

use crate::faults::{CallLog, Faults};

#[derive(Debug, Default)]
struct Tables {
    devices: HashMap<Uuid, Device>,
    warranties: HashMap<Uuid, Warranty>,
    repairs: HashMap<Uuid, Repair>,
    requests: HashMap<Uuid, ReplacementRequest>,
    repair_types: HashMap<Uuid, RepairType>,
    prices: HashMap<Uuid, LabRepairPrice>,
    payments: HashMap<Uuid, LabPayment>,
}

#[derive(Debug)]
struct Inner {
    tables: Mutex<Tables>,
    faults: Faults,
    calls: CallLog,
}

/// The lifecycle, pricing and payment tables behind one lock, so
/// composite writes are atomic the same way the database transactions
/// are.
///
/// Fault op names are `<table>.<op>`, e.g. `warranty.activate`,
/// `replacement.resolve`, `repair.update_status`, `lab_price.upsert`.
#[derive(Debug, Clone)]
pub struct InMemoryLifecycle {
    inner: Arc<Inner>,
}

impl Default for InMemoryLifecycle {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::default(),
                faults: Faults::new(UpstreamSystem::ProfileStore),
                calls: CallLog::default(),
            }),
        }
    }
}

fn owned_by(scope: RowScope, owner: Option<Uuid>) -> bool {
    scope.owner().is_none_or(|id| owner == Some(id))
}

impl InMemoryLifecycle {
    pub fn faults(&self) -> &Faults {
        &self.inner.faults
    }

    pub fn calls(&self) -> &CallLog {
        &self.inner.calls
    }

    /// Backdate a warranty's expiry, e.g. to make it lapse.
    pub fn set_expiry(&self, warranty_id: Uuid, expiry_date: DateTime<Utc>) {
        if let Some(w) = self.tables().warranties.get_mut(&warranty_id) {
            w.expiry_date = expiry_date;
        }
    }

    pub fn warranty_count(&self) -> usize {
        self.tables().warranties.len()
    }

    pub fn request_count(&self) -> usize {
        self.tables().requests.len()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, op: &'static str) -> HubResult<()> {
        self.inner.calls.record(op);
        self.inner.faults.check(op)
    }
}

impl DeviceRepository for InMemoryLifecycle {
    async fn create(&self, input: CreateDevice) -> HubResult<Device> {
        self.enter("device.create")?;
        let mut tables = self.tables();
        let taken = tables.devices.values().any(|d| {
            d.imei == input.imei
                || d.imei2.as_deref() == Some(input.imei.as_str())
                || input
                    .imei2
                    .as_deref()
                    .is_some_and(|i2| d.imei == i2 || d.imei2.as_deref() == Some(i2))
        });
        if taken {
            return Err(HubError::conflict(
                ConflictKind::Duplicate,
                format!("IMEI {} is already registered", input.imei),
            ));
        }
        let now = Utc::now();
        let device = Device {
            id: Uuid::new_v4(),
            imei: input.imei,
            imei2: input.imei2,
            model: input.model,
            warranty_status: WarrantyStatus::New,
            warranty_months: input.warranty_months,
            created_at: now,
            updated_at: now,
        };
        tables.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<Device> {
        self.enter("device.get_by_id")?;
        self.tables()
            .devices
            .get(&id)
            .cloned()
            .ok_or_else(|| HubError::not_found("device", id))
    }

    async fn find_by_imei(&self, imei: &str) -> HubResult<Option<Device>> {
        self.enter("device.find_by_imei")?;
        Ok(self
            .tables()
            .devices
            .values()
            .find(|d| d.imei == imei || d.imei2.as_deref() == Some(imei))
            .cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: WarrantyStatus,
        target: WarrantyStatus,
    ) -> HubResult<bool> {
        self.enter("device.transition_status")?;
        let mut tables = self.tables();
        let device = tables
            .devices
            .get_mut(&id)
            .ok_or_else(|| HubError::not_found("device", id))?;
        if device.warranty_status != expected {
            return Ok(false);
        }
        device.warranty_status = target;
        device.updated_at = Utc::now();
        Ok(true)
    }

    async fn list(
        &self,
        filter: DeviceFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Device>> {
        self.enter("device.list")?;
        let model = filter.model.map(|m| m.to_lowercase());
        let mut rows: Vec<Device> = self
            .tables()
            .devices
            .values()
            .filter(|d| filter.status.is_none_or(|s| d.warranty_status == s))
            .filter(|d| {
                filter.imei.as_deref().is_none_or(|q| {
                    d.imei.contains(q) || d.imei2.as_deref().is_some_and(|i| i.contains(q))
                })
            })
            .filter(|d| {
                model
                    .as_deref()
                    .is_none_or(|q| d.model.to_lowercase().contains(q))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(PaginatedResult::from_vec(rows, pagination))
    }
}

impl WarrantyRepository for InMemoryLifecycle {
    async fn get_by_id(&self, id: Uuid) -> HubResult<Warranty> {
        self.enter("warranty.get_by_id")?;
        self.tables()
            .warranties
            .get(&id)
            .cloned()
            .ok_or_else(|| HubError::not_found("warranty", id))
    }

    async fn find_active_for_device(&self, device_id: Uuid) -> HubResult<Option<Warranty>> {
        self.enter("warranty.find_active_for_device")?;
        Ok(self
            .tables()
            .warranties
            .values()
            .filter(|w| w.device_id == device_id && w.is_active)
            .max_by_key(|w| w.created_at)
            .cloned())
    }

    async fn activate(&self, input: ActivateWarranty) -> HubResult<Warranty> {
        self.enter("warranty.activate")?;
        let mut tables = self.tables();
        let device = tables
            .devices
            .get_mut(&input.device_id)
            .ok_or_else(|| HubError::not_found("device", input.device_id))?;
        if device.warranty_status != WarrantyStatus::New {
            return Err(HubError::conflict(
                ConflictKind::AlreadyActive,
                format!("device {} is {}", device.id, device.warranty_status),
            ));
        }
        let now = Utc::now();
        device.warranty_status = WarrantyStatus::Active;
        device.updated_at = now;

        let warranty = Warranty {
            id: Uuid::new_v4(),
            device_id: input.device_id,
            store_id: input.store_id,
            customer_name: input.customer.name,
            customer_phone: input.customer.phone,
            activation_date: input.activation_date,
            expiry_date: input.expiry_date,
            is_active: true,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        tables.warranties.insert(warranty.id, warranty.clone());
        Ok(warranty)
    }

    async fn list_lapsed(&self, now: DateTime<Utc>) -> HubResult<Vec<Warranty>> {
        self.enter("warranty.list_lapsed")?;
        let tables = self.tables();
        let mut lapsed: Vec<Warranty> = tables
            .warranties
            .values()
            .filter(|w| w.is_active && w.has_lapsed(now))
            .filter(|w| {
                tables
                    .devices
                    .get(&w.device_id)
                    .is_some_and(|d| d.warranty_status == WarrantyStatus::Active)
            })
            .cloned()
            .collect();
        lapsed.sort_by_key(|w| w.expiry_date);
        Ok(lapsed)
    }

    async fn list(
        &self,
        scope: RowScope,
        filter: WarrantyFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Warranty>> {
        self.enter("warranty.list")?;
        let customer = filter.customer.map(|c| c.to_lowercase());
        let mut rows: Vec<Warranty> = self
            .tables()
            .warranties
            .values()
            .filter(|w| owned_by(scope, w.store_id))
            .filter(|w| filter.device_id.is_none_or(|d| w.device_id == d))
            .filter(|w| !filter.active_only || w.is_active)
            .filter(|w| {
                customer.as_deref().is_none_or(|q| {
                    w.customer_name.to_lowercase().contains(q) || w.customer_phone.contains(q)
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(PaginatedResult::from_vec(rows, pagination))
    }
}

impl RepairRepository for InMemoryLifecycle {
    async fn create(&self, input: CreateRepair) -> HubResult<Repair> {
        self.enter("repair.create")?;
        let now = Utc::now();
        let repair = Repair {
            id: Uuid::new_v4(),
            device_id: input.device_id,
            lab_id: input.lab_id,
            warranty_id: input.warranty_id,
            fault_type: input.fault_type,
            fault_description: input.fault_description,
            repair_type_id: None,
            status: RepairStatus::Received,
            cost: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.tables().repairs.insert(repair.id, repair.clone());
        Ok(repair)
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<Repair> {
        self.enter("repair.get_by_id")?;
        self.tables()
            .repairs
            .get(&id)
            .cloned()
            .ok_or_else(|| HubError::not_found("repair", id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: RepairStatus,
        change: RepairStatusChange,
    ) -> HubResult<Option<Repair>> {
        self.enter("repair.update_status")?;
        let mut tables = self.tables();
        let repair = tables
            .repairs
            .get_mut(&id)
            .ok_or_else(|| HubError::not_found("repair", id))?;
        if repair.status != expected {
            return Ok(None);
        }
        repair.status = change.status;
        if change.cost.is_some() {
            repair.cost = change.cost;
        }
        if change.completed_at.is_some() {
            repair.completed_at = change.completed_at;
        }
        repair.updated_at = Utc::now();
        Ok(Some(repair.clone()))
    }

    async fn set_repair_type(
        &self,
        id: Uuid,
        repair_type_id: Option<Uuid>,
    ) -> HubResult<Option<Repair>> {
        self.enter("repair.set_repair_type")?;
        let mut tables = self.tables();
        let repair = tables
            .repairs
            .get_mut(&id)
            .ok_or_else(|| HubError::not_found("repair", id))?;
        if !repair.status.is_open() {
            return Ok(None);
        }
        repair.repair_type_id = repair_type_id;
        repair.updated_at = Utc::now();
        Ok(Some(repair.clone()))
    }

    async fn completed_totals(&self, lab_id: Uuid) -> HubResult<LabTotals> {
        self.enter("repair.completed_totals")?;
        Ok(self
            .tables()
            .repairs
            .values()
            .filter(|r| r.lab_id == Some(lab_id) && r.status == RepairStatus::Completed)
            .fold(LabTotals::default(), |acc, r| LabTotals {
                total: acc.total + r.cost.unwrap_or(0.0),
                count: acc.count + 1,
            }))
    }

    async fn list(
        &self,
        scope: RowScope,
        filter: RepairFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Repair>> {
        self.enter("repair.list")?;
        let mut rows: Vec<Repair> = self
            .tables()
            .repairs
            .values()
            .filter(|r| owned_by(scope, r.lab_id))
            .filter(|r| filter.device_id.is_none_or(|d| r.device_id == d))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| {
                filter
                    .repair_type_id
                    .is_none_or(|t| r.repair_type_id == Some(t))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(PaginatedResult::from_vec(rows, pagination))
    }
}

impl ReplacementRepository for InMemoryLifecycle {
    async fn create(&self, input: CreateReplacementRequest) -> HubResult<ReplacementRequest> {
        self.enter("replacement.create")?;
        let mut tables = self.tables();
        let now = Utc::now();
        if let Some(repair_id) = input.repair_id {
            let repair = tables
                .repairs
                .get_mut(&repair_id)
                .ok_or_else(|| HubError::not_found("repair", repair_id))?;
            if !repair.status.is_open() {
                return Err(HubError::conflict(
                    ConflictKind::Duplicate,
                    format!("repair {repair_id} is {}", repair.status),
                ));
            }
            repair.status = RepairStatus::ReplacementRequested;
            repair.updated_at = now;
        }
        let request = ReplacementRequest {
            id: Uuid::new_v4(),
            device_id: input.device_id,
            repair_id: input.repair_id,
            warranty_id: input.warranty_id,
            requester_id: input.requester_id,
            reason: input.reason,
            status: RequestStatus::Pending,
            admin_notes: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<ReplacementRequest> {
        self.enter("replacement.get_by_id")?;
        self.tables()
            .requests
            .get(&id)
            .cloned()
            .ok_or_else(|| HubError::not_found("replacement_request", id))
    }

    async fn find_by_repair(&self, repair_id: Uuid) -> HubResult<Option<ReplacementRequest>> {
        self.enter("replacement.find_by_repair")?;
        Ok(self
            .tables()
            .requests
            .values()
            .filter(|r| r.repair_id == Some(repair_id))
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn resolve(&self, input: ResolveReplacement) -> HubResult<ReplacementRequest> {
        self.enter("replacement.resolve")?;
        let mut tables = self.tables();
        let request = tables
            .requests
            .get(&input.request_id)
            .ok_or_else(|| HubError::not_found("replacement_request", input.request_id))?;
        if request.status != RequestStatus::Pending {
            return Err(HubError::conflict(
                ConflictKind::AlreadyResolved,
                format!("request {} is already {}", request.id, request.status),
            ));
        }
        if let Some(device_id) = input
            .replace_device
            .filter(|id| !tables.devices.contains_key(id))
        {
            return Err(HubError::not_found("device", device_id));
        }
        if let Some(warranty_id) = input
            .deactivate_warranty
            .filter(|id| !tables.warranties.contains_key(id))
        {
            return Err(HubError::not_found("warranty", warranty_id));
        }

        let now = Utc::now();
        if let Some(device) = input
            .replace_device
            .and_then(|id| tables.devices.get_mut(&id))
        {
            device.warranty_status = WarrantyStatus::Replaced;
            device.updated_at = now;
        }
        if let Some(warranty) = input
            .deactivate_warranty
            .and_then(|id| tables.warranties.get_mut(&id))
        {
            warranty.is_active = false;
            warranty.updated_at = now;
        }
        let resolved = {
            let Some(request) = tables.requests.get_mut(&input.request_id) else {
                return Err(HubError::not_found("replacement_request", input.request_id));
            };
            request.status = input.decision.into();
            request.admin_notes = input.admin_notes;
            request.resolved_by = Some(input.resolved_by);
            request.resolved_at = Some(input.resolved_at);
            request.updated_at = now;
            request.clone()
        };
        Ok(resolved)
    }

    async fn list(
        &self,
        scope: RowScope,
        filter: ReplacementFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<ReplacementRequest>> {
        self.enter("replacement.list")?;
        let mut rows: Vec<ReplacementRequest> = self
            .tables()
            .requests
            .values()
            .filter(|r| owned_by(scope, Some(r.requester_id)))
            .filter(|r| filter.device_id.is_none_or(|d| r.device_id == d))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(PaginatedResult::from_vec(rows, pagination))
    }
}

impl RepairTypeRepository for InMemoryLifecycle {
    async fn create(&self, input: CreateRepairType) -> HubResult<RepairType> {
        self.enter("repair_type.create")?;
        let mut tables = self.tables();
        let name = input.name.trim().to_owned();
        if tables.repair_types.values().any(|t| t.name == name) {
            return Err(HubError::conflict(
                ConflictKind::Duplicate,
                format!("repair type '{name}' already exists"),
            ));
        }
        let now = Utc::now();
        let repair_type = RepairType {
            id: Uuid::new_v4(),
            name,
            description: input.description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.repair_types.insert(repair_type.id, repair_type.clone());
        Ok(repair_type)
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<RepairType> {
        self.enter("repair_type.get_by_id")?;
        self.tables()
            .repair_types
            .get(&id)
            .cloned()
            .ok_or_else(|| HubError::not_found("repair_type", id))
    }

    async fn update(&self, id: Uuid, input: UpdateRepairType) -> HubResult<RepairType> {
        self.enter("repair_type.update")?;
        let mut tables = self.tables();
        let name = input.name.map(|n| n.trim().to_owned());
        if let Some(name) = &name {
            if tables
                .repair_types
                .values()
                .any(|t| t.id != id && &t.name == name)
            {
                return Err(HubError::conflict(
                    ConflictKind::Duplicate,
                    format!("repair type '{name}' already exists"),
                ));
            }
        }
        let repair_type = tables
            .repair_types
            .get_mut(&id)
            .ok_or_else(|| HubError::not_found("repair_type", id))?;
        if let Some(name) = name {
            repair_type.name = name;
        }
        if let Some(description) = input.description {
            repair_type.description = description;
        }
        if let Some(is_active) = input.is_active {
            repair_type.is_active = is_active;
        }
        repair_type.updated_at = Utc::now();
        Ok(repair_type.clone())
    }

    async fn delete(&self, id: Uuid) -> HubResult<()> {
        self.enter("repair_type.delete")?;
        let mut tables = self.tables();
        if tables.repair_types.remove(&id).is_none() {
            return Err(HubError::not_found("repair_type", id));
        }
        tables.prices.retain(|_, p| p.repair_type_id != id);
        Ok(())
    }

    async fn list(&self, active_only: bool) -> HubResult<Vec<RepairType>> {
        self.enter("repair_type.list")?;
        let mut rows: Vec<RepairType> = self
            .tables()
            .repair_types
            .values()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

impl LabPriceRepository for InMemoryLifecycle {
    async fn upsert(&self, input: SetLabRepairPrice) -> HubResult<LabRepairPrice> {
        self.enter("lab_price.upsert")?;
        let mut tables = self.tables();
        let now = Utc::now();
        let existing = tables
            .prices
            .values_mut()
            .find(|p| p.lab_id == input.lab_id && p.repair_type_id == input.repair_type_id);
        if let Some(price) = existing {
            price.price = input.price;
            price.is_active = input.is_active;
            price.notes = input.notes;
            price.updated_at = now;
            return Ok(price.clone());
        }
        let price = LabRepairPrice {
            id: Uuid::new_v4(),
            lab_id: input.lab_id,
            repair_type_id: input.repair_type_id,
            price: input.price,
            is_active: input.is_active,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        tables.prices.insert(price.id, price.clone());
        Ok(price)
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<LabRepairPrice> {
        self.enter("lab_price.get_by_id")?;
        self.tables()
            .prices
            .get(&id)
            .cloned()
            .ok_or_else(|| HubError::not_found("lab_repair_price", id))
    }

    async fn find(&self, lab_id: Uuid, repair_type_id: Uuid) -> HubResult<Option<LabRepairPrice>> {
        self.enter("lab_price.find")?;
        Ok(self
            .tables()
            .prices
            .values()
            .find(|p| p.lab_id == lab_id && p.repair_type_id == repair_type_id)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> HubResult<()> {
        self.enter("lab_price.delete")?;
        self.tables().prices.remove(&id);
        Ok(())
    }

    async fn list_for_lab(&self, lab_id: Uuid) -> HubResult<Vec<LabRepairPrice>> {
        self.enter("lab_price.list_for_lab")?;
        let mut rows: Vec<LabRepairPrice> = self
            .tables()
            .prices
            .values()
            .filter(|p| p.lab_id == lab_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

impl LabPaymentRepository for InMemoryLifecycle {
    async fn create(&self, input: CreateLabPayment) -> HubResult<LabPayment> {
        self.enter("lab_payment.create")?;
        let payment = LabPayment {
            id: Uuid::new_v4(),
            lab_id: input.lab_id,
            amount: input.amount,
            payment_date: input.payment_date,
            reference: input.reference,
            notes: input.notes,
            created_by: input.created_by,
            created_at: Utc::now(),
        };
        self.tables().payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn list_for_lab(
        &self,
        lab_id: Uuid,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<LabPayment>> {
        self.enter("lab_payment.list_for_lab")?;
        let mut rows: Vec<LabPayment> = self
            .tables()
            .payments
            .values()
            .filter(|p| p.lab_id == lab_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));
        Ok(PaginatedResult::from_vec(rows, pagination))
    }

    async fn totals(&self, lab_id: Uuid) -> HubResult<LabTotals> {
        self.enter("lab_payment.totals")?;
        Ok(self
            .tables()
            .payments
            .values()
            .filter(|p| p.lab_id == lab_id)
            .fold(LabTotals::default(), |acc, p| LabTotals {
                total: acc.total + p.amount,
                count: acc.count + 1,
            }))
    }
}

//! The backend facade.
//!
//! Every operation takes the caller's bearer token and passes the
//! authorization gate before anything else runs; the gate's verdict is
//! then handed to the provisioning saga, the lifecycle engine, the lab
//! ledger or the query gateway.

use chrono::{DateTime, Utc};
use repairhub_auth::{
    AuthConfig, AuthService, AuthorizationGate, Caller, NewUser, ProvisioningSaga, SignInOutput,
};
use repairhub_core::error::{HubError, HubResult};
use repairhub_core::models::audit::AuditLogEntry;
use repairhub_core::models::device::{CreateDevice, Device};
use repairhub_core::models::payment::{LabBalance, LabPayment};
use repairhub_core::models::pricing::{
    CreateRepairType, LabRepairPrice, RepairType, SetLabRepairPrice, UpdateRepairType,
};
use repairhub_core::models::profile::{Profile, Role, UpdateProfile};
use repairhub_core::models::repair::{Repair, RepairStatus};
use repairhub_core::models::replacement::{Decision, ReplacementRequest};
use repairhub_core::models::warranty::Warranty;
use repairhub_core::query::{
    DeviceFilter, PaginatedResult, Pagination, ProfileFilter, RepairFilter, ReplacementFilter,
    RowScope, WarrantyFilter,
};
use repairhub_core::repository::{AuditLogRepository, Directory, ProfileStore};
use repairhub_db::DbManager;
use repairhub_db::repository::{
    SurrealAuditLogRepository, SurrealDeviceRepository, SurrealDirectory,
    SurrealLabPaymentRepository, SurrealLabPriceRepository, SurrealProfileStore,
    SurrealRepairRepository, SurrealRepairTypeRepository, SurrealReplacementRepository,
    SurrealWarrantyRepository,
};
use repairhub_lifecycle::{
    ActivateWarrantyInput, ChangeFeed, LabLedger, LifecycleEngine, LifecycleStores,
    OpenRepairInput, QueryGateway, RecordPaymentInput, ReplacementOutcome, SYSTEM_ACTOR, Stores,
};
use surrealdb::engine::any::Any;
use tracing::info;
use uuid::Uuid;

use crate::config::{BootstrapAdmin, ServerConfig};

pub type SurrealStores = Stores<
    SurrealDeviceRepository<Any>,
    SurrealWarrantyRepository<Any>,
    SurrealRepairRepository<Any>,
    SurrealReplacementRepository<Any>,
    SurrealRepairTypeRepository<Any>,
    SurrealLabPriceRepository<Any>,
    SurrealLabPaymentRepository<Any>,
>;

pub type SurrealBackend = Backend<
    SurrealDirectory<Any>,
    SurrealProfileStore<Any>,
    SurrealAuditLogRepository<Any>,
    SurrealStores,
>;

pub struct Backend<D, P, A, S>
where
    D: Directory,
    P: ProfileStore,
    A: AuditLogRepository,
    S: LifecycleStores,
{
    gate: AuthorizationGate<D, P>,
    auth: AuthService<D, P>,
    saga: ProvisioningSaga<D, P, A>,
    engine: LifecycleEngine<S, P, A>,
    ledger: LabLedger<S, P, A>,
    queries: QueryGateway<S, P, A>,
    profiles: P,
}

impl SurrealBackend {
    /// Wire every collaborator to one database connection.
    pub fn from_db(db: &DbManager, config: &ServerConfig) -> Self {
        let client = db.client().clone();
        let directory = match &config.auth.pepper {
            Some(pepper) => SurrealDirectory::with_pepper(client.clone(), pepper.clone()),
            None => SurrealDirectory::new(client.clone()),
        };
        let stores = Stores {
            devices: SurrealDeviceRepository::new(client.clone()),
            warranties: SurrealWarrantyRepository::new(client.clone()),
            repairs: SurrealRepairRepository::new(client.clone()),
            replacements: SurrealReplacementRepository::new(client.clone()),
            repair_types: SurrealRepairTypeRepository::new(client.clone()),
            prices: SurrealLabPriceRepository::new(client.clone()),
            payments: SurrealLabPaymentRepository::new(client.clone()),
        };
        Self::new(
            directory,
            SurrealProfileStore::new(client.clone()),
            SurrealAuditLogRepository::new(client),
            stores,
            &config.auth,
            ChangeFeed::new(config.lifecycle.feed_capacity),
        )
    }
}

impl<D, P, A, S> Backend<D, P, A, S>
where
    D: Directory + Clone,
    P: ProfileStore + Clone,
    A: AuditLogRepository + Clone,
    S: LifecycleStores + Clone,
{
    pub fn new(
        directory: D,
        profiles: P,
        audit: A,
        stores: S,
        auth: &AuthConfig,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            gate: AuthorizationGate::new(directory.clone(), profiles.clone(), auth.clone()),
            auth: AuthService::new(directory.clone(), profiles.clone(), auth.clone()),
            saga: ProvisioningSaga::new(directory, profiles.clone(), audit.clone(), auth),
            engine: LifecycleEngine::new(
                stores.clone(),
                profiles.clone(),
                audit.clone(),
                feed.clone(),
            ),
            ledger: LabLedger::new(stores.clone(), profiles.clone(), audit.clone(), feed),
            queries: QueryGateway::new(stores, profiles.clone(), audit),
            profiles,
        }
    }
}

impl<D, P, A, S> Backend<D, P, A, S>
where
    D: Directory,
    P: ProfileStore,
    A: AuditLogRepository,
    S: LifecycleStores,
{
    pub fn feed(&self) -> &ChangeFeed {
        self.engine.feed()
    }

    /// Identities whose compensation failed and now lack a profile.
    pub fn orphan_alerts(&self) -> u64 {
        self.saga.orphan_alerts()
    }

    /// Create the configured admin unless an admin profile already
    /// exists. Returns the new identity id when one was created.
    pub async fn bootstrap_admin(&self, admin: &BootstrapAdmin) -> HubResult<Option<Uuid>> {
        let existing = self
            .profiles
            .list(
                RowScope::All,
                ProfileFilter {
                    role: Some(Role::Admin),
                    active: None,
                },
                Pagination::page(1, 1),
            )
            .await?;
        if existing.total > 0 {
            return Ok(None);
        }

        let id = self
            .saga
            .create(
                SYSTEM_ACTOR,
                NewUser {
                    email: admin.email.clone(),
                    password: admin.password.clone(),
                    full_name: admin.full_name.clone(),
                    phone: None,
                    role: Role::Admin,
                },
            )
            .await?;
        info!(identity_id = %id, "bootstrap admin created");
        Ok(Some(id))
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    pub async fn sign_in(&self, email: &str, password: &str) -> HubResult<SignInOutput> {
        self.auth.sign_in(email, password).await
    }

    pub async fn create_user(&self, bearer: &str, input: NewUser) -> HubResult<Uuid> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.saga.create(caller.identity_id, input).await
    }

    pub async fn delete_user(&self, bearer: &str, identity_id: Uuid) -> HubResult<()> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        if caller.identity_id == identity_id {
            return Err(HubError::validation("admins cannot delete themselves"));
        }
        self.saga.delete(caller.identity_id, identity_id).await
    }

    pub async fn reset_password(
        &self,
        bearer: &str,
        identity_id: Uuid,
        new_password: &str,
    ) -> HubResult<()> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.saga
            .reset_credential(caller.identity_id, identity_id, new_password)
            .await
    }

    pub async fn set_user_active(
        &self,
        bearer: &str,
        identity_id: Uuid,
        is_active: bool,
    ) -> HubResult<Profile> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        if caller.identity_id == identity_id && !is_active {
            return Err(HubError::validation("admins cannot deactivate themselves"));
        }
        self.saga
            .set_active(caller.identity_id, identity_id, is_active)
            .await
    }

    /// Change the caller's own name or phone. Role and active flag are
    /// not reachable from here.
    pub async fn update_own_profile(
        &self,
        bearer: &str,
        full_name: Option<String>,
        phone: Option<Option<String>>,
    ) -> HubResult<Profile> {
        let caller = self.gate.authenticate(bearer).await?;
        let full_name = full_name.map(|n| n.trim().to_owned());
        if full_name.as_deref().is_some_and(str::is_empty) {
            return Err(HubError::validation("full name cannot be empty"));
        }
        self.profiles
            .update(
                caller.identity_id,
                UpdateProfile {
                    full_name,
                    phone,
                    is_active: None,
                },
            )
            .await
    }

    pub async fn me(&self, bearer: &str) -> HubResult<(Caller, Option<Profile>)> {
        let caller = self.gate.authenticate(bearer).await?;
        let profile = self.queries.own_profile(&caller).await?;
        Ok((caller, profile))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub async fn register_device(&self, bearer: &str, input: CreateDevice) -> HubResult<Device> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.engine.register_device(&caller, input).await
    }

    pub async fn activate_warranty(
        &self,
        bearer: &str,
        input: ActivateWarrantyInput,
    ) -> HubResult<Warranty> {
        let caller = self.gate.authorize(bearer, &[Role::Store]).await?;
        self.engine.activate_warranty(&caller, input).await
    }

    pub async fn open_repair(&self, bearer: &str, input: OpenRepairInput) -> HubResult<Repair> {
        let caller = self.gate.authorize(bearer, &[Role::Lab, Role::Admin]).await?;
        self.engine.open_repair(&caller, input).await
    }

    pub async fn advance_repair(
        &self,
        bearer: &str,
        repair_id: Uuid,
        target: RepairStatus,
        cost: Option<f64>,
    ) -> HubResult<Repair> {
        let caller = self.gate.authorize(bearer, &[Role::Lab]).await?;
        self.engine
            .advance_repair(&caller, repair_id, target, cost)
            .await
    }

    pub async fn request_replacement(
        &self,
        bearer: &str,
        repair_id: Uuid,
        reason: &str,
    ) -> HubResult<ReplacementRequest> {
        let caller = self.gate.authorize(bearer, &[Role::Lab, Role::Store]).await?;
        self.engine
            .request_replacement(&caller, repair_id, reason)
            .await
    }

    pub async fn resolve_replacement(
        &self,
        bearer: &str,
        request_id: Uuid,
        decision: Decision,
        notes: Option<String>,
    ) -> HubResult<ReplacementOutcome> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.engine
            .resolve_replacement(&caller, request_id, decision, notes)
            .await
    }

    pub async fn set_repair_type(
        &self,
        bearer: &str,
        repair_id: Uuid,
        repair_type_id: Option<Uuid>,
    ) -> HubResult<Repair> {
        let caller = self.gate.authorize(bearer, &[Role::Lab, Role::Admin]).await?;
        self.engine
            .set_repair_type(&caller, repair_id, repair_type_id)
            .await
    }

    /// System sweep; not reachable with a bearer token.
    pub async fn expire_lapsed_warranties(&self, now: DateTime<Utc>) -> HubResult<Vec<Uuid>> {
        self.engine.expire_lapsed(now).await
    }

    // -----------------------------------------------------------------------
    // Lab ledger
    // -----------------------------------------------------------------------

    pub async fn create_repair_type(
        &self,
        bearer: &str,
        input: CreateRepairType,
    ) -> HubResult<RepairType> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.ledger.create_repair_type(&caller, input).await
    }

    pub async fn update_repair_type(
        &self,
        bearer: &str,
        id: Uuid,
        input: UpdateRepairType,
    ) -> HubResult<RepairType> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.ledger.update_repair_type(&caller, id, input).await
    }

    pub async fn delete_repair_type(&self, bearer: &str, id: Uuid) -> HubResult<()> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.ledger.delete_repair_type(&caller, id).await
    }

    pub async fn list_repair_types(
        &self,
        bearer: &str,
        include_inactive: bool,
    ) -> HubResult<Vec<RepairType>> {
        let caller = self.gate.authenticate(bearer).await?;
        self.ledger.list_repair_types(&caller, include_inactive).await
    }

    pub async fn set_lab_price(
        &self,
        bearer: &str,
        input: SetLabRepairPrice,
    ) -> HubResult<LabRepairPrice> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.ledger.set_lab_price(&caller, input).await
    }

    pub async fn remove_lab_price(&self, bearer: &str, price_id: Uuid) -> HubResult<()> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.ledger.remove_lab_price(&caller, price_id).await
    }

    pub async fn lab_prices(&self, bearer: &str, lab_id: Uuid) -> HubResult<Vec<LabRepairPrice>> {
        let caller = self.gate.authorize(bearer, &[Role::Admin, Role::Lab]).await?;
        self.ledger.lab_prices(&caller, lab_id).await
    }

    pub async fn record_payment(
        &self,
        bearer: &str,
        input: RecordPaymentInput,
    ) -> HubResult<LabPayment> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.ledger.record_payment(&caller, input).await
    }

    pub async fn lab_payments(
        &self,
        bearer: &str,
        lab_id: Uuid,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<LabPayment>> {
        let caller = self.gate.authorize(bearer, &[Role::Admin, Role::Lab]).await?;
        self.ledger.lab_payments(&caller, lab_id, pagination).await
    }

    pub async fn lab_balance(&self, bearer: &str, lab_id: Uuid) -> HubResult<LabBalance> {
        let caller = self.gate.authorize(bearer, &[Role::Admin, Role::Lab]).await?;
        self.ledger.lab_balance(&caller, lab_id).await
    }

    pub async fn lab_balances(&self, bearer: &str) -> HubResult<Vec<LabBalance>> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.ledger.lab_balances(&caller).await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn list_devices(
        &self,
        bearer: &str,
        filter: DeviceFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Device>> {
        let caller = self.gate.authenticate(bearer).await?;
        self.queries.list_devices(&caller, filter, pagination).await
    }

    pub async fn find_device_by_imei(&self, bearer: &str, imei: &str) -> HubResult<Option<Device>> {
        let caller = self.gate.authenticate(bearer).await?;
        self.queries.find_device_by_imei(&caller, imei).await
    }

    pub async fn list_warranties(
        &self,
        bearer: &str,
        filter: WarrantyFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Warranty>> {
        let caller = self.gate.authenticate(bearer).await?;
        self.queries.list_warranties(&caller, filter, pagination).await
    }

    pub async fn list_repairs(
        &self,
        bearer: &str,
        filter: RepairFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Repair>> {
        let caller = self.gate.authenticate(bearer).await?;
        self.queries.list_repairs(&caller, filter, pagination).await
    }

    pub async fn list_replacement_requests(
        &self,
        bearer: &str,
        filter: ReplacementFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<ReplacementRequest>> {
        let caller = self.gate.authenticate(bearer).await?;
        self.queries
            .list_replacement_requests(&caller, filter, pagination)
            .await
    }

    pub async fn list_profiles(
        &self,
        bearer: &str,
        filter: ProfileFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Profile>> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.queries.list_profiles(&caller, filter, pagination).await
    }

    pub async fn audit_trail(
        &self,
        bearer: &str,
        entity_type: &str,
        entity_id: Uuid,
    ) -> HubResult<Vec<AuditLogEntry>> {
        let caller = self.gate.authorize(bearer, &[Role::Admin]).await?;
        self.queries
            .audit_trail(&caller, entity_type, entity_id)
            .await
    }
}

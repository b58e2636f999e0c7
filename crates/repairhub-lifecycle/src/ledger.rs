//! The lab ledger: the repair-type catalog, per-lab repair prices,
//! payments to labs and the balances derived from them.
//!
//! | Operation                 | admin    | lab         | store       |
//! |---------------------------|----------|-------------|-------------|
//! | manage repair types       | yes      | forbidden   | forbidden   |
//! | list repair types         | all      | active only | active only |
//! | set / remove lab prices   | yes      | forbidden   | forbidden   |
//! | read lab prices, payments | any lab  | own         | forbidden   |
//! | record payments           | yes      | forbidden   | forbidden   |
//! | lab balance               | any lab  | own         | forbidden   |
//! | all lab balances          | yes      | forbidden   | forbidden   |

use chrono::{DateTime, Utc};
use repairhub_auth::gate::Caller;
use repairhub_core::error::{ConflictKind, ForbiddenReason, HubError, HubResult};
use repairhub_core::models::change::{ChangeEvent, LifecycleTable};
use repairhub_core::models::payment::{CreateLabPayment, LabBalance, LabPayment};
use repairhub_core::models::pricing::{
    CreateRepairType, LabRepairPrice, RepairType, SetLabRepairPrice, UpdateRepairType,
};
use repairhub_core::models::profile::{Profile, Role};
use repairhub_core::query::{PaginatedResult, Pagination, ProfileFilter, RepairFilter, RowScope};
use repairhub_core::repository::{
    AuditLogRepository, LabPaymentRepository, LabPriceRepository, ProfileStore, RepairRepository,
    RepairTypeRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::engine::{append_audit, profile_with_role};
use crate::feed::ChangeFeed;
use crate::stores::LifecycleStores;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentInput {
    pub lab_id: Uuid,
    pub amount: f64,
    /// Defaults to now.
    pub payment_date: Option<DateTime<Utc>>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

pub struct LabLedger<S, P, A> {
    stores: S,
    profiles: P,
    audit: A,
    feed: ChangeFeed,
}

impl<S, P, A> LabLedger<S, P, A>
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

    // -----------------------------------------------------------------------
    // Repair-type catalog
    // -----------------------------------------------------------------------

    pub async fn create_repair_type(
        &self,
        caller: &Caller,
        input: CreateRepairType,
    ) -> HubResult<RepairType> {
        caller.require(&[Role::Admin])?;
        input.validate()?;

        let repair_type = self.stores.repair_types().create(input).await?;
        info!(repair_type_id = %repair_type.id, name = %repair_type.name, "repair type created");
        self.record(
            caller,
            "repair_type.created",
            "repair_type",
            repair_type.id,
            json!({ "name": repair_type.name }),
        )
        .await;
        self.feed.publish(ChangeEvent::insert(LifecycleTable::RepairTypes));
        Ok(repair_type)
    }

    pub async fn update_repair_type(
        &self,
        caller: &Caller,
        id: Uuid,
        input: UpdateRepairType,
    ) -> HubResult<RepairType> {
        caller.require(&[Role::Admin])?;
        input.validate()?;

        let repair_type = self.stores.repair_types().update(id, input).await?;
        self.record(
            caller,
            "repair_type.updated",
            "repair_type",
            id,
            json!({ "name": repair_type.name, "is_active": repair_type.is_active }),
        )
        .await;
        self.feed.publish(ChangeEvent::update(LifecycleTable::RepairTypes));
        Ok(repair_type)
    }

    /// Delete a repair type and its lab prices. Refused while any repair
    /// is classified with it; deactivate it instead.
    pub async fn delete_repair_type(&self, caller: &Caller, id: Uuid) -> HubResult<()> {
        caller.require(&[Role::Admin])?;

        let repair_type = self.stores.repair_types().get_by_id(id).await?;
        let referencing = self
            .stores
            .repairs()
            .list(
                RowScope::All,
                RepairFilter {
                    repair_type_id: Some(id),
                    ..Default::default()
                },
                Pagination { offset: 0, limit: 1 },
            )
            .await?;
        if referencing.total > 0 {
            return Err(HubError::conflict(
                ConflictKind::InUse,
                format!(
                    "repair type '{}' is used by {} repairs",
                    repair_type.name, referencing.total
                ),
            ));
        }

        self.stores.repair_types().delete(id).await?;
        info!(repair_type_id = %id, name = %repair_type.name, "repair type deleted");
        self.record(
            caller,
            "repair_type.deleted",
            "repair_type",
            id,
            json!({ "name": repair_type.name }),
        )
        .await;
        self.feed.publish(ChangeEvent::update(LifecycleTable::RepairTypes));
        self.feed
            .publish(ChangeEvent::update(LifecycleTable::LabRepairPrices));
        Ok(())
    }

    /// Admins may include inactive types; everyone else sees the active
    /// catalog only.
    pub async fn list_repair_types(
        &self,
        caller: &Caller,
        include_inactive: bool,
    ) -> HubResult<Vec<RepairType>> {
        let active_only = !(include_inactive && caller.role == Role::Admin);
        self.stores.repair_types().list(active_only).await
    }

    // -----------------------------------------------------------------------
    // Lab prices
    // -----------------------------------------------------------------------

    /// Set what `input.lab_id` is paid for one repair of a type.
    pub async fn set_lab_price(
        &self,
        caller: &Caller,
        input: SetLabRepairPrice,
    ) -> HubResult<LabRepairPrice> {
        caller.require(&[Role::Admin])?;
        input.validate()?;
        profile_with_role(&self.profiles, input.lab_id, Role::Lab).await?;
        self.stores
            .repair_types()
            .get_by_id(input.repair_type_id)
            .await?;

        let price = self.stores.prices().upsert(input).await?;
        info!(
            lab_id = %price.lab_id,
            repair_type_id = %price.repair_type_id,
            price = price.price,
            "lab price set"
        );
        self.record(
            caller,
            "lab_price.set",
            "lab_repair_price",
            price.id,
            json!({
                "lab_id": price.lab_id,
                "repair_type_id": price.repair_type_id,
                "price": price.price,
                "is_active": price.is_active,
            }),
        )
        .await;
        self.feed
            .publish(ChangeEvent::update(LifecycleTable::LabRepairPrices));
        Ok(price)
    }

    pub async fn remove_lab_price(&self, caller: &Caller, price_id: Uuid) -> HubResult<()> {
        caller.require(&[Role::Admin])?;

        let price = self.stores.prices().get_by_id(price_id).await?;
        self.stores.prices().delete(price_id).await?;
        info!(lab_id = %price.lab_id, repair_type_id = %price.repair_type_id, "lab price removed");
        self.record(
            caller,
            "lab_price.removed",
            "lab_repair_price",
            price_id,
            json!({ "lab_id": price.lab_id, "repair_type_id": price.repair_type_id }),
        )
        .await;
        self.feed
            .publish(ChangeEvent::update(LifecycleTable::LabRepairPrices));
        Ok(())
    }

    pub async fn lab_prices(&self, caller: &Caller, lab_id: Uuid) -> HubResult<Vec<LabRepairPrice>> {
        ensure_lab_access(caller, lab_id)?;
        self.stores.prices().list_for_lab(lab_id).await
    }

    // -----------------------------------------------------------------------
    // Payments and balances
    // -----------------------------------------------------------------------

    pub async fn record_payment(
        &self,
        caller: &Caller,
        input: RecordPaymentInput,
    ) -> HubResult<LabPayment> {
        caller.require(&[Role::Admin])?;
        let create = CreateLabPayment {
            lab_id: input.lab_id,
            amount: input.amount,
            payment_date: input.payment_date.unwrap_or_else(Utc::now),
            reference: input.reference,
            notes: input.notes,
            created_by: caller.identity_id,
        };
        create.validate()?;
        profile_with_role(&self.profiles, create.lab_id, Role::Lab).await?;

        let payment = self.stores.payments().create(create).await?;
        info!(
            payment_id = %payment.id,
            lab_id = %payment.lab_id,
            amount = payment.amount,
            "lab payment recorded"
        );
        self.record(
            caller,
            "payment.recorded",
            "lab_payment",
            payment.id,
            json!({
                "lab_id": payment.lab_id,
                "amount": payment.amount,
                "reference": payment.reference,
            }),
        )
        .await;
        self.feed.publish(ChangeEvent::insert(LifecycleTable::LabPayments));
        Ok(payment)
    }

    pub async fn lab_payments(
        &self,
        caller: &Caller,
        lab_id: Uuid,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<LabPayment>> {
        ensure_lab_access(caller, lab_id)?;
        self.stores.payments().list_for_lab(lab_id, pagination).await
    }

    pub async fn lab_balance(&self, caller: &Caller, lab_id: Uuid) -> HubResult<LabBalance> {
        ensure_lab_access(caller, lab_id)?;
        let lab = profile_with_role(&self.profiles, lab_id, Role::Lab).await?;
        self.balance_of(lab).await
    }

    /// Balances of every active lab, largest amount owed first.
    pub async fn lab_balances(&self, caller: &Caller) -> HubResult<Vec<LabBalance>> {
        caller.require(&[Role::Admin])?;

        let filter = ProfileFilter {
            role: Some(Role::Lab),
            active: Some(true),
        };
        let mut labs = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .profiles
                .list(
                    RowScope::All,
                    filter.clone(),
                    Pagination::page(page, Pagination::MAX_LIMIT),
                )
                .await?;
            let fetched = batch.items.len() as u64;
            labs.extend(batch.items);
            if fetched == 0 || labs.len() as u64 >= batch.total {
                break;
            }
            page += 1;
        }

        let mut balances = Vec::with_capacity(labs.len());
        for lab in labs {
            balances.push(self.balance_of(lab).await?);
        }
        balances.sort_by(|a, b| b.balance.total_cmp(&a.balance));
        Ok(balances)
    }

    async fn balance_of(&self, lab: Profile) -> HubResult<LabBalance> {
        let earned = self.stores.repairs().completed_totals(lab.id).await?;
        let paid = self.stores.payments().totals(lab.id).await?;
        Ok(LabBalance::new(lab.id, lab.full_name, lab.email, earned, paid))
    }

    async fn record(
        &self,
        caller: &Caller,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        metadata: serde_json::Value,
    ) {
        append_audit(
            &self.audit,
            caller.identity_id,
            action,
            entity_type,
            entity_id,
            metadata,
        )
        .await;
    }
}

/// Admins reach every lab's books; a lab reaches only its own.
fn ensure_lab_access(caller: &Caller, lab_id: Uuid) -> HubResult<()> {
    caller.require(&[Role::Admin, Role::Lab])?;
    if caller.role == Role::Lab && caller.identity_id != lab_id {
        return Err(HubError::Forbidden {
            reason: ForbiddenReason::Role,
            message: format!("lab {lab_id} belongs to another account"),
        });
    }
    Ok(())
}

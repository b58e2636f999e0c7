//! Integration tests for the repair-type catalog, lab pricing, payments
//! and balances over the in-memory stores.

use chrono::{Duration, Utc};
use repairhub_auth::gate::{Caller, Resolution};
use repairhub_core::error::{ConflictKind, ErrorKind, ForbiddenReason};
use repairhub_core::models::change::{ChangeEvent, LifecycleTable};
use repairhub_core::models::device::CreateDevice;
use repairhub_core::models::pricing::{CreateRepairType, SetLabRepairPrice, UpdateRepairType};
use repairhub_core::models::profile::{Profile, Role};
use repairhub_core::models::repair::{FaultType, Repair, RepairStatus};
use repairhub_core::models::warranty::Customer;
use repairhub_core::query::Pagination;
use repairhub_lifecycle::{
    ActivateWarrantyInput, ChangeFeed, LabLedger, LifecycleEngine, OpenRepairInput,
    RecordPaymentInput, SharedStores,
};
use repairhub_testkit::{FakeAuditLog, FakeProfileStore, InMemoryLifecycle};
use uuid::Uuid;

type Shared = SharedStores<InMemoryLifecycle>;

struct Harness {
    engine: LifecycleEngine<Shared, FakeProfileStore, FakeAuditLog>,
    ledger: LabLedger<Shared, FakeProfileStore, FakeAuditLog>,
    audit: FakeAuditLog,
    feed: ChangeFeed,
    admin: Caller,
    shop: Caller,
    lab: Caller,
    other_lab: Caller,
    next_device: std::cell::Cell<u64>,
}

fn caller(role: Role) -> Caller {
    Caller {
        identity_id: Uuid::new_v4(),
        email: format!("{}-{role}@example.com", Uuid::new_v4().simple()),
        role,
        is_active: true,
        resolved_via: Resolution::Claims,
    }
}

fn profile_of(caller: &Caller, name: &str) -> Profile {
    let now = Utc::now() - Duration::days(30);
    Profile {
        id: caller.identity_id,
        email: caller.email.clone(),
        full_name: name.into(),
        phone: None,
        role: caller.role,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn harness() -> Harness {
    let store = InMemoryLifecycle::default();
    let profiles = FakeProfileStore::new();
    let audit = FakeAuditLog::default();
    let feed = ChangeFeed::default();
    let engine = LifecycleEngine::new(
        SharedStores::shared(store.clone()),
        profiles.clone(),
        audit.clone(),
        feed.clone(),
    );
    let ledger = LabLedger::new(
        SharedStores::shared(store),
        profiles.clone(),
        audit.clone(),
        feed.clone(),
    );
    let admin = caller(Role::Admin);
    let shop = caller(Role::Store);
    let lab = caller(Role::Lab);
    let other_lab = caller(Role::Lab);
    profiles.seed(profile_of(&admin, "Root"));
    profiles.seed(profile_of(&shop, "Corner Shop"));
    profiles.seed(profile_of(&lab, "Fixit Lab"));
    profiles.seed(profile_of(&other_lab, "Board Doctors"));
    Harness {
        engine,
        ledger,
        audit,
        feed,
        admin,
        shop,
        lab,
        other_lab,
        next_device: std::cell::Cell::new(1),
    }
}

/// A valid 15-digit IMEI derived from `n`.
fn imei(n: u64) -> String {
    let body = format!("{:014}", 35_000_000_000_000 + n);
    let sum: u32 = body
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    format!("{body}{}", (10 - sum % 10) % 10)
}

fn price(lab: &Caller, repair_type_id: Uuid, amount: f64) -> SetLabRepairPrice {
    SetLabRepairPrice {
        lab_id: lab.identity_id,
        repair_type_id,
        price: amount,
        is_active: true,
        notes: None,
    }
}

fn payment(lab: &Caller, amount: f64) -> RecordPaymentInput {
    RecordPaymentInput {
        lab_id: lab.identity_id,
        amount,
        payment_date: None,
        reference: Some("TRX-1".into()),
        notes: None,
    }
}

impl Harness {
    async fn repair_type(&self, name: &str) -> Uuid {
        self.ledger
            .create_repair_type(
                &self.admin,
                CreateRepairType {
                    name: name.into(),
                    description: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    /// Register and activate a device, then open a repair at `lab`.
    async fn open_repair(&self, lab: &Caller) -> Repair {
        let n = self.next_device.get();
        self.next_device.set(n + 1);
        let device = self
            .engine
            .register_device(
                &self.admin,
                CreateDevice {
                    imei: imei(n),
                    imei2: None,
                    model: "Galaxy A54".into(),
                    warranty_months: 12,
                },
            )
            .await
            .unwrap();
        self.engine
            .activate_warranty(
                &self.shop,
                ActivateWarrantyInput {
                    device_id: device.id,
                    customer: Customer {
                        name: "A".into(),
                        phone: "050".into(),
                    },
                    duration_months: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        self.engine
            .open_repair(
                lab,
                OpenRepairInput {
                    device_id: device.id,
                    fault_type: FaultType::Screen,
                    fault_description: None,
                    lab_id: None,
                },
            )
            .await
            .unwrap()
    }

    async fn complete(&self, lab: &Caller, repair_id: Uuid, cost: Option<f64>) -> Repair {
        self.engine
            .advance_repair(lab, repair_id, RepairStatus::InProgress, None)
            .await
            .unwrap();
        self.engine
            .advance_repair(lab, repair_id, RepairStatus::Completed, cost)
            .await
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Repair-type catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repair_types_are_managed_by_admins_only() {
    let h = harness();
    let screen = h.repair_type("Screen replacement").await;
    let battery = h.repair_type("Battery swap").await;

    for c in [&h.lab, &h.shop] {
        let err = h
            .ledger
            .create_repair_type(
                c,
                CreateRepairType {
                    name: "Speaker".into(),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));
    }
    let err = h
        .ledger
        .delete_repair_type(&h.lab, screen)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));

    let err = h
        .ledger
        .create_repair_type(
            &h.admin,
            CreateRepairType {
                name: "Screen replacement".into(),
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict(ConflictKind::Duplicate));

    let retired = h
        .ledger
        .update_repair_type(
            &h.admin,
            battery,
            UpdateRepairType {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!retired.is_active);

    let for_lab = h.ledger.list_repair_types(&h.lab, true).await.unwrap();
    assert_eq!(for_lab.iter().map(|t| t.id).collect::<Vec<_>>(), [screen]);
    let for_admin = h.ledger.list_repair_types(&h.admin, true).await.unwrap();
    assert_eq!(for_admin.len(), 2);

    assert_eq!(
        h.audit.actions(),
        vec![
            "repair_type.created",
            "repair_type.created",
            "repair_type.updated"
        ]
    );
}

#[tokio::test]
async fn repair_types_in_use_cannot_be_deleted() {
    let h = harness();
    let screen = h.repair_type("Screen").await;
    let board = h.repair_type("Board").await;
    h.ledger
        .set_lab_price(&h.admin, price(&h.lab, board, 300.0))
        .await
        .unwrap();

    let repair = h.open_repair(&h.lab).await;
    h.engine
        .set_repair_type(&h.lab, repair.id, Some(screen))
        .await
        .unwrap();

    let err = h
        .ledger
        .delete_repair_type(&h.admin, screen)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict(ConflictKind::InUse));

    h.ledger.delete_repair_type(&h.admin, board).await.unwrap();
    assert!(
        h.ledger
            .lab_prices(&h.admin, h.lab.identity_id)
            .await
            .unwrap()
            .is_empty()
    );
    let err = h
        .ledger
        .delete_repair_type(&h.admin, board)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn only_active_types_classify_open_repairs() {
    let h = harness();
    let screen = h.repair_type("Screen").await;
    let retired = h.repair_type("Retired").await;
    h.ledger
        .update_repair_type(
            &h.admin,
            retired,
            UpdateRepairType {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let repair = h.open_repair(&h.lab).await;

    let err = h
        .engine
        .set_repair_type(&h.lab, repair.id, Some(retired))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .engine
        .set_repair_type(&h.lab, repair.id, Some(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h
        .engine
        .set_repair_type(&h.other_lab, repair.id, Some(screen))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));

    let typed = h
        .engine
        .set_repair_type(&h.lab, repair.id, Some(screen))
        .await
        .unwrap();
    assert_eq!(typed.repair_type_id, Some(screen));

    h.complete(&h.lab, repair.id, Some(10.0)).await;
    let err = h
        .engine
        .set_repair_type(&h.lab, repair.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ---------------------------------------------------------------------------
// Lab prices
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lab_prices_are_set_by_admins_and_read_by_their_lab() {
    let h = harness();
    let screen = h.repair_type("Screen").await;

    let set = h
        .ledger
        .set_lab_price(&h.admin, price(&h.lab, screen, 120.0))
        .await
        .unwrap();
    let reset = h
        .ledger
        .set_lab_price(&h.admin, price(&h.lab, screen, 135.0))
        .await
        .unwrap();
    assert_eq!(set.id, reset.id);

    let err = h
        .ledger
        .set_lab_price(&h.lab, price(&h.lab, screen, 500.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));

    let err = h
        .ledger
        .set_lab_price(&h.admin, price(&h.lab, screen, -1.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .ledger
        .set_lab_price(&h.admin, price(&h.shop, screen, 10.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .ledger
        .set_lab_price(&h.admin, price(&h.lab, Uuid::new_v4(), 10.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let own = h
        .ledger
        .lab_prices(&h.lab, h.lab.identity_id)
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].price, 135.0);

    let err = h
        .ledger
        .lab_prices(&h.other_lab, h.lab.identity_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));
    let err = h
        .ledger
        .lab_prices(&h.shop, h.lab.identity_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));

    h.ledger.remove_lab_price(&h.admin, set.id).await.unwrap();
    assert!(
        h.ledger
            .lab_prices(&h.admin, h.lab.identity_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn completion_cost_defaults_to_the_lab_price() {
    let h = harness();
    let screen = h.repair_type("Screen").await;
    let board = h.repair_type("Board").await;
    h.ledger
        .set_lab_price(&h.admin, price(&h.lab, screen, 120.0))
        .await
        .unwrap();
    let mut inactive = price(&h.lab, board, 300.0);
    inactive.is_active = false;
    h.ledger.set_lab_price(&h.admin, inactive).await.unwrap();

    let priced = h.open_repair(&h.lab).await;
    h.engine
        .set_repair_type(&h.lab, priced.id, Some(screen))
        .await
        .unwrap();
    let priced = h.complete(&h.lab, priced.id, None).await;
    assert_eq!(priced.cost, Some(120.0));

    let overridden = h.open_repair(&h.lab).await;
    h.engine
        .set_repair_type(&h.lab, overridden.id, Some(screen))
        .await
        .unwrap();
    let overridden = h.complete(&h.lab, overridden.id, Some(80.0)).await;
    assert_eq!(overridden.cost, Some(80.0));

    let unpriced = h.open_repair(&h.lab).await;
    h.engine
        .set_repair_type(&h.lab, unpriced.id, Some(board))
        .await
        .unwrap();
    let unpriced = h.complete(&h.lab, unpriced.id, None).await;
    assert_eq!(unpriced.cost, None);

    let untyped = h.open_repair(&h.lab).await;
    let untyped = h.complete(&h.lab, untyped.id, None).await;
    assert_eq!(untyped.cost, None);

    // The other lab has no price for screens.
    let elsewhere = h.open_repair(&h.other_lab).await;
    h.engine
        .set_repair_type(&h.other_lab, elsewhere.id, Some(screen))
        .await
        .unwrap();
    let elsewhere = h.complete(&h.other_lab, elsewhere.id, None).await;
    assert_eq!(elsewhere.cost, None);
}

// ---------------------------------------------------------------------------
// Payments and balances
// ---------------------------------------------------------------------------

#[tokio::test]
async fn balance_is_earned_minus_paid() {
    let h = harness();
    let screen = h.repair_type("Screen").await;
    h.ledger
        .set_lab_price(&h.admin, price(&h.lab, screen, 150.0))
        .await
        .unwrap();
    for _ in 0..2 {
        let repair = h.open_repair(&h.lab).await;
        h.engine
            .set_repair_type(&h.lab, repair.id, Some(screen))
            .await
            .unwrap();
        h.complete(&h.lab, repair.id, None).await;
    }
    // Open repairs earn nothing yet.
    h.open_repair(&h.lab).await;

    let paid = h
        .ledger
        .record_payment(&h.admin, payment(&h.lab, 100.0))
        .await
        .unwrap();
    assert_eq!(paid.created_by, h.admin.identity_id);

    let balance = h
        .ledger
        .lab_balance(&h.lab, h.lab.identity_id)
        .await
        .unwrap();
    assert_eq!(balance.lab_name, "Fixit Lab");
    assert_eq!(balance.lab_email, h.lab.email);
    assert_eq!(balance.total_earned, 300.0);
    assert_eq!(balance.total_paid, 100.0);
    assert_eq!(balance.balance, 200.0);
    assert_eq!(balance.repairs_count, 2);
    assert_eq!(balance.payments_count, 1);

    let admin_view = h
        .ledger
        .lab_balance(&h.admin, h.lab.identity_id)
        .await
        .unwrap();
    assert_eq!(admin_view, balance);

    let err = h
        .ledger
        .lab_balance(&h.other_lab, h.lab.identity_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));
    let err = h
        .ledger
        .lab_balance(&h.shop, h.lab.identity_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));
    let err = h
        .ledger
        .lab_balance(&h.admin, h.shop.identity_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn payments_are_recorded_by_admins_only() {
    let h = harness();

    let err = h
        .ledger
        .record_payment(&h.lab, payment(&h.lab, 50.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));

    for amount in [0.0, -10.0, f64::NAN] {
        let err = h
            .ledger
            .record_payment(&h.admin, payment(&h.lab, amount))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    let err = h
        .ledger
        .record_payment(&h.admin, payment(&h.shop, 50.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut older = payment(&h.lab, 40.0);
    older.payment_date = Some(Utc::now() - Duration::days(7));
    h.ledger.record_payment(&h.admin, older).await.unwrap();
    h.ledger
        .record_payment(&h.admin, payment(&h.lab, 60.0))
        .await
        .unwrap();

    let page = h
        .ledger
        .lab_payments(&h.lab, h.lab.identity_id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].amount, 60.0);

    let err = h
        .ledger
        .lab_payments(&h.other_lab, h.lab.identity_id, Pagination::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));

    assert_eq!(
        h.audit.actions(),
        vec!["payment.recorded", "payment.recorded"]
    );
}

#[tokio::test]
async fn all_balances_list_owed_labs_first() {
    let h = harness();
    let screen = h.repair_type("Screen").await;
    h.ledger
        .set_lab_price(&h.admin, price(&h.other_lab, screen, 90.0))
        .await
        .unwrap();
    let repair = h.open_repair(&h.other_lab).await;
    h.engine
        .set_repair_type(&h.other_lab, repair.id, Some(screen))
        .await
        .unwrap();
    h.complete(&h.other_lab, repair.id, None).await;
    h.ledger
        .record_payment(&h.admin, payment(&h.lab, 25.0))
        .await
        .unwrap();

    let balances = h.ledger.lab_balances(&h.admin).await.unwrap();
    let order: Vec<_> = balances.iter().map(|b| (b.lab_id, b.balance)).collect();
    assert_eq!(
        order,
        [(h.other_lab.identity_id, 90.0), (h.lab.identity_id, -25.0)]
    );

    let err = h.ledger.lab_balances(&h.lab).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::Role));
}

#[tokio::test]
async fn ledger_writes_publish_change_events() {
    let h = harness();
    let mut events = h.feed.subscribe();

    let screen = h.repair_type("Screen").await;
    h.ledger
        .set_lab_price(&h.admin, price(&h.lab, screen, 120.0))
        .await
        .unwrap();
    h.ledger
        .record_payment(&h.admin, payment(&h.lab, 10.0))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        [
            ChangeEvent::insert(LifecycleTable::RepairTypes),
            ChangeEvent::update(LifecycleTable::LabRepairPrices),
            ChangeEvent::insert(LifecycleTable::LabPayments),
        ]
    );
}

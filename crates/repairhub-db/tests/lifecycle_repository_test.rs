//! Integration tests for device, warranty, repair, replacement and audit
//! repositories using in-memory SurrealDB.

use chrono::{Duration, Utc};
use repairhub_core::error::{ConflictKind, ErrorKind};
use repairhub_core::models::audit::CreateAuditLogEntry;
use repairhub_core::models::device::{CreateDevice, Device, WarrantyStatus};
use repairhub_core::models::repair::{CreateRepair, FaultType, RepairStatus, RepairStatusChange};
use repairhub_core::models::replacement::{
    CreateReplacementRequest, Decision, RequestStatus, ResolveReplacement,
};
use repairhub_core::models::warranty::{ActivateWarranty, Customer, Warranty};
use repairhub_core::query::{
    DeviceFilter, Pagination, RepairFilter, ReplacementFilter, RowScope, WarrantyFilter,
};
use repairhub_core::repository::{
    AuditLogRepository, DeviceRepository, RepairRepository, ReplacementRepository,
    WarrantyRepository,
};
use repairhub_db::repository::{
    SurrealAuditLogRepository, SurrealDeviceRepository, SurrealRepairRepository,
    SurrealReplacementRepository, SurrealWarrantyRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

struct Repos {
    devices: SurrealDeviceRepository<Db>,
    warranties: SurrealWarrantyRepository<Db>,
    repairs: SurrealRepairRepository<Db>,
    replacements: SurrealReplacementRepository<Db>,
    audit: SurrealAuditLogRepository<Db>,
}

async fn setup() -> Repos {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    repairhub_db::run_migrations(&db).await.unwrap();
    Repos {
        devices: SurrealDeviceRepository::new(db.clone()),
        warranties: SurrealWarrantyRepository::new(db.clone()),
        repairs: SurrealRepairRepository::new(db.clone()),
        replacements: SurrealReplacementRepository::new(db.clone()),
        audit: SurrealAuditLogRepository::new(db),
    }
}

async fn device(repos: &Repos, imei: &str) -> Device {
    repos
        .devices
        .create(CreateDevice {
            imei: imei.into(),
            imei2: None,
            model: "Galaxy A54".into(),
            warranty_months: 12,
        })
        .await
        .unwrap()
}

async fn activate(repos: &Repos, device_id: Uuid, store_id: Uuid) -> Warranty {
    let now = Utc::now();
    repos
        .warranties
        .activate(ActivateWarranty {
            device_id,
            store_id: Some(store_id),
            customer: Customer {
                name: "Dana Customer".into(),
                phone: "+15550199".into(),
            },
            activation_date: now,
            expiry_date: now + Duration::days(365),
            notes: None,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn device_create_lookup_and_duplicate() {
    let repos = setup().await;
    let created = repos
        .devices
        .create(CreateDevice {
            imei: "490154203237518".into(),
            imei2: Some("356938035643809".into()),
            model: "Pixel 8".into(),
            warranty_months: 24,
        })
        .await
        .unwrap();
    assert_eq!(created.warranty_status, WarrantyStatus::New);

    let by_second = repos
        .devices
        .find_by_imei("356938035643809")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_second.id, created.id);
    assert!(
        repos
            .devices
            .find_by_imei("356938035643817")
            .await
            .unwrap()
            .is_none()
    );

    let err = repos
        .devices
        .create(CreateDevice {
            imei: "490154203237518".into(),
            imei2: None,
            model: "Pixel 8".into(),
            warranty_months: 24,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict(ConflictKind::Duplicate));
}

#[tokio::test]
async fn activation_is_atomic_and_guarded() {
    let repos = setup().await;
    let d = device(&repos, "490154203237518").await;
    let store = Uuid::new_v4();

    let warranty = activate(&repos, d.id, store).await;
    assert!(warranty.is_active);
    assert_eq!(warranty.store_id, Some(store));
    assert_eq!(
        repos.devices.get_by_id(d.id).await.unwrap().warranty_status,
        WarrantyStatus::Active
    );

    let now = Utc::now();
    let err = repos
        .warranties
        .activate(ActivateWarranty {
            device_id: d.id,
            store_id: Some(store),
            customer: Customer {
                name: "Someone Else".into(),
                phone: "+15550000".into(),
            },
            activation_date: now,
            expiry_date: now + Duration::days(30),
            notes: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict(ConflictKind::AlreadyActive));

    let page = repos
        .warranties
        .list(
            RowScope::All,
            WarrantyFilter {
                device_id: Some(d.id),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1, "failed activation must not leave a row");
}

#[tokio::test]
async fn lapsed_warranties_and_status_cas() {
    let repos = setup().await;
    let d = device(&repos, "490154203237518").await;
    let w = activate(&repos, d.id, Uuid::new_v4()).await;

    assert!(repos.warranties.list_lapsed(Utc::now()).await.unwrap().is_empty());
    let later = w.expiry_date + Duration::seconds(1);
    let lapsed = repos.warranties.list_lapsed(later).await.unwrap();
    assert_eq!(lapsed.len(), 1);
    assert_eq!(lapsed[0].id, w.id);

    assert!(
        repos
            .devices
            .transition_status(d.id, WarrantyStatus::Active, WarrantyStatus::Expired)
            .await
            .unwrap()
    );
    assert!(
        !repos
            .devices
            .transition_status(d.id, WarrantyStatus::Active, WarrantyStatus::Expired)
            .await
            .unwrap()
    );
    // Expired devices are no longer reported as lapsed.
    assert!(repos.warranties.list_lapsed(later).await.unwrap().is_empty());
}

#[tokio::test]
async fn repair_status_compare_and_set() {
    let repos = setup().await;
    let d = device(&repos, "490154203237518").await;
    let lab = Uuid::new_v4();
    let repair = repos
        .repairs
        .create(CreateRepair {
            device_id: d.id,
            lab_id: Some(lab),
            warranty_id: None,
            fault_type: FaultType::Screen,
            fault_description: Some("cracked".into()),
        })
        .await
        .unwrap();
    assert_eq!(repair.status, RepairStatus::Received);

    let moved = repos
        .repairs
        .update_status(
            repair.id,
            RepairStatus::Received,
            RepairStatusChange {
                status: RepairStatus::InProgress,
                cost: None,
                completed_at: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.status, RepairStatus::InProgress);

    let stale = repos
        .repairs
        .update_status(
            repair.id,
            RepairStatus::Received,
            RepairStatusChange {
                status: RepairStatus::Cancelled,
                cost: None,
                completed_at: None,
            },
        )
        .await
        .unwrap();
    assert!(stale.is_none());

    let done = repos
        .repairs
        .update_status(
            repair.id,
            RepairStatus::InProgress,
            RepairStatusChange {
                status: RepairStatus::Completed,
                cost: Some(49.5),
                completed_at: Some(Utc::now()),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.cost, Some(49.5));
    assert!(done.completed_at.is_some());

    let own = repos
        .repairs
        .list(RowScope::OwnedBy(lab), RepairFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(own.total, 1);
    let other = repos
        .repairs
        .list(
            RowScope::OwnedBy(Uuid::new_v4()),
            RepairFilter::default(),
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(other.total, 0);
}

#[tokio::test]
async fn replacement_request_and_single_resolution() {
    let repos = setup().await;
    let d = device(&repos, "490154203237518").await;
    let w = activate(&repos, d.id, Uuid::new_v4()).await;
    let lab = Uuid::new_v4();
    let repair = repos
        .repairs
        .create(CreateRepair {
            device_id: d.id,
            lab_id: Some(lab),
            warranty_id: Some(w.id),
            fault_type: FaultType::Board,
            fault_description: None,
        })
        .await
        .unwrap();

    let request = repos
        .replacements
        .create(CreateReplacementRequest {
            device_id: d.id,
            repair_id: Some(repair.id),
            warranty_id: Some(w.id),
            requester_id: lab,
            reason: "board is dead".into(),
        })
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(
        repos.repairs.get_by_id(repair.id).await.unwrap().status,
        RepairStatus::ReplacementRequested
    );
    let found = repos
        .replacements
        .find_by_repair(repair.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, request.id);

    let admin = Uuid::new_v4();
    let resolved = repos
        .replacements
        .resolve(ResolveReplacement {
            request_id: request.id,
            decision: Decision::Approved,
            admin_notes: Some("ok".into()),
            resolved_by: admin,
            resolved_at: Utc::now(),
            replace_device: Some(d.id),
            deactivate_warranty: Some(w.id),
        })
        .await
        .unwrap();
    assert_eq!(resolved.status, RequestStatus::Approved);
    assert_eq!(resolved.resolved_by, Some(admin));
    assert_eq!(
        repos.devices.get_by_id(d.id).await.unwrap().warranty_status,
        WarrantyStatus::Replaced
    );
    assert!(!repos.warranties.get_by_id(w.id).await.unwrap().is_active);

    let err = repos
        .replacements
        .resolve(ResolveReplacement {
            request_id: request.id,
            decision: Decision::Rejected,
            admin_notes: None,
            resolved_by: admin,
            resolved_at: Utc::now(),
            replace_device: None,
            deactivate_warranty: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict(ConflictKind::AlreadyResolved));
    assert_eq!(
        repos.replacements.get_by_id(request.id).await.unwrap().status,
        RequestStatus::Approved
    );

    let mine = repos
        .replacements
        .list(
            RowScope::OwnedBy(lab),
            ReplacementFilter {
                status: Some(RequestStatus::Approved),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(mine.total, 1);
}

#[tokio::test]
async fn device_list_filters_by_status_and_imei() {
    let repos = setup().await;
    let a = device(&repos, "490154203237518").await;
    device(&repos, "356938035643809").await;
    activate(&repos, a.id, Uuid::new_v4()).await;

    let active = repos
        .devices
        .list(
            DeviceFilter {
                status: Some(WarrantyStatus::Active),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(active.total, 1);
    assert_eq!(active.items[0].id, a.id);

    let by_imei = repos
        .devices
        .list(
            DeviceFilter {
                imei: Some("35693803".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_imei.total, 1);

    let paged = repos
        .devices
        .list(DeviceFilter::default(), Pagination::page(2, 1))
        .await
        .unwrap();
    assert_eq!(paged.total, 2);
    assert_eq!(paged.items.len(), 1);
}

#[tokio::test]
async fn audit_log_appends_and_lists_per_entity() {
    let repos = setup().await;
    let actor = Uuid::new_v4();
    let entity = Uuid::new_v4();

    for action in ["device.registered", "warranty.activated"] {
        repos
            .audit
            .append(CreateAuditLogEntry {
                actor_id: actor,
                action: action.into(),
                entity_type: "device".into(),
                entity_id: entity,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();
    }

    let entries = repos.audit.list_for_entity("device", entity).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.actor_id == actor));
    assert!(
        repos
            .audit
            .list_for_entity("repair", entity)
            .await
            .unwrap()
            .is_empty()
    );
}

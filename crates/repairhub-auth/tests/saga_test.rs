//! Integration tests for the identity provisioning saga.

use chrono::{Duration, Utc};
use repairhub_auth::config::AuthConfig;
use repairhub_auth::saga::{NewUser, ProvisioningSaga};
use repairhub_core::error::{ConflictKind, ErrorKind, UpstreamSystem};
use repairhub_core::models::profile::{Profile, Role};
use repairhub_testkit::{FakeAuditLog, FakeDirectory, FakeProfileStore};
use uuid::Uuid;

struct Harness {
    saga: ProvisioningSaga<FakeDirectory, FakeProfileStore, FakeAuditLog>,
    directory: FakeDirectory,
    profiles: FakeProfileStore,
    audit: FakeAuditLog,
}

fn harness() -> Harness {
    let profiles = FakeProfileStore::new();
    let directory = FakeDirectory::linked(profiles.clone());
    let audit = FakeAuditLog::default();
    let saga = ProvisioningSaga::new(
        directory.clone(),
        profiles.clone(),
        audit.clone(),
        &AuthConfig::default(),
    );
    Harness {
        saga,
        directory,
        profiles,
        audit,
    }
}

fn new_user(email: &str, role: Role) -> NewUser {
    NewUser {
        email: email.into(),
        password: "s3cret-pass".into(),
        full_name: "Lab Tech".into(),
        phone: Some("050-1234567".into()),
        role,
    }
}

fn aged_profile(id: Uuid, age_secs: i64) -> Profile {
    let created = Utc::now() - Duration::seconds(age_secs);
    Profile {
        id,
        email: "old@example.com".into(),
        full_name: "Previous Owner".into(),
        phone: None,
        role: Role::Store,
        is_active: true,
        created_at: created,
        updated_at: created,
    }
}

#[tokio::test]
async fn create_pairs_identity_and_profile() {
    let h = harness();
    let admin = Uuid::new_v4();

    let id = h
        .saga
        .create(admin, new_user("Tech@Example.com", Role::Lab))
        .await
        .unwrap();

    let identity = h.directory.snapshot(id).unwrap();
    let profile = h.profiles.snapshot(id).unwrap();
    assert_eq!(identity.id, profile.id);
    assert_eq!(identity.email, "tech@example.com");
    assert_eq!(profile.role, Role::Lab);
    assert!(profile.is_active);
    assert_eq!(h.directory.len(), 1);
    assert_eq!(h.profiles.len(), 1);
    assert_eq!(h.audit.actions(), vec!["user.created"]);
}

#[tokio::test]
async fn invalid_input_has_no_side_effects() {
    let h = harness();
    let mut input = new_user("tech@example.com", Role::Lab);
    input.password = "short".into();
    let err = h.saga.create(Uuid::new_v4(), input).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .saga
        .create(Uuid::new_v4(), new_user("not-an-email", Role::Lab))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(h.directory.calls().count("create_identity"), 0);
    assert!(h.directory.is_empty());
}

#[tokio::test]
async fn directory_failure_stops_before_profile_store() {
    let h = harness();
    h.directory.faults().fail_once("create_identity");

    let err = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream(UpstreamSystem::Directory));
    assert_eq!(h.profiles.calls().count("get"), 0);
    assert_eq!(h.profiles.calls().count("upsert"), 0);
    assert!(h.directory.is_empty());
}

#[tokio::test]
async fn profile_failure_rolls_back_identity() {
    let h = harness();
    h.profiles.faults().fail_once("upsert");

    let err = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream(UpstreamSystem::ProfileStore));
    assert!(h.directory.is_empty(), "identity must be compensated");
    assert!(h.profiles.is_empty());
    assert_eq!(h.saga.orphan_alerts(), 0);
    assert!(h.audit.actions().is_empty());
}

#[tokio::test]
async fn failed_compensation_raises_orphan_alert() {
    let h = harness();
    h.profiles.faults().fail_once("upsert");
    h.directory.faults().fail_once("delete_identity");

    let err = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap_err();

    // The caller still sees the original failure.
    assert_eq!(err.kind(), ErrorKind::Upstream(UpstreamSystem::ProfileStore));
    assert_eq!(h.saga.orphan_alerts(), 1);
    assert_eq!(h.directory.len(), 1, "identity is orphaned");
    assert!(h.profiles.is_empty());
}

#[tokio::test]
async fn stale_collision_is_rejected_and_rolled_back() {
    let h = harness();
    let reused = Uuid::new_v4();
    h.profiles.seed(aged_profile(reused, 120));
    h.directory.issue_next_id(reused);

    let err = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict(ConflictKind::IdCollision));
    assert!(h.directory.is_empty(), "no net new identity");
    assert!(h.profiles.len() <= 1, "no net new profile");
    assert_eq!(h.profiles.calls().count("upsert"), 0);
}

#[tokio::test]
async fn fresh_collision_is_overwritten() {
    let h = harness();
    let reused = Uuid::new_v4();
    h.profiles.seed(aged_profile(reused, 5));
    h.directory.issue_next_id(reused);

    let id = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap();

    assert_eq!(id, reused);
    let profile = h.profiles.snapshot(id).unwrap();
    assert_eq!(profile.full_name, "Lab Tech");
    assert_eq!(profile.role, Role::Lab);
    assert_eq!(h.profiles.len(), 1);
}

#[tokio::test]
async fn collision_lookup_failure_rolls_back() {
    let h = harness();
    h.profiles.faults().fail_once("get");

    let err = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream(UpstreamSystem::ProfileStore));
    assert!(h.directory.is_empty());
}

#[tokio::test]
async fn delete_removes_both_rows_with_one_call() {
    let h = harness();
    let id = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap();

    h.saga.delete(Uuid::new_v4(), id).await.unwrap();

    assert!(h.directory.snapshot(id).is_none());
    assert!(h.profiles.snapshot(id).is_none());
    assert_eq!(h.profiles.calls().count("delete"), 0);
}

#[tokio::test]
async fn failed_delete_leaves_profile_untouched() {
    let h = harness();
    let id = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap();
    h.directory.faults().fail_once("delete_identity");

    let err = h.saga.delete(Uuid::new_v4(), id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream(UpstreamSystem::Directory));
    assert!(h.directory.snapshot(id).is_some());
    assert!(h.profiles.snapshot(id).is_some());
}

#[tokio::test]
async fn reset_credential_tolerates_touch_failure() {
    let h = harness();
    let id = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap();
    let before = h.directory.snapshot(id).unwrap().password_hash;
    h.profiles.faults().fail_once("touch");

    h.saga
        .reset_credential(Uuid::new_v4(), id, "another-pass")
        .await
        .unwrap();

    assert_ne!(h.directory.snapshot(id).unwrap().password_hash, before);
    assert_eq!(h.profiles.calls().count("touch"), 1);
}

#[tokio::test]
async fn reset_credential_fails_only_on_directory() {
    let h = harness();
    let id = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap();
    h.directory.faults().fail_once("update_credential");

    let err = h
        .saga
        .reset_credential(Uuid::new_v4(), id, "another-pass")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream(UpstreamSystem::Directory));
    assert_eq!(h.profiles.calls().count("touch"), 0);

    let err = h
        .saga
        .reset_credential(Uuid::new_v4(), id, "short")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let h = harness();
    h.saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap();

    let err = h
        .saga
        .create(Uuid::new_v4(), new_user("TECH@example.com", Role::Store))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict(ConflictKind::Duplicate));
    assert_eq!(h.directory.len(), 1);
}

#[tokio::test]
async fn set_active_toggles_profile() {
    let h = harness();
    let id = h
        .saga
        .create(Uuid::new_v4(), new_user("tech@example.com", Role::Lab))
        .await
        .unwrap();

    let profile = h.saga.set_active(Uuid::new_v4(), id, false).await.unwrap();
    assert!(!profile.is_active);
    assert!(!h.profiles.snapshot(id).unwrap().is_active);

    let err = h
        .saga
        .set_active(Uuid::new_v4(), Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

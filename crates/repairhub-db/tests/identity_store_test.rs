//! Integration tests for the Directory and ProfileStore using in-memory
//! SurrealDB.

use repairhub_core::error::{ConflictKind, ErrorKind, UpstreamSystem};
use repairhub_core::models::identity::{CreateIdentity, CredentialState};
use repairhub_core::models::profile::{Role, UpdateProfile, UpsertProfile};
use repairhub_core::query::{Pagination, ProfileFilter, RowScope};
use repairhub_core::repository::{Directory, ProfileStore};
use repairhub_db::repository::{SurrealDirectory, SurrealProfileStore};
use repairhub_db::verify_password;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    repairhub_db::run_migrations(&db).await.unwrap();
    db
}

fn identity(email: &str) -> CreateIdentity {
    CreateIdentity {
        email: email.into(),
        password: "correct horse".into(),
        confirmed: true,
        metadata: Some(serde_json::json!({ "full_name": "Test User" })),
    }
}

fn profile(id: Uuid, role: Role) -> UpsertProfile {
    UpsertProfile {
        id,
        email: format!("{id}@example.com"),
        full_name: "Test User".into(),
        phone: Some("+15550100".into()),
        role,
        is_active: true,
    }
}

#[tokio::test]
async fn create_and_find_identity() {
    let db = setup().await;
    let directory = SurrealDirectory::with_pepper(db, "pepper".into());

    let created = directory
        .create_identity(identity("alice@example.com"))
        .await
        .unwrap();
    assert_eq!(created.email, "alice@example.com");
    assert_eq!(created.credential_state, CredentialState::Confirmed);
    assert_ne!(created.password_hash, "correct horse");
    assert!(verify_password("correct horse", &created.password_hash, Some("pepper")).unwrap());

    let by_email = directory.find_by_email("alice@example.com").await.unwrap();
    assert_eq!(by_email.id, created.id);

    let by_id = directory.get_identity(created.id).await.unwrap();
    assert_eq!(by_id.metadata["full_name"], "Test User");
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let db = setup().await;
    let directory = SurrealDirectory::new(db);

    directory
        .create_identity(identity("dup@example.com"))
        .await
        .unwrap();
    let err = directory
        .create_identity(identity("dup@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict(ConflictKind::Duplicate));
}

#[tokio::test]
async fn unknown_identity_is_not_found() {
    let db = setup().await;
    let directory = SurrealDirectory::new(db);

    let err = directory.get_identity(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = directory.delete_identity(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = directory
        .update_credential(Uuid::new_v4(), "whatever1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn delete_identity_cascades_to_profile() {
    let db = setup().await;
    let directory = SurrealDirectory::new(db.clone());
    let profiles = SurrealProfileStore::new(db);

    let created = directory
        .create_identity(identity("bob@example.com"))
        .await
        .unwrap();
    profiles.upsert(profile(created.id, Role::Lab)).await.unwrap();

    directory.delete_identity(created.id).await.unwrap();

    assert!(profiles.get(created.id).await.unwrap().is_none());
    let err = directory.get_identity(created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn update_credential_confirms_and_rehashes() {
    let db = setup().await;
    let directory = SurrealDirectory::new(db);

    let mut input = identity("carol@example.com");
    input.confirmed = false;
    let created = directory.create_identity(input).await.unwrap();
    assert_eq!(created.credential_state, CredentialState::Unconfirmed);

    directory
        .update_credential(created.id, "new password")
        .await
        .unwrap();

    let updated = directory.get_identity(created.id).await.unwrap();
    assert_eq!(updated.credential_state, CredentialState::Confirmed);
    assert!(verify_password("new password", &updated.password_hash, None).unwrap());
    assert!(!verify_password("correct horse", &updated.password_hash, None).unwrap());
}

#[tokio::test]
async fn upsert_overwrites_but_keeps_created_at() {
    let db = setup().await;
    let profiles = SurrealProfileStore::new(db);
    let id = Uuid::new_v4();

    let first = profiles.upsert(profile(id, Role::Store)).await.unwrap();
    let mut second_input = profile(id, Role::Store);
    second_input.full_name = "Renamed".into();
    let second = profiles.upsert(second_input).await.unwrap();

    assert_eq!(second.id, id);
    assert_eq!(second.full_name, "Renamed");
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn update_profile_applies_partial_changes() {
    let db = setup().await;
    let profiles = SurrealProfileStore::new(db);
    let id = Uuid::new_v4();
    profiles.upsert(profile(id, Role::Lab)).await.unwrap();

    let updated = profiles
        .update(
            id,
            UpdateProfile {
                phone: Some(None),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.full_name, "Test User");
    assert_eq!(updated.phone, None);
    assert!(!updated.is_active);

    let err = profiles
        .update(Uuid::new_v4(), UpdateProfile::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn list_respects_scope_and_filters() {
    let db = setup().await;
    let profiles = SurrealProfileStore::new(db);

    let admin = Uuid::new_v4();
    let store = Uuid::new_v4();
    let lab = Uuid::new_v4();
    profiles.upsert(profile(admin, Role::Admin)).await.unwrap();
    profiles.upsert(profile(store, Role::Store)).await.unwrap();
    profiles.upsert(profile(lab, Role::Lab)).await.unwrap();

    let all = profiles
        .list(RowScope::All, ProfileFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.total, 3);

    let own = profiles
        .list(
            RowScope::OwnedBy(store),
            ProfileFilter::default(),
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(own.total, 1);
    assert_eq!(own.items[0].id, store);

    let labs = profiles
        .list(
            RowScope::All,
            ProfileFilter {
                role: Some(Role::Lab),
                active: None,
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(labs.items.len(), 1);
    assert_eq!(labs.items[0].role, Role::Lab);
}

#[tokio::test]
async fn directory_failures_are_attributed_to_directory() {
    let db = setup().await;
    // An email column of the wrong type makes every insert fail.
    db.query("DEFINE FIELD OVERWRITE email ON TABLE identity TYPE int")
        .await
        .unwrap();
    let directory = SurrealDirectory::new(db);

    let err = directory
        .create_identity(identity("x@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream(UpstreamSystem::Directory));
}

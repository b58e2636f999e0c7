//! Identity provisioning across the Directory and the ProfileStore.
//!
//! The two systems share no transaction, so each step that can fail after
//! the identity exists has a compensation: delete the identity again. A
//! compensation is attempted once. If it fails too, the identity is left
//! without a profile; that is logged as an `orphan_record` alert and
//! counted in [`ProvisioningSaga::orphan_alerts`].

use std::sync::atomic::{AtomicU64, Ordering};

use repairhub_core::error::{ConflictKind, HubError, HubResult, UpstreamSystem};
use repairhub_core::models::audit::CreateAuditLogEntry;
use repairhub_core::models::identity::CreateIdentity;
use repairhub_core::models::profile::{Profile, Role, UpdateProfile, UpsertProfile};
use repairhub_core::repository::{AuditLogRepository, Directory, ProfileStore};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collision::{CollisionGuard, CollisionVerdict};
use crate::config::AuthConfig;
use crate::password::validate_password;

/// Input for [`ProvisioningSaga::create`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

fn normalize_email(email: &str) -> HubResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(HubError::validation(format!(
            "'{email}' is not a valid email address"
        ))),
    }
}

/// Failures of a Directory call. Conflicts, validation and not-found
/// keep their kind; everything else becomes `Upstream(directory)`.
fn directory_failure(err: HubError) -> HubError {
    match err {
        HubError::Conflict { .. } | HubError::Validation { .. } | HubError::NotFound { .. } => err,
        HubError::Upstream { .. } => err.attribute_to(UpstreamSystem::Directory),
        other => HubError::upstream(UpstreamSystem::Directory, other.to_string()),
    }
}

fn profile_store_failure(err: HubError) -> HubError {
    match err {
        HubError::Upstream { .. } => err.attribute_to(UpstreamSystem::ProfileStore),
        other => HubError::upstream(UpstreamSystem::ProfileStore, other.to_string()),
    }
}

pub struct ProvisioningSaga<D, P, A>
where
    D: Directory,
    P: ProfileStore,
    A: AuditLogRepository,
{
    directory: D,
    profiles: P,
    audit: A,
    guard: CollisionGuard,
    min_password_length: usize,
    orphans: AtomicU64,
}

impl<D, P, A> ProvisioningSaga<D, P, A>
where
    D: Directory,
    P: ProfileStore,
    A: AuditLogRepository,
{
    pub fn new(directory: D, profiles: P, audit: A, config: &AuthConfig) -> Self {
        Self {
            directory,
            profiles,
            audit,
            guard: CollisionGuard::from_secs(config.freshness_window_secs),
            min_password_length: config.min_password_length,
            orphans: AtomicU64::new(0),
        }
    }

    /// Number of failed compensations since construction.
    pub fn orphan_alerts(&self) -> u64 {
        self.orphans.load(Ordering::Relaxed)
    }

    /// Create an identity and its profile as one unit.
    ///
    /// On success exactly one identity and one profile exist with the
    /// returned id. On failure neither does, unless an orphan alert was
    /// raised.
    pub async fn create(&self, actor: Uuid, input: NewUser) -> HubResult<Uuid> {
        let email = normalize_email(&input.email)?;
        let full_name = input.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(HubError::validation("full name is required"));
        }
        validate_password(&input.password, self.min_password_length)?;
        let phone = input
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        // 1. Directory: the only step with nothing to undo.
        let identity = self
            .directory
            .create_identity(CreateIdentity {
                email: email.clone(),
                password: input.password,
                confirmed: true,
                metadata: Some(json!({
                    "full_name": full_name,
                    "phone": phone,
                    "role": input.role,
                })),
            })
            .await
            .map_err(directory_failure)?;
        let id = identity.id;

        // 2. Make sure the profile slot is vacant or freshly written.
        let verdict = match self.guard.check(&self.profiles, id).await {
            Ok(verdict) => verdict,
            Err(err) => {
                let err = profile_store_failure(err);
                self.compensate(id, &err).await;
                return Err(err);
            }
        };
        if let CollisionVerdict::Stale { age } = verdict {
            let err = HubError::conflict(
                ConflictKind::IdCollision,
                format!(
                    "profile {id} already exists and is {}s old",
                    age.num_seconds()
                ),
            );
            self.compensate(id, &err).await;
            return Err(err);
        }

        // 3. Materialize the profile, overwriting a fresh row if present.
        let upsert = UpsertProfile {
            id,
            email: email.clone(),
            full_name,
            phone,
            role: input.role,
            is_active: true,
        };
        if let Err(err) = self.profiles.upsert(upsert).await {
            let err = profile_store_failure(err);
            self.compensate(id, &err).await;
            return Err(err);
        }

        info!(identity_id = %id, role = %input.role, ?verdict, "user provisioned");
        self.record(actor, "user.created", id, json!({ "email": email, "role": input.role }))
            .await;
        Ok(id)
    }

    /// Delete the identity. The Directory removes the profile in the same
    /// operation; no separate profile delete is issued.
    pub async fn delete(&self, actor: Uuid, id: Uuid) -> HubResult<()> {
        self.directory
            .delete_identity(id)
            .await
            .map_err(directory_failure)?;
        info!(identity_id = %id, "user deleted");
        self.record(actor, "user.deleted", id, json!({})).await;
        Ok(())
    }

    /// Replace the credential and mark it confirmed. Touching the
    /// profile's `updated_at` afterwards is best effort.
    pub async fn reset_credential(&self, actor: Uuid, id: Uuid, new_password: &str) -> HubResult<()> {
        validate_password(new_password, self.min_password_length)?;
        self.directory
            .update_credential(id, new_password)
            .await
            .map_err(directory_failure)?;

        if let Err(err) = self.profiles.touch(id).await {
            warn!(identity_id = %id, error = %err, "credential reset but profile touch failed");
        }
        info!(identity_id = %id, "credential reset");
        self.record(actor, "user.password_reset", id, json!({})).await;
        Ok(())
    }

    /// Activate or deactivate a user. Deactivated users fail the gate.
    pub async fn set_active(&self, actor: Uuid, id: Uuid, is_active: bool) -> HubResult<Profile> {
        let profile = self
            .profiles
            .update(
                id,
                UpdateProfile {
                    is_active: Some(is_active),
                    ..Default::default()
                },
            )
            .await?;
        info!(identity_id = %id, is_active, "user activation changed");
        self.record(actor, "user.activation_changed", id, json!({ "is_active": is_active }))
            .await;
        Ok(profile)
    }

    async fn compensate(&self, id: Uuid, cause: &HubError) {
        match self.directory.delete_identity(id).await {
            Ok(()) => info!(identity_id = %id, cause = %cause, "provisioning rolled back"),
            Err(err) => {
                self.orphans.fetch_add(1, Ordering::Relaxed);
                error!(
                    alert = "orphan_record",
                    identity_id = %id,
                    cause = %cause,
                    error = %err,
                    "compensation failed; identity has no profile"
                );
            }
        }
    }

    async fn record(&self, actor: Uuid, action: &str, id: Uuid, metadata: serde_json::Value) {
        let entry = CreateAuditLogEntry {
            actor_id: actor,
            action: action.into(),
            entity_type: "identity".into(),
            entity_id: id,
            metadata,
        };
        if let Err(err) = self.audit.append(entry).await {
            warn!(identity_id = %id, action, error = %err, "audit append failed");
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use repairhub_core::error::{ConflictKind, HubError, HubResult, UpstreamSystem};
use repairhub_core::models::identity::{CreateIdentity, CredentialState, Identity};
use repairhub_core::repository::Directory;
use uuid::Uuid;

use crate::faults::{CallLog, Faults};
use crate::profiles::FakeProfileStore;

#[derive(Debug)]
struct Inner {
    identities: Mutex<HashMap<Uuid, Identity>>,
    next_ids: Mutex<Vec<Uuid>>,
    profiles: Option<FakeProfileStore>,
    pepper: Option<String>,
    faults: Faults,
    calls: CallLog,
}

/// In-memory [`Directory`] storing real Argon2id hashes.
///
/// When built with [`FakeDirectory::linked`], deleting an identity also
/// removes the profile with the same id, mirroring the database cascade.
///
/// Operation names for [`Faults`]: `create_identity`, `get_identity`,
/// `find_by_email`, `delete_identity`, `update_credential`.
#[derive(Debug, Clone)]
pub struct FakeDirectory {
    inner: Arc<Inner>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    pub fn linked(profiles: FakeProfileStore) -> Self {
        Self::build(Some(profiles), None)
    }

    pub fn linked_with_pepper(profiles: FakeProfileStore, pepper: &str) -> Self {
        Self::build(Some(profiles), Some(pepper.to_string()))
    }

    fn build(profiles: Option<FakeProfileStore>, pepper: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                identities: Mutex::new(HashMap::new()),
                next_ids: Mutex::new(Vec::new()),
                profiles,
                pepper,
                faults: Faults::new(UpstreamSystem::Directory),
                calls: CallLog::default(),
            }),
        }
    }

    pub fn faults(&self) -> &Faults {
        &self.inner.faults
    }

    pub fn calls(&self) -> &CallLog {
        &self.inner.calls
    }

    /// Make the next `create_identity` hand out `id` (simulates id reuse).
    pub fn issue_next_id(&self, id: Uuid) {
        self.inner
            .next_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Identity> {
        self.identities().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.identities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities().is_empty()
    }

    fn identities(&self) -> MutexGuard<'_, HashMap<Uuid, Identity>> {
        self.inner
            .identities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, op: &'static str) -> HubResult<()> {
        self.inner.calls.record(op);
        self.inner.faults.check(op)
    }

    fn hash(&self, password: &str) -> HubResult<String> {
        repairhub_db::repository::hash_password(password, self.inner.pepper.as_deref())
            .map_err(|e| HubError::upstream(UpstreamSystem::Directory, e.to_string()))
    }
}

impl Default for FakeDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory for FakeDirectory {
    async fn create_identity(&self, input: CreateIdentity) -> HubResult<Identity> {
        self.enter("create_identity")?;
        let password_hash = self.hash(&input.password)?;
        let id = self
            .inner
            .next_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(Uuid::new_v4);

        let mut identities = self.identities();
        if identities.values().any(|i| i.email == input.email) {
            return Err(HubError::conflict(
                ConflictKind::Duplicate,
                format!("email {} is already registered", input.email),
            ));
        }
        let now = Utc::now();
        let identity = Identity {
            id,
            email: input.email,
            password_hash,
            credential_state: if input.confirmed {
                CredentialState::Confirmed
            } else {
                CredentialState::Unconfirmed
            },
            metadata: input
                .metadata
                .unwrap_or(serde_json::Value::Object(Default::default())),
            created_at: now,
            updated_at: now,
        };
        identities.insert(id, identity.clone());
        Ok(identity)
    }

    async fn get_identity(&self, id: Uuid) -> HubResult<Identity> {
        self.enter("get_identity")?;
        self.snapshot(id)
            .ok_or_else(|| HubError::not_found("identity", id))
    }

    async fn find_by_email(&self, email: &str) -> HubResult<Identity> {
        self.enter("find_by_email")?;
        self.identities()
            .values()
            .find(|i| i.email == email)
            .cloned()
            .ok_or_else(|| HubError::not_found("identity", email))
    }

    async fn delete_identity(&self, id: Uuid) -> HubResult<()> {
        self.enter("delete_identity")?;
        if self.identities().remove(&id).is_none() {
            return Err(HubError::not_found("identity", id));
        }
        if let Some(profiles) = &self.inner.profiles {
            profiles.cascade_delete(id);
        }
        Ok(())
    }

    async fn update_credential(&self, id: Uuid, new_password: &str) -> HubResult<()> {
        self.enter("update_credential")?;
        let password_hash = self.hash(new_password)?;
        let mut identities = self.identities();
        let identity = identities
            .get_mut(&id)
            .ok_or_else(|| HubError::not_found("identity", id))?;
        identity.password_hash = password_hash;
        identity.credential_state = CredentialState::Confirmed;
        identity.updated_at = Utc::now();
        Ok(())
    }
}

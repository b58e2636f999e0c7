use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use repairhub_core::error::{HubError, HubResult, UpstreamSystem};
use repairhub_core::models::profile::{Profile, UpdateProfile, UpsertProfile};
use repairhub_core::query::{PaginatedResult, Pagination, ProfileFilter, RowScope};
use repairhub_core::repository::ProfileStore;
use uuid::Uuid;

use crate::faults::{CallLog, Faults};

#[derive(Debug)]
struct Inner {
    rows: Mutex<HashMap<Uuid, Profile>>,
    faults: Faults,
    calls: CallLog,
}

/// In-memory [`ProfileStore`].
///
/// Operation names for [`Faults`]: `get`, `upsert`, `update`, `touch`,
/// `delete`, `list`.
#[derive(Debug, Clone)]
pub struct FakeProfileStore {
    inner: Arc<Inner>,
}

impl Default for FakeProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProfileStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                rows: Mutex::new(HashMap::new()),
                faults: Faults::new(UpstreamSystem::ProfileStore),
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

    /// Place a row directly, bypassing faults and counters. Used to seed
    /// stale or out-of-band rows with arbitrary timestamps.
    pub fn seed(&self, profile: Profile) {
        self.rows().insert(profile.id, profile);
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Profile> {
        self.rows().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Drop a row without faults; what an identity cascade does.
    pub(crate) fn cascade_delete(&self, id: Uuid) {
        self.rows().remove(&id);
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<Uuid, Profile>> {
        self.inner
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, op: &'static str) -> HubResult<()> {
        self.inner.calls.record(op);
        self.inner.faults.check(op)
    }
}

impl ProfileStore for FakeProfileStore {
    async fn get(&self, id: Uuid) -> HubResult<Option<Profile>> {
        self.enter("get")?;
        Ok(self.snapshot(id))
    }

    async fn upsert(&self, input: UpsertProfile) -> HubResult<Profile> {
        self.enter("upsert")?;
        let now = Utc::now();
        let mut rows = self.rows();
        let created_at = rows.get(&input.id).map_or(now, |p| p.created_at);
        let profile = Profile {
            id: input.id,
            email: input.email,
            full_name: input.full_name,
            phone: input.phone,
            role: input.role,
            is_active: input.is_active,
            created_at,
            updated_at: now,
        };
        rows.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update(&self, id: Uuid, input: UpdateProfile) -> HubResult<Profile> {
        self.enter("update")?;
        let mut rows = self.rows();
        let profile = rows
            .get_mut(&id)
            .ok_or_else(|| HubError::not_found("profile", id))?;
        if let Some(full_name) = input.full_name {
            profile.full_name = full_name;
        }
        if let Some(phone) = input.phone {
            profile.phone = phone;
        }
        if let Some(is_active) = input.is_active {
            profile.is_active = is_active;
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn touch(&self, id: Uuid) -> HubResult<()> {
        self.enter("touch")?;
        let mut rows = self.rows();
        let profile = rows
            .get_mut(&id)
            .ok_or_else(|| HubError::not_found("profile", id))?;
        profile.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> HubResult<()> {
        self.enter("delete")?;
        self.rows().remove(&id);
        Ok(())
    }

    async fn list(
        &self,
        scope: RowScope,
        filter: ProfileFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Profile>> {
        self.enter("list")?;
        let mut matching: Vec<Profile> = self
            .rows()
            .values()
            .filter(|p| scope.owner().is_none_or(|owner| p.id == owner))
            .filter(|p| filter.role.is_none_or(|role| p.role == role))
            .filter(|p| filter.active.is_none_or(|active| p.is_active == active))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(PaginatedResult::from_vec(matching, pagination))
    }
}

//! Freshness check for profile rows found at a newly issued identity id.

use chrono::{DateTime, Duration, Utc};
use repairhub_core::error::HubResult;
use repairhub_core::models::profile::Profile;
use repairhub_core::repository::ProfileStore;
use tracing::warn;
use uuid::Uuid;

/// Outcome of inspecting the profile slot for a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionVerdict {
    /// No row exists.
    Vacant,
    /// A row exists but is younger than the freshness window: the same
    /// logical creation written by another path. Safe to overwrite.
    Fresh { age: Duration },
    /// A row exists and is older than the window. Unsafe to overwrite.
    Stale { age: Duration },
}

impl CollisionVerdict {
    pub fn allows_overwrite(&self) -> bool {
        !matches!(self, Self::Stale { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollisionGuard {
    freshness_window: Duration,
}

impl CollisionGuard {
    pub fn new(freshness_window: Duration) -> Self {
        Self { freshness_window }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    /// Pure policy: classify an existing row (if any) at `now`.
    pub fn assess(&self, existing: Option<&Profile>, now: DateTime<Utc>) -> CollisionVerdict {
        match existing {
            None => CollisionVerdict::Vacant,
            Some(profile) => {
                let age = now - profile.created_at;
                if age < self.freshness_window {
                    CollisionVerdict::Fresh { age }
                } else {
                    CollisionVerdict::Stale { age }
                }
            }
        }
    }

    /// Fetch the row at `id` and classify it.
    pub async fn check<P: ProfileStore>(&self, profiles: &P, id: Uuid) -> HubResult<CollisionVerdict> {
        let existing = profiles.get(id).await?;
        let verdict = self.assess(existing.as_ref(), Utc::now());
        if let CollisionVerdict::Stale { age } = verdict {
            warn!(
                identity_id = %id,
                age_secs = age.num_seconds(),
                "stale profile row occupies new identity id"
            );
        }
        Ok(verdict)
    }
}

impl Default for CollisionGuard {
    fn default() -> Self {
        Self::from_secs(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repairhub_core::models::profile::Role;

    fn profile_created(at: DateTime<Utc>) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            email: "x@example.com".into(),
            full_name: "X".into(),
            phone: None,
            role: Role::Store,
            is_active: true,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn vacant_when_no_row() {
        let guard = CollisionGuard::default();
        assert_eq!(guard.assess(None, Utc::now()), CollisionVerdict::Vacant);
    }

    #[test]
    fn young_rows_are_fresh() {
        let guard = CollisionGuard::default();
        let now = Utc::now();
        let verdict = guard.assess(Some(&profile_created(now - Duration::seconds(5))), now);
        assert_eq!(
            verdict,
            CollisionVerdict::Fresh {
                age: Duration::seconds(5)
            }
        );
        assert!(verdict.allows_overwrite());
    }

    #[test]
    fn old_rows_are_stale() {
        let guard = CollisionGuard::default();
        let now = Utc::now();
        let verdict = guard.assess(Some(&profile_created(now - Duration::seconds(120))), now);
        assert!(matches!(verdict, CollisionVerdict::Stale { .. }));
        assert!(!verdict.allows_overwrite());
    }

    #[test]
    fn window_boundary_is_stale() {
        let guard = CollisionGuard::from_secs(60);
        let now = Utc::now();
        let verdict = guard.assess(Some(&profile_created(now - Duration::seconds(60))), now);
        assert!(matches!(verdict, CollisionVerdict::Stale { .. }));
    }
}

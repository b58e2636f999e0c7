//! SurrealDB implementation of [`ProfileStore`].

use chrono::{DateTime, Utc};
use repairhub_core::error::{HubError, HubResult};
use repairhub_core::models::profile::{Profile, UpdateProfile, UpsertProfile};
use repairhub_core::query::{PaginatedResult, Pagination, ProfileFilter, RowScope};
use repairhub_core::repository::ProfileStore;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, IdRow, first_total, parse_uuid, parse_wire};
use crate::error::{DbError, classify};

#[derive(Debug, SurrealValue)]
struct ProfileRow {
    record_id: String,
    email: String,
    full_name: String,
    phone: Option<String>,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRow {
    fn try_into_profile(self) -> Result<Profile, DbError> {
        Ok(Profile {
            id: parse_uuid("profile", &self.record_id)?,
            email: self.email,
            full_name: self.full_name,
            phone: self.phone,
            role: parse_wire(&self.role)?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Profiles are keyed by the identity id they mirror.
#[derive(Clone)]
pub struct SurrealProfileStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealProfileStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn require(&self, id: Uuid) -> HubResult<Profile> {
        self.get(id)
            .await?
            .ok_or_else(|| HubError::not_found("profile", id))
    }
}

impl<C: Connection> ProfileStore for SurrealProfileStore<C> {
    async fn get(&self, id: Uuid) -> HubResult<Option<Profile>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('profile', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ProfileRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(ProfileRow::try_into_profile)
            .transpose()?)
    }

    async fn upsert(&self, input: UpsertProfile) -> HubResult<Profile> {
        // created_at keeps its original value on overwrite.
        let result = self
            .db
            .query(
                "UPSERT type::record('profile', $id) SET \
                 email = $email, full_name = $full_name, phone = $phone, \
                 role = $role, is_active = $is_active, \
                 updated_at = time::now()",
            )
            .bind(("id", input.id.to_string()))
            .bind(("email", input.email))
            .bind(("full_name", input.full_name))
            .bind(("phone", input.phone))
            .bind(("role", input.role.as_str().to_string()))
            .bind(("is_active", input.is_active))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        self.require(input.id).await
    }

    async fn update(&self, id: Uuid, input: UpdateProfile) -> HubResult<Profile> {
        let mut sets = Vec::new();
        if input.full_name.is_some() {
            sets.push("full_name = $full_name");
        }
        if input.phone.is_some() {
            sets.push("phone = $phone");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('profile', $id) SET {} \
             RETURN meta::id(id) AS record_id",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id.to_string()));
        if let Some(full_name) = input.full_name {
            builder = builder.bind(("full_name", full_name));
        }
        if let Some(phone) = input.phone {
            // Some(None) clears the phone number.
            builder = builder.bind(("phone", phone));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| classify(e.to_string()))?;
        let updated: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if updated.is_empty() {
            return Err(HubError::not_found("profile", id));
        }

        self.require(id).await
    }

    async fn touch(&self, id: Uuid) -> HubResult<()> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('profile', $id) SET updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let updated: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if updated.is_empty() {
            return Err(HubError::not_found("profile", id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> HubResult<()> {
        self.db
            .query("DELETE type::record('profile', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| classify(e.to_string()))?;
        Ok(())
    }

    async fn list(
        &self,
        scope: RowScope,
        filter: ProfileFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Profile>> {
        let mut conds = vec!["true"];
        if scope.owner().is_some() {
            conds.push("meta::id(id) = $owner");
        }
        if filter.role.is_some() {
            conds.push("role = $role");
        }
        if filter.active.is_some() {
            conds.push("is_active = $active");
        }
        let where_clause = conds.join(" AND ");

        let count_query =
            format!("SELECT count() AS total FROM profile WHERE {where_clause} GROUP ALL");
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM profile \
             WHERE {where_clause} \
             ORDER BY created_at DESC \
             LIMIT $limit START $offset"
        );

        let mut builder = self
            .db
            .query(&count_query)
            .query(&list_query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(owner) = scope.owner() {
            builder = builder.bind(("owner", owner.to_string()));
        }
        if let Some(role) = filter.role {
            builder = builder.bind(("role", role.as_str().to_string()));
        }
        if let Some(active) = filter.active {
            builder = builder.bind(("active", active));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<ProfileRow> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(ProfileRow::try_into_profile)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: first_total(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

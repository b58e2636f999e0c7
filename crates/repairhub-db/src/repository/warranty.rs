//! SurrealDB implementation of [`WarrantyRepository`].

use chrono::{DateTime, Utc};
use repairhub_core::error::{ConflictKind, HubError, HubResult};
use repairhub_core::models::warranty::{ActivateWarranty, Warranty};
use repairhub_core::query::{PaginatedResult, Pagination, RowScope, WarrantyFilter};
use repairhub_core::repository::WarrantyRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{CountRow, first_total, parse_opt_uuid, parse_uuid};
use crate::error::{DbError, classify, conflict_marker};

#[derive(Debug, SurrealValue)]
struct WarrantyRow {
    record_id: String,
    device_id: String,
    store_id: Option<String>,
    customer_name: String,
    customer_phone: String,
    activation_date: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
    is_active: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WarrantyRow {
    fn try_into_warranty(self) -> Result<Warranty, DbError> {
        Ok(Warranty {
            id: parse_uuid("warranty", &self.record_id)?,
            device_id: parse_uuid("device", &self.device_id)?,
            store_id: parse_opt_uuid("store", self.store_id)?,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            activation_date: self.activation_date,
            expiry_date: self.expiry_date,
            is_active: self.is_active,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_warranties(rows: Vec<WarrantyRow>) -> Result<Vec<Warranty>, DbError> {
    rows.into_iter().map(WarrantyRow::try_into_warranty).collect()
}

#[derive(Clone)]
pub struct SurrealWarrantyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealWarrantyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> WarrantyRepository for SurrealWarrantyRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> HubResult<Warranty> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('warranty', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<WarrantyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| HubError::not_found("warranty", id))?;
        Ok(row.try_into_warranty()?)
    }

    async fn find_active_for_device(&self, device_id: Uuid) -> HubResult<Option<Warranty>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM warranty \
                 WHERE device_id = $device_id AND is_active = true \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("device_id", device_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<WarrantyRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_warranties(rows)?.into_iter().next())
    }

    async fn activate(&self, input: ActivateWarranty) -> HubResult<Warranty> {
        let id = Uuid::new_v4();
        // The guard runs first so its THROW is the first failed statement.
        let query = format!(
            "BEGIN TRANSACTION; \
             IF array::len((SELECT id FROM type::record('device', $device_id) \
                 WHERE warranty_status = 'new')) == 0 {{ \
                 THROW \"{marker}\"; \
             }}; \
             UPDATE type::record('device', $device_id) SET \
                 warranty_status = 'active', updated_at = time::now(); \
             CREATE type::record('warranty', $id) SET \
                 device_id = $device_id, store_id = $store_id, \
                 customer_name = $customer_name, customer_phone = $customer_phone, \
                 activation_date = $activation_date, expiry_date = $expiry_date, \
                 is_active = true, notes = $notes; \
             COMMIT TRANSACTION;",
            marker = conflict_marker(ConflictKind::AlreadyActive),
        );

        let result = self
            .db
            .query(&query)
            .bind(("id", id.to_string()))
            .bind(("device_id", input.device_id.to_string()))
            .bind(("store_id", input.store_id.map(|s| s.to_string())))
            .bind(("customer_name", input.customer.name))
            .bind(("customer_phone", input.customer.phone))
            .bind(("activation_date", input.activation_date))
            .bind(("expiry_date", input.expiry_date))
            .bind(("notes", input.notes))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        debug!(warranty_id = %id, device_id = %input.device_id, "warranty activated");
        self.get_by_id(id).await
    }

    async fn list_lapsed(&self, now: DateTime<Utc>) -> HubResult<Vec<Warranty>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM warranty \
                 WHERE is_active = true AND expiry_date <= $now \
                 AND device_id IN (SELECT VALUE meta::id(id) FROM device \
                     WHERE warranty_status = 'active') \
                 ORDER BY expiry_date ASC",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<WarrantyRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_warranties(rows)?)
    }

    async fn list(
        &self,
        scope: RowScope,
        filter: WarrantyFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Warranty>> {
        let mut conds = vec!["true"];
        if scope.owner().is_some() {
            conds.push("store_id = $owner");
        }
        if filter.device_id.is_some() {
            conds.push("device_id = $device_id");
        }
        if filter.active_only {
            conds.push("is_active = true");
        }
        if filter.customer.is_some() {
            conds.push(
                "(string::contains(string::lowercase(customer_name), $customer) \
                 OR string::contains(customer_phone, $customer))",
            );
        }
        let where_clause = conds.join(" AND ");

        let count_query =
            format!("SELECT count() AS total FROM warranty WHERE {where_clause} GROUP ALL");
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM warranty \
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
        if let Some(device_id) = filter.device_id {
            builder = builder.bind(("device_id", device_id.to_string()));
        }
        if let Some(customer) = filter.customer {
            builder = builder.bind(("customer", customer.to_lowercase()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<WarrantyRow> = result.take(1).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: into_warranties(rows)?,
            total: first_total(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

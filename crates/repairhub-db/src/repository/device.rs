//! SurrealDB implementation of [`DeviceRepository`].

use chrono::{DateTime, Utc};
use repairhub_core::error::{HubError, HubResult};
use repairhub_core::models::device::{CreateDevice, Device, WarrantyStatus};
use repairhub_core::query::{DeviceFilter, PaginatedResult, Pagination};
use repairhub_core::repository::DeviceRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, IdRow, first_total, parse_uuid, parse_wire};
use crate::error::{DbError, classify};

#[derive(Debug, SurrealValue)]
struct DeviceRow {
    record_id: String,
    imei: String,
    imei2: Option<String>,
    model: String,
    warranty_status: String,
    warranty_months: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DeviceRow {
    fn try_into_device(self) -> Result<Device, DbError> {
        Ok(Device {
            id: parse_uuid("device", &self.record_id)?,
            imei: self.imei,
            imei2: self.imei2,
            model: self.model,
            warranty_status: parse_wire(&self.warranty_status)?,
            warranty_months: self.warranty_months,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealDeviceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDeviceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> DeviceRepository for SurrealDeviceRepository<C> {
    async fn create(&self, input: CreateDevice) -> HubResult<Device> {
        let id = Uuid::new_v4();
        let result = self
            .db
            .query(
                "CREATE type::record('device', $id) SET \
                 imei = $imei, imei2 = $imei2, model = $model, \
                 warranty_status = 'new', warranty_months = $warranty_months",
            )
            .bind(("id", id.to_string()))
            .bind(("imei", input.imei))
            .bind(("imei2", input.imei2))
            .bind(("model", input.model))
            .bind(("warranty_months", input.warranty_months))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<Device> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('device', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DeviceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| HubError::not_found("device", id))?;
        Ok(row.try_into_device()?)
    }

    async fn find_by_imei(&self, imei: &str) -> HubResult<Option<Device>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM device \
                 WHERE imei = $imei OR imei2 = $imei LIMIT 1",
            )
            .bind(("imei", imei.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DeviceRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(DeviceRow::try_into_device)
            .transpose()?)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: WarrantyStatus,
        target: WarrantyStatus,
    ) -> HubResult<bool> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('device', $id) SET \
                 warranty_status = $target, updated_at = time::now() \
                 WHERE warranty_status = $expected \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .bind(("expected", expected.as_str().to_string()))
            .bind(("target", target.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let updated: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        Ok(!updated.is_empty())
    }

    async fn list(
        &self,
        filter: DeviceFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Device>> {
        let mut conds = vec!["true"];
        if filter.status.is_some() {
            conds.push("warranty_status = $status");
        }
        if filter.imei.is_some() {
            conds.push(
                "(string::contains(imei, $imei) \
                 OR (imei2 != NONE AND string::contains(imei2, $imei)))",
            );
        }
        if filter.model.is_some() {
            conds.push("string::contains(string::lowercase(model), $model)");
        }
        let where_clause = conds.join(" AND ");

        let count_query =
            format!("SELECT count() AS total FROM device WHERE {where_clause} GROUP ALL");
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM device \
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
        if let Some(status) = filter.status {
            builder = builder.bind(("status", status.as_str().to_string()));
        }
        if let Some(imei) = filter.imei {
            builder = builder.bind(("imei", imei));
        }
        if let Some(model) = filter.model {
            builder = builder.bind(("model", model.to_lowercase()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<DeviceRow> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(DeviceRow::try_into_device)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: first_total(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

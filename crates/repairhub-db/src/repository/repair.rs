//! SurrealDB implementation of [`RepairRepository`].

use chrono::{DateTime, Utc};
use repairhub_core::error::{HubError, HubResult};
use repairhub_core::models::payment::LabTotals;
use repairhub_core::models::repair::{CreateRepair, Repair, RepairStatus, RepairStatusChange};
use repairhub_core::query::{PaginatedResult, Pagination, RepairFilter, RowScope};
use repairhub_core::repository::RepairRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, IdRow, SumRow, first_total, parse_opt_uuid, parse_uuid, parse_wire};
use crate::error::{DbError, classify};

#[derive(Debug, SurrealValue)]
struct RepairRow {
    record_id: String,
    device_id: String,
    lab_id: Option<String>,
    warranty_id: Option<String>,
    fault_type: String,
    fault_description: Option<String>,
    repair_type_id: Option<String>,
    status: String,
    cost: Option<f64>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RepairRow {
    fn try_into_repair(self) -> Result<Repair, DbError> {
        Ok(Repair {
            id: parse_uuid("repair", &self.record_id)?,
            device_id: parse_uuid("device", &self.device_id)?,
            lab_id: parse_opt_uuid("lab", self.lab_id)?,
            warranty_id: parse_opt_uuid("warranty", self.warranty_id)?,
            fault_type: parse_wire(&self.fault_type)?,
            fault_description: self.fault_description,
            repair_type_id: parse_opt_uuid("repair_type", self.repair_type_id)?,
            status: parse_wire(&self.status)?,
            cost: self.cost,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealRepairRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRepairRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RepairRepository for SurrealRepairRepository<C> {
    async fn create(&self, input: CreateRepair) -> HubResult<Repair> {
        let id = Uuid::new_v4();
        let result = self
            .db
            .query(
                "CREATE type::record('repair', $id) SET \
                 device_id = $device_id, lab_id = $lab_id, \
                 warranty_id = $warranty_id, fault_type = $fault_type, \
                 fault_description = $fault_description, status = 'received'",
            )
            .bind(("id", id.to_string()))
            .bind(("device_id", input.device_id.to_string()))
            .bind(("lab_id", input.lab_id.map(|l| l.to_string())))
            .bind(("warranty_id", input.warranty_id.map(|w| w.to_string())))
            .bind(("fault_type", input.fault_type.as_str().to_string()))
            .bind(("fault_description", input.fault_description))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<Repair> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('repair', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RepairRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| HubError::not_found("repair", id))?;
        Ok(row.try_into_repair()?)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: RepairStatus,
        change: RepairStatusChange,
    ) -> HubResult<Option<Repair>> {
        let mut sets = vec!["status = $status"];
        if change.cost.is_some() {
            sets.push("cost = $cost");
        }
        if change.completed_at.is_some() {
            sets.push("completed_at = $completed_at");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('repair', $id) SET {} \
             WHERE status = $expected \
             RETURN meta::id(id) AS record_id",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id.to_string()))
            .bind(("expected", expected.as_str().to_string()))
            .bind(("status", change.status.as_str().to_string()));
        if let Some(cost) = change.cost {
            builder = builder.bind(("cost", cost));
        }
        if let Some(completed_at) = change.completed_at {
            builder = builder.bind(("completed_at", completed_at));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| classify(e.to_string()))?;
        let updated: Vec<IdRow> = result.take(0).map_err(DbError::from)?;

        // An empty result is either a missing row (NotFound) or a lost race.
        let repair = self.get_by_id(id).await?;
        Ok((!updated.is_empty()).then_some(repair))
    }

    async fn set_repair_type(
        &self,
        id: Uuid,
        repair_type_id: Option<Uuid>,
    ) -> HubResult<Option<Repair>> {
        let result = self
            .db
            .query(
                "UPDATE type::record('repair', $id) \
                 SET repair_type_id = $repair_type_id, updated_at = time::now() \
                 WHERE status IN ['received', 'in_progress'] \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .bind(("repair_type_id", repair_type_id.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| classify(e.to_string()))?;
        let updated: Vec<IdRow> = result.take(0).map_err(DbError::from)?;

        let repair = self.get_by_id(id).await?;
        Ok((!updated.is_empty()).then_some(repair))
    }

    async fn completed_totals(&self, lab_id: Uuid) -> HubResult<LabTotals> {
        let mut result = self
            .db
            .query(
                "SELECT math::sum(cost ?? 0.0) AS total, count() AS count FROM repair \
                 WHERE lab_id = $lab_id AND status = 'completed' GROUP ALL",
            )
            .bind(("lab_id", lab_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SumRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(SumRow::into_totals).unwrap_or_default())
    }

    async fn list(
        &self,
        scope: RowScope,
        filter: RepairFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<Repair>> {
        let mut conds = vec!["true"];
        if scope.owner().is_some() {
            conds.push("lab_id = $owner");
        }
        if filter.device_id.is_some() {
            conds.push("device_id = $device_id");
        }
        if filter.status.is_some() {
            conds.push("status = $status");
        }
        if filter.repair_type_id.is_some() {
            conds.push("repair_type_id = $repair_type_id");
        }
        let where_clause = conds.join(" AND ");

        let count_query =
            format!("SELECT count() AS total FROM repair WHERE {where_clause} GROUP ALL");
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM repair \
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
        if let Some(status) = filter.status {
            builder = builder.bind(("status", status.as_str().to_string()));
        }
        if let Some(repair_type_id) = filter.repair_type_id {
            builder = builder.bind(("repair_type_id", repair_type_id.to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<RepairRow> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(RepairRow::try_into_repair)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: first_total(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

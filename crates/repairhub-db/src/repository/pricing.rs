//! SurrealDB implementations of [`RepairTypeRepository`] and
//! [`LabPriceRepository`].

use chrono::{DateTime, Utc};
use repairhub_core::error::{HubError, HubResult};
use repairhub_core::models::pricing::{
    CreateRepairType, LabRepairPrice, RepairType, SetLabRepairPrice, UpdateRepairType,
};
use repairhub_core::repository::{LabPriceRepository, RepairTypeRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{IdRow, parse_uuid};
use crate::error::{DbError, classify};

#[derive(Debug, SurrealValue)]
struct RepairTypeRow {
    record_id: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RepairTypeRow {
    fn try_into_repair_type(self) -> Result<RepairType, DbError> {
        Ok(RepairType {
            id: parse_uuid("repair_type", &self.record_id)?,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct LabPriceRow {
    record_id: String,
    lab_id: String,
    repair_type_id: String,
    price: f64,
    is_active: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LabPriceRow {
    fn try_into_price(self) -> Result<LabRepairPrice, DbError> {
        Ok(LabRepairPrice {
            id: parse_uuid("lab_repair_price", &self.record_id)?,
            lab_id: parse_uuid("lab", &self.lab_id)?,
            repair_type_id: parse_uuid("repair_type", &self.repair_type_id)?,
            price: self.price,
            is_active: self.is_active,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_prices(rows: Vec<LabPriceRow>) -> Result<Vec<LabRepairPrice>, DbError> {
    rows.into_iter().map(LabPriceRow::try_into_price).collect()
}

// ---------------------------------------------------------------------------
// Repair types
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SurrealRepairTypeRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRepairTypeRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RepairTypeRepository for SurrealRepairTypeRepository<C> {
    async fn create(&self, input: CreateRepairType) -> HubResult<RepairType> {
        let id = Uuid::new_v4();
        let result = self
            .db
            .query(
                "CREATE type::record('repair_type', $id) SET \
                 name = $name, description = $description, is_active = true",
            )
            .bind(("id", id.to_string()))
            .bind(("name", input.name.trim().to_string()))
            .bind(("description", input.description))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<RepairType> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('repair_type', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RepairTypeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| HubError::not_found("repair_type", id))?;
        Ok(row.try_into_repair_type()?)
    }

    async fn update(&self, id: Uuid, input: UpdateRepairType) -> HubResult<RepairType> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('repair_type', $id) SET {} \
             RETURN meta::id(id) AS record_id",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name.trim().to_string()));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| classify(e.to_string()))?;
        let updated: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if updated.is_empty() {
            return Err(HubError::not_found("repair_type", id));
        }

        self.get_by_id(id).await
    }

    async fn delete(&self, id: Uuid) -> HubResult<()> {
        self.get_by_id(id).await?;
        self.db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE lab_repair_price WHERE repair_type_id = $id; \
                 DELETE type::record('repair_type', $id); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| classify(e.to_string()))?;
        debug!(repair_type_id = %id, "repair type deleted");
        Ok(())
    }

    async fn list(&self, active_only: bool) -> HubResult<Vec<RepairType>> {
        let query = if active_only {
            "SELECT meta::id(id) AS record_id, * FROM repair_type \
             WHERE is_active = true ORDER BY name ASC"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM repair_type ORDER BY name ASC"
        };
        let mut result = self.db.query(query).await.map_err(DbError::from)?;
        let rows: Vec<RepairTypeRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(RepairTypeRow::try_into_repair_type)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

// ---------------------------------------------------------------------------
// Lab repair prices
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SurrealLabPriceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealLabPriceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> LabPriceRepository for SurrealLabPriceRepository<C> {
    async fn upsert(&self, input: SetLabRepairPrice) -> HubResult<LabRepairPrice> {
        // The (lab_id, repair_type_id) index turns a racing insert into
        // Conflict(Duplicate).
        let id = match self.find(input.lab_id, input.repair_type_id).await? {
            Some(existing) => existing.id,
            None => Uuid::new_v4(),
        };
        let result = self
            .db
            .query(
                "UPSERT type::record('lab_repair_price', $id) SET \
                 lab_id = $lab_id, repair_type_id = $repair_type_id, \
                 price = $price, is_active = $is_active, notes = $notes, \
                 updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("lab_id", input.lab_id.to_string()))
            .bind(("repair_type_id", input.repair_type_id.to_string()))
            .bind(("price", input.price))
            .bind(("is_active", input.is_active))
            .bind(("notes", input.notes))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<LabRepairPrice> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM \
                 type::record('lab_repair_price', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<LabPriceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| HubError::not_found("lab_repair_price", id))?;
        Ok(row.try_into_price()?)
    }

    async fn find(&self, lab_id: Uuid, repair_type_id: Uuid) -> HubResult<Option<LabRepairPrice>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM lab_repair_price \
                 WHERE lab_id = $lab_id AND repair_type_id = $repair_type_id LIMIT 1",
            )
            .bind(("lab_id", lab_id.to_string()))
            .bind(("repair_type_id", repair_type_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<LabPriceRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_prices(rows)?.into_iter().next())
    }

    async fn delete(&self, id: Uuid) -> HubResult<()> {
        self.db
            .query("DELETE type::record('lab_repair_price', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| classify(e.to_string()))?;
        Ok(())
    }

    async fn list_for_lab(&self, lab_id: Uuid) -> HubResult<Vec<LabRepairPrice>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM lab_repair_price \
                 WHERE lab_id = $lab_id ORDER BY created_at DESC",
            )
            .bind(("lab_id", lab_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<LabPriceRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_prices(rows)?)
    }
}

//! SurrealDB implementation of [`LabPaymentRepository`].

use chrono::{DateTime, Utc};
use repairhub_core::error::{HubError, HubResult};
use repairhub_core::models::payment::{CreateLabPayment, LabPayment, LabTotals};
use repairhub_core::query::{PaginatedResult, Pagination};
use repairhub_core::repository::LabPaymentRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, SumRow, first_total, parse_uuid};
use crate::error::{DbError, classify};

#[derive(Debug, SurrealValue)]
struct LabPaymentRow {
    record_id: String,
    lab_id: String,
    amount: f64,
    payment_date: DateTime<Utc>,
    reference: Option<String>,
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl LabPaymentRow {
    fn try_into_payment(self) -> Result<LabPayment, DbError> {
        Ok(LabPayment {
            id: parse_uuid("lab_payment", &self.record_id)?,
            lab_id: parse_uuid("lab", &self.lab_id)?,
            amount: self.amount,
            payment_date: self.payment_date,
            reference: self.reference,
            notes: self.notes,
            created_by: parse_uuid("created_by", &self.created_by)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealLabPaymentRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealLabPaymentRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<LabPayment> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('lab_payment', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<LabPaymentRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| HubError::not_found("lab_payment", id))?;
        Ok(row.try_into_payment()?)
    }
}

impl<C: Connection> LabPaymentRepository for SurrealLabPaymentRepository<C> {
    async fn create(&self, input: CreateLabPayment) -> HubResult<LabPayment> {
        let id = Uuid::new_v4();
        let result = self
            .db
            .query(
                "CREATE type::record('lab_payment', $id) SET \
                 lab_id = $lab_id, amount = $amount, payment_date = $payment_date, \
                 reference = $reference, notes = $notes, created_by = $created_by",
            )
            .bind(("id", id.to_string()))
            .bind(("lab_id", input.lab_id.to_string()))
            .bind(("amount", input.amount))
            .bind(("payment_date", input.payment_date))
            .bind(("reference", input.reference))
            .bind(("notes", input.notes))
            .bind(("created_by", input.created_by.to_string()))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        self.get_by_id(id).await
    }

    async fn list_for_lab(
        &self,
        lab_id: Uuid,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<LabPayment>> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM lab_payment WHERE lab_id = $lab_id GROUP ALL")
            .query(
                "SELECT meta::id(id) AS record_id, * FROM lab_payment \
                 WHERE lab_id = $lab_id \
                 ORDER BY payment_date DESC \
                 LIMIT $limit START $offset",
            )
            .bind(("lab_id", lab_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<LabPaymentRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(LabPaymentRow::try_into_payment)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: first_total(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn totals(&self, lab_id: Uuid) -> HubResult<LabTotals> {
        let mut result = self
            .db
            .query(
                "SELECT math::sum(amount) AS total, count() AS count FROM lab_payment \
                 WHERE lab_id = $lab_id GROUP ALL",
            )
            .bind(("lab_id", lab_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SumRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(SumRow::into_totals).unwrap_or_default())
    }
}

//! SurrealDB implementation of [`ReplacementRepository`].
//!
//! Both composite writes run as a single SurrealQL transaction whose first
//! statement re-checks the precondition and throws a conflict marker, so a
//! request that lost a race leaves no partial state behind.

use chrono::{DateTime, Utc};
use repairhub_core::error::{ConflictKind, HubError, HubResult};
use repairhub_core::models::replacement::{
    CreateReplacementRequest, ReplacementRequest, RequestStatus, ResolveReplacement,
};
use repairhub_core::query::{PaginatedResult, Pagination, ReplacementFilter, RowScope};
use repairhub_core::repository::ReplacementRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{CountRow, first_total, parse_opt_uuid, parse_uuid, parse_wire};
use crate::error::{DbError, classify, conflict_marker};

#[derive(Debug, SurrealValue)]
struct ReplacementRow {
    record_id: String,
    device_id: String,
    repair_id: Option<String>,
    warranty_id: Option<String>,
    requester_id: String,
    reason: String,
    status: String,
    admin_notes: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReplacementRow {
    fn try_into_request(self) -> Result<ReplacementRequest, DbError> {
        Ok(ReplacementRequest {
            id: parse_uuid("replacement_request", &self.record_id)?,
            device_id: parse_uuid("device", &self.device_id)?,
            repair_id: parse_opt_uuid("repair", self.repair_id)?,
            warranty_id: parse_opt_uuid("warranty", self.warranty_id)?,
            requester_id: parse_uuid("requester", &self.requester_id)?,
            reason: self.reason,
            status: parse_wire(&self.status)?,
            admin_notes: self.admin_notes,
            resolved_by: parse_opt_uuid("resolved_by", self.resolved_by)?,
            resolved_at: self.resolved_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_requests(rows: Vec<ReplacementRow>) -> Result<Vec<ReplacementRequest>, DbError> {
    rows.into_iter()
        .map(ReplacementRow::try_into_request)
        .collect()
}

#[derive(Clone)]
pub struct SurrealReplacementRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealReplacementRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ReplacementRepository for SurrealReplacementRepository<C> {
    async fn create(&self, input: CreateReplacementRequest) -> HubResult<ReplacementRequest> {
        let id = Uuid::new_v4();
        let insert = "CREATE type::record('replacement_request', $id) SET \
             device_id = $device_id, repair_id = $repair_id, \
             warranty_id = $warranty_id, requester_id = $requester_id, \
             reason = $reason, status = 'pending';";

        let query = if input.repair_id.is_some() {
            format!(
                "BEGIN TRANSACTION; \
                 IF array::len((SELECT id FROM type::record('repair', $repair_id) \
                     WHERE status IN ['received', 'in_progress'])) == 0 {{ \
                     THROW \"{marker}\"; \
                 }}; \
                 UPDATE type::record('repair', $repair_id) SET \
                     status = 'replacement_requested', updated_at = time::now(); \
                 {insert} \
                 COMMIT TRANSACTION;",
                marker = conflict_marker(ConflictKind::Duplicate),
            )
        } else {
            insert.to_string()
        };

        let result = self
            .db
            .query(&query)
            .bind(("id", id.to_string()))
            .bind(("device_id", input.device_id.to_string()))
            .bind(("repair_id", input.repair_id.map(|r| r.to_string())))
            .bind(("warranty_id", input.warranty_id.map(|w| w.to_string())))
            .bind(("requester_id", input.requester_id.to_string()))
            .bind(("reason", input.reason))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        debug!(request_id = %id, device_id = %input.device_id, "replacement requested");
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> HubResult<ReplacementRequest> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM \
                 type::record('replacement_request', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ReplacementRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| HubError::not_found("replacement_request", id))?;
        Ok(row.try_into_request()?)
    }

    async fn find_by_repair(&self, repair_id: Uuid) -> HubResult<Option<ReplacementRequest>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM replacement_request \
                 WHERE repair_id = $repair_id \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("repair_id", repair_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ReplacementRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_requests(rows)?.into_iter().next())
    }

    async fn resolve(&self, input: ResolveReplacement) -> HubResult<ReplacementRequest> {
        let mut statements = vec![
            format!(
                "IF array::len((SELECT id FROM type::record('replacement_request', $id) \
                     WHERE status = 'pending')) == 0 {{ \
                     THROW \"{}\"; \
                 }};",
                conflict_marker(ConflictKind::AlreadyResolved)
            ),
            "UPDATE type::record('replacement_request', $id) SET \
                 status = $status, admin_notes = $admin_notes, \
                 resolved_by = $resolved_by, resolved_at = $resolved_at, \
                 updated_at = time::now();"
                .to_string(),
        ];
        if input.replace_device.is_some() {
            statements.push(
                "UPDATE type::record('device', $replace_device) SET \
                     warranty_status = 'replaced', updated_at = time::now();"
                    .to_string(),
            );
        }
        if input.deactivate_warranty.is_some() {
            statements.push(
                "UPDATE type::record('warranty', $deactivate_warranty) SET \
                     is_active = false, updated_at = time::now();"
                    .to_string(),
            );
        }
        let query = format!(
            "BEGIN TRANSACTION; {} COMMIT TRANSACTION;",
            statements.join(" ")
        );

        let status = RequestStatus::from(input.decision);
        let mut builder = self
            .db
            .query(&query)
            .bind(("id", input.request_id.to_string()))
            .bind(("status", status.as_str().to_string()))
            .bind(("admin_notes", input.admin_notes))
            .bind(("resolved_by", input.resolved_by.to_string()))
            .bind(("resolved_at", input.resolved_at));
        if let Some(device_id) = input.replace_device {
            builder = builder.bind(("replace_device", device_id.to_string()));
        }
        if let Some(warranty_id) = input.deactivate_warranty {
            builder = builder.bind(("deactivate_warranty", warranty_id.to_string()));
        }

        let result = builder.await.map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        debug!(request_id = %input.request_id, decision = %input.decision, "replacement resolved");
        self.get_by_id(input.request_id).await
    }

    async fn list(
        &self,
        scope: RowScope,
        filter: ReplacementFilter,
        pagination: Pagination,
    ) -> HubResult<PaginatedResult<ReplacementRequest>> {
        let mut conds = vec!["true"];
        if scope.owner().is_some() {
            conds.push("requester_id = $owner");
        }
        if filter.device_id.is_some() {
            conds.push("device_id = $device_id");
        }
        if filter.status.is_some() {
            conds.push("status = $status");
        }
        let where_clause = conds.join(" AND ");

        let count_query = format!(
            "SELECT count() AS total FROM replacement_request \
             WHERE {where_clause} GROUP ALL"
        );
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM replacement_request \
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

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<ReplacementRow> = result.take(1).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: into_requests(rows)?,
            total: first_total(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

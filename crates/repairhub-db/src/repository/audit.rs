//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! The `audit_log` table denies UPDATE and DELETE at the schema level.

use chrono::{DateTime, Utc};
use repairhub_core::error::{HubError, HubResult};
use repairhub_core::models::audit::{AuditLogEntry, CreateAuditLogEntry};
use repairhub_core::repository::AuditLogRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::{DbError, classify};

#[derive(Debug, SurrealValue)]
struct AuditRow {
    record_id: String,
    actor_id: String,
    action: String,
    entity_type: String,
    entity_id: String,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: parse_uuid("audit_log", &self.record_id)?,
            actor_id: parse_uuid("actor", &self.actor_id)?,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: parse_uuid("entity", &self.entity_id)?,
            metadata: self.metadata,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> HubResult<AuditLogEntry> {
        let id = Uuid::new_v4();
        let result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 actor_id = $actor_id, action = $action, \
                 entity_type = $entity_type, entity_id = $entity_id, \
                 metadata = $metadata",
            )
            .bind(("id", id.to_string()))
            .bind(("actor_id", input.actor_id.to_string()))
            .bind(("action", input.action))
            .bind(("entity_type", input.entity_type))
            .bind(("entity_id", input.entity_id.to_string()))
            .bind(("metadata", input.metadata))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('audit_log', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| HubError::not_found("audit_log", id))?;
        Ok(row.try_into_entry()?)
    }

    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> HubResult<Vec<AuditLogEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM audit_log \
                 WHERE entity_type = $entity_type AND entity_id = $entity_id \
                 ORDER BY timestamp ASC",
            )
            .bind(("entity_type", entity_type.to_string()))
            .bind(("entity_id", entity_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(AuditRow::try_into_entry)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

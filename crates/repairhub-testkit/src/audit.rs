use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use repairhub_core::error::{HubResult, UpstreamSystem};
use repairhub_core::models::audit::{AuditLogEntry, CreateAuditLogEntry};
use repairhub_core::repository::AuditLogRepository;
use uuid::Uuid;

use crate::faults::Faults;

/// In-memory [`AuditLogRepository`]. Fault op name: `append`.
#[derive(Debug, Clone)]
pub struct FakeAuditLog {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
    faults: Arc<Faults>,
}

impl Default for FakeAuditLog {
    fn default() -> Self {
        Self {
            entries: Arc::default(),
            faults: Arc::new(Faults::new(UpstreamSystem::ProfileStore)),
        }
    }
}

impl FakeAuditLog {
    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Action names in append order.
    pub fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditLogRepository for FakeAuditLog {
    async fn append(&self, input: CreateAuditLogEntry) -> HubResult<AuditLogEntry> {
        self.faults.check("append")?;
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            actor_id: input.actor_id,
            action: input.action,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            metadata: input.metadata,
            timestamp: Utc::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(entry)
    }

    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> HubResult<Vec<AuditLogEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

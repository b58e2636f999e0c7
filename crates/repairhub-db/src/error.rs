//! Database-specific error types and conversions.

use repairhub_core::error::{ConflictKind, HubError, UpstreamSystem};

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for HubError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => HubError::NotFound { entity, id },
            other => HubError::upstream(UpstreamSystem::ProfileStore, other.to_string()),
        }
    }
}

/// Marker thrown by guarded transactions (`THROW "conflict:<kind>"`).
pub(crate) fn conflict_marker(kind: ConflictKind) -> String {
    format!("conflict:{kind}")
}

/// Classify a failed query: guarded-transaction markers and unique-index
/// violations become conflicts, everything else stays a query error.
pub(crate) fn classify(message: String) -> HubError {
    for kind in [
        ConflictKind::AlreadyActive,
        ConflictKind::AlreadyResolved,
        ConflictKind::Duplicate,
        ConflictKind::InUse,
    ] {
        if message.contains(&conflict_marker(kind)) {
            return HubError::conflict(kind, message);
        }
    }
    if message.contains("already contains") {
        return HubError::conflict(ConflictKind::Duplicate, message);
    }
    DbError::Query(message).into()
}
